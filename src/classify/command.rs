use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{
    Classifier, ClassificationRequest, ClassifierError, RawClassification, parse_classification,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl Classifier for CommandClassifier {
    fn name(&self) -> String {
        format!("command:{}", self.program)
    }

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| ClassifierError::Failed(format!("failed to encode request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        let stdout_reader = thread::spawn(move || read_all(stdout));
        let stderr_reader = thread::spawn(move || read_all(stderr));
        let stdin_writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload)?;
            }
            Ok(())
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(err.into());
                }
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClassifierError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_reader(stdout_reader, "stdout")?;
        let stderr = join_reader(stderr_reader, "stderr")?;
        let write_result = stdin_writer
            .join()
            .map_err(|_| ClassifierError::Failed("stdin writer panicked".to_string()))?;

        if !status.success() {
            return Err(ClassifierError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        match write_result {
            Err(err) if err.kind() != ErrorKind::BrokenPipe => return Err(err.into()),
            _ => {}
        }

        parse_classification(&String::from_utf8_lossy(&stdout))
    }
}

fn read_all<R: Read>(source: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut source) = source {
        source.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn join_reader(
    handle: thread::JoinHandle<std::io::Result<Vec<u8>>>,
    stream: &str,
) -> Result<Vec<u8>, ClassifierError> {
    let bytes = handle
        .join()
        .map_err(|_| ClassifierError::Failed(format!("{stream} reader panicked")))??;
    Ok(bytes)
}
