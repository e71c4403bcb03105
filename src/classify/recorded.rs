use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{
    Classifier, ClassificationRequest, ClassifierError, RawClassification, parse_classification,
};

#[derive(Debug, Clone)]
pub struct RecordedClassifier {
    source: PathBuf,
    responses: RawClassification,
}

impl RecordedClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let responses = parse_classification(&raw)
            .with_context(|| format!("failed to parse recorded responses {}", path.display()))?;
        Ok(Self {
            source: path.to_path_buf(),
            responses,
        })
    }
}

impl Classifier for RecordedClassifier {
    fn name(&self) -> String {
        format!("recorded:{}", self.source.display())
    }

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError> {
        Ok(request
            .regions
            .iter()
            .filter_map(|region| {
                self.responses
                    .get(&region.short_id)
                    .map(|key| (region.short_id.clone(), key.clone()))
            })
            .collect())
    }
}
