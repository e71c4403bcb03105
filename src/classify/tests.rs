use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use super::*;
use crate::cdm::CdmStore;
use crate::model::{BatchStatus, Rect, Region, SchemaKey};

fn key(raw: &str) -> SchemaKey {
    SchemaKey::parse(raw).expect("valid test key")
}

fn schema(keys: &[&str]) -> CdmStore {
    let mut store = CdmStore::new();
    for raw in keys {
        store.insert(key(raw), Some(format!("value of {raw}")));
    }
    store
}

fn region(full_id: &str, y: f64) -> Region {
    Region::from_full_id(full_id, 1, Rect::new(0.2, y, 0.3, 0.02))
}

fn context() -> BatchContext {
    BatchContext {
        page: 1,
        page_context_text: "Account Holder\nBeneficiary".to_string(),
        form_description: "IRA Distribution Request Form".to_string(),
    }
}

struct ScriptedClassifier<F> {
    answer: F,
    seen: Mutex<Vec<Vec<String>>>,
}

impl<F> ScriptedClassifier<F>
where
    F: Fn(&ClassificationRequest) -> Result<RawClassification, ClassifierError> + Send + Sync,
{
    fn new(answer: F) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl<F> Classifier for ScriptedClassifier<F>
where
    F: Fn(&ClassificationRequest) -> Result<RawClassification, ClassifierError> + Send + Sync,
{
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError> {
        self.seen.lock().expect("seen lock").push(
            request
                .regions
                .iter()
                .map(|region| region.short_id.clone())
                .collect(),
        );
        (self.answer)(request)
    }
}

fn answers(entries: &[(&str, Option<&str>)]) -> RawClassification {
    entries
        .iter()
        .map(|(short_id, key)| (short_id.to_string(), key.map(ToOwned::to_owned)))
        .collect()
}

#[test]
fn partition_is_contiguous_and_bounded() {
    let regions = (0..7)
        .map(|index| region(&format!("f.Field{index}"), index as f64 * 0.05))
        .collect::<Vec<Region>>();

    let batches = BatchOrchestrator::new(3, false).partition(&regions);
    let sizes = batches.iter().map(|batch| batch.len()).collect::<Vec<usize>>();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(batches[1][0].short_id, "Field3");

    assert_eq!(BatchOrchestrator::new(0, false).partition(&regions).len(), 7);
}

#[test]
fn unknown_null_and_bogus_keys_are_not_mapped() {
    let regions = vec![region("doc.A", 0.1), region("doc.B", 0.2), region("doc.C", 0.3)];
    let classifier = ScriptedClassifier::new(|_| {
        Ok(answers(&[
            ("A", Some("account.number")),
            ("B", None),
            ("C", Some("bogus.key")),
        ]))
    });

    let outcome = BatchOrchestrator::new(25, false).classify(
        &classifier,
        &regions,
        &context(),
        &schema(&["account.number", "person.ssn"]),
    );

    assert_eq!(outcome.mapping.len(), 1);
    assert_eq!(outcome.mapping["doc.A"], key("account.number"));
    assert_eq!(outcome.batches.len(), 1);
    assert_eq!(outcome.batches[0].mapped, 1);
}

#[test]
fn shared_short_ids_in_different_sections_keep_distinct_keys() {
    let regions = vec![
        region("form1[0].Holder[0].City[0]", 0.1),
        region("form1[0].Employer[0].City[0]", 0.6),
    ];
    let classifier = ScriptedClassifier::new(|request| {
        let is_employer_batch = request.regions.iter().any(|region| region.y > 0.5);
        let key = if is_employer_batch {
            "plan.employer_city"
        } else {
            "person.city"
        };
        Ok(answers(&[("City[0]", Some(key))]))
    });

    let outcome = BatchOrchestrator::new(1, false).classify(
        &classifier,
        &regions,
        &context(),
        &schema(&["person.city", "plan.employer_city"]),
    );

    assert_eq!(outcome.mapping.len(), 2);
    assert_eq!(
        outcome.mapping["form1[0].Holder[0].City[0]"],
        key("person.city")
    );
    assert_eq!(
        outcome.mapping["form1[0].Employer[0].City[0]"],
        key("plan.employer_city")
    );
    assert!(!outcome.mapping.contains_key("City[0]"));
}

#[test]
fn repeated_short_id_starts_a_new_batch() {
    let regions = vec![
        region("form1[0].Primary[0].TextField1[0]", 0.11),
        region("form1[0].Primary[0].TextField2[0]", 0.15),
        region("form1[0].Contingent[0].TextField1[0]", 0.61),
        region("form1[0].Contingent[0].TextField2[0]", 0.65),
    ];
    let classifier = ScriptedClassifier::new(|request| {
        if request.regions.iter().any(|region| region.y > 0.5) {
            return Ok(answers(&[("TextField1[0]", None)]));
        }
        Ok(answers(&[("TextField1[0]", Some("person.first_name"))]))
    });

    let orchestrator = BatchOrchestrator::new(DEFAULT_CHUNK_SIZE, false);
    let sizes = orchestrator
        .partition(&regions)
        .iter()
        .map(|batch| batch.len())
        .collect::<Vec<usize>>();
    assert_eq!(sizes, vec![2, 2]);

    let outcome = orchestrator.classify(
        &classifier,
        &regions,
        &context(),
        &schema(&["person.first_name"]),
    );

    assert_eq!(classifier.seen().len(), 2);
    assert_eq!(outcome.mapping.len(), 1);
    assert_eq!(
        outcome.mapping["form1[0].Primary[0].TextField1[0]"],
        key("person.first_name")
    );
    assert!(!outcome
        .mapping
        .contains_key("form1[0].Contingent[0].TextField1[0]"));
}

#[test]
fn failed_batch_leaves_only_its_regions_unmapped() {
    let regions = vec![
        region("doc.FirstName[0]", 0.1),
        region("doc.LastName[0]", 0.2),
        region("doc.SSN[0]", 0.3),
        region("doc.City[0]", 0.4),
        region("doc.State[0]", 0.5),
    ];
    let classifier = ScriptedClassifier::new(|request| {
        if request.regions.iter().any(|region| region.short_id == "SSN[0]") {
            return Err(ClassifierError::Timeout { after_ms: 50 });
        }
        Ok(request
            .regions
            .iter()
            .map(|region| {
                let key = match region.short_id.as_str() {
                    "FirstName[0]" => "person.first_name",
                    "LastName[0]" => "person.last_name",
                    "State[0]" => "person.state",
                    _ => "person.city",
                };
                (region.short_id.clone(), Some(key.to_string()))
            })
            .collect())
    });

    let outcome = BatchOrchestrator::new(2, false).classify(
        &classifier,
        &regions,
        &context(),
        &schema(&[
            "person.first_name",
            "person.last_name",
            "person.ssn",
            "person.city",
            "person.state",
        ]),
    );

    assert_eq!(classifier.seen().len(), 3);
    assert_eq!(outcome.failed_batches(), 1);
    assert_eq!(outcome.failed_regions(), 2);
    assert_eq!(outcome.batches[1].status, BatchStatus::Failed);
    assert!(
        outcome.batches[1]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("timed out")
    );

    assert!(!outcome.mapping.contains_key("doc.SSN[0]"));
    assert!(!outcome.mapping.contains_key("doc.City[0]"));
    assert_eq!(outcome.mapping["doc.FirstName[0]"], key("person.first_name"));
    assert_eq!(outcome.mapping["doc.LastName[0]"], key("person.last_name"));
    assert_eq!(outcome.mapping["doc.State[0]"], key("person.state"));
}

#[test]
fn parallel_dispatch_merges_like_sequential() {
    let regions = (0..10)
        .map(|index| region(&format!("doc.sec{index}.Field{index}"), index as f64 * 0.05))
        .collect::<Vec<Region>>();
    let classifier = ScriptedClassifier::new(|request| {
        Ok(request
            .regions
            .iter()
            .map(|region| (region.short_id.clone(), Some("person.phone".to_string())))
            .collect())
    });
    let store = schema(&["person.phone"]);

    let sequential =
        BatchOrchestrator::new(3, false).classify(&classifier, &regions, &context(), &store);
    let parallel =
        BatchOrchestrator::new(3, true).classify(&classifier, &regions, &context(), &store);

    assert_eq!(sequential.mapping, parallel.mapping);
    assert_eq!(parallel.mapping.len(), 10);
    let indices = parallel
        .batches
        .iter()
        .map(|batch| batch.index)
        .collect::<Vec<usize>>();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn request_carries_positions_schema_and_context() {
    let regions = vec![region("doc.Zip[0]", 0.4)];
    let captured = Mutex::new(None::<ClassificationRequest>);
    let classifier = ScriptedClassifier::new(|request| {
        *captured.lock().expect("capture lock") = Some(request.clone());
        Ok(RawClassification::new())
    });

    BatchOrchestrator::new(25, false).classify(
        &classifier,
        &regions,
        &context(),
        &schema(&["person.zip", "account.number"]),
    );

    let request = captured
        .lock()
        .expect("capture lock")
        .clone()
        .expect("classifier was called");
    assert_eq!(request.form_description, "IRA Distribution Request Form");
    assert_eq!(request.page_context_text, "Account Holder\nBeneficiary");
    assert_eq!(
        request.regions,
        vec![RegionPosition {
            short_id: "Zip[0]".to_string(),
            x: 0.35,
            y: 0.41,
        }]
    );
    let mut expected = BTreeMap::new();
    expected.insert("account".to_string(), vec!["account.number".to_string()]);
    expected.insert("person".to_string(), vec!["person.zip".to_string()]);
    assert_eq!(request.schema_categories, expected);
}

#[test]
fn merge_never_replaces_an_existing_entry() {
    let batch = vec![region("doc.Phone[0]", 0.1)];
    let mut mapping = crate::model::Mapping::new();
    mapping.insert("doc.Phone[0]".to_string(), key("person.phone"));
    let mut warnings = Vec::new();

    let mapped = merge_batch(
        &mut mapping,
        &batch,
        &answers(&[("Phone[0]", Some("person.phone_extension"))]),
        &schema(&["person.phone", "person.phone_extension"]),
        &mut warnings,
    );

    assert_eq!(mapped, 0);
    assert_eq!(mapping["doc.Phone[0]"], key("person.phone"));
    assert_eq!(warnings.len(), 1);
}

#[test]
fn parses_plain_and_reasoning_entries() {
    let parsed = parse_classification(
        r#"{
            "FirstName[0]": {"cdm_key": "person.first_name", "reasoning": "primary section"},
            "benef_FirstName[0]": {"cdm_key": null, "reasoning": "beneficiary"},
            "AcctNum[0]": "account.number",
            "Blank[0]": "",
            "Odd[0]": 7
        }"#,
    )
    .expect("valid response");

    assert_eq!(parsed["FirstName[0]"].as_deref(), Some("person.first_name"));
    assert_eq!(parsed["benef_FirstName[0]"], None);
    assert_eq!(parsed["AcctNum[0]"].as_deref(), Some("account.number"));
    assert_eq!(parsed["Blank[0]"], None);
    assert_eq!(parsed["Odd[0]"], None);
}

#[test]
fn strips_markdown_fences() {
    let parsed = parse_classification("```json\n{\"SSN[0]\": \"person.ssn\"}\n```")
        .expect("fenced response");
    assert_eq!(parsed["SSN[0]"].as_deref(), Some("person.ssn"));
}

#[test]
fn truncated_response_is_repaired_to_last_complete_entry() {
    let truncated = concat!(
        r#"{"A": {"cdm_key": "account.number", "reasoning": "x"}, "#,
        r#""B": "person.ssn", "C": {"cdm_key": "per"#,
    );
    let parsed = parse_classification(truncated).expect("repairable response");

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed["A"].as_deref(), Some("account.number"));
    assert_eq!(parsed["B"].as_deref(), Some("person.ssn"));
}

#[test]
fn trailing_text_after_object_is_trimmed() {
    let repaired = repair_truncated_json(r#"Here you go: {"A": "x.y"} hope this helps"#)
        .expect("repairable");
    assert_eq!(repaired, r#"{"A": "x.y"}"#);
}

#[test]
fn unrepairable_response_is_malformed() {
    for raw in ["not json at all", "[\"A\", \"B\"]", "{\"A\": \"acc"] {
        let err = parse_classification(raw).expect_err("should be malformed");
        assert!(matches!(err, ClassifierError::Malformed(_)), "{raw}: {err}");
    }
}

#[test]
fn recorded_classifier_answers_only_requested_regions() {
    let path = std::env::temp_dir().join(format!("formmap-recorded-{}.json", std::process::id()));
    std::fs::write(
        &path,
        "```json\n{\"SSN[0]\": \"person.ssn\", \"Other[0]\": \"person.city\"}\n```",
    )
    .expect("recorded responses written");
    let classifier = RecordedClassifier::load(&path).expect("recorded responses load");
    let _ = std::fs::remove_file(&path);
    assert!(classifier.name().starts_with("recorded:"));
    let request = ClassificationRequest {
        page: 1,
        page_context_text: String::new(),
        regions: vec![RegionPosition {
            short_id: "SSN[0]".to_string(),
            x: 0.1,
            y: 0.1,
        }],
        schema_categories: BTreeMap::new(),
        form_description: String::new(),
    };

    let raw = classifier.classify(&request).expect("recorded answer");
    assert_eq!(raw.len(), 1);
    assert_eq!(raw["SSN[0]"].as_deref(), Some("person.ssn"));
}

#[cfg(unix)]
fn shell(script: &str, timeout_ms: u64) -> CommandClassifier {
    CommandClassifier::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
        Duration::from_millis(timeout_ms),
    )
}

#[cfg(unix)]
fn single_request() -> ClassificationRequest {
    ClassificationRequest {
        page: 1,
        page_context_text: "Social Security Number".to_string(),
        regions: vec![RegionPosition {
            short_id: "SSN[0]".to_string(),
            x: 0.4,
            y: 0.2,
        }],
        schema_categories: BTreeMap::new(),
        form_description: "test".to_string(),
    }
}

#[cfg(unix)]
#[test]
fn command_classifier_reads_stdout_json() {
    let classifier = shell(
        r#"cat >/dev/null; printf '{"SSN[0]": "person.ssn"}'"#,
        5_000,
    );
    let raw = classifier
        .classify(&single_request())
        .expect("command answer");
    assert_eq!(raw["SSN[0]"].as_deref(), Some("person.ssn"));
}

#[cfg(unix)]
#[test]
fn command_classifier_reports_non_zero_exit() {
    let classifier = shell("cat >/dev/null; echo boom >&2; exit 3", 5_000);
    let err = classifier
        .classify(&single_request())
        .expect_err("non-zero exit");
    match err {
        ClassifierError::Failed(message) => assert!(message.contains("boom")),
        other => panic!("unexpected error: {other}"),
    }
}

#[cfg(unix)]
#[test]
fn command_classifier_times_out() {
    let classifier = shell("exec sleep 5", 100);
    let err = classifier
        .classify(&single_request())
        .expect_err("should time out");
    assert!(matches!(err, ClassifierError::Timeout { after_ms: 100 }));
}

#[cfg(unix)]
#[test]
fn command_classifier_that_skips_stdin_still_answers() {
    let classifier = shell(r#"printf '{"SSN[0]": "person.ssn"}'"#, 5_000);
    let mut request = single_request();
    request.page_context_text = "Social Security Number ".repeat(50_000);

    let raw = classifier
        .classify(&request)
        .expect("answer despite unread stdin");
    assert_eq!(raw["SSN[0]"].as_deref(), Some("person.ssn"));
}
