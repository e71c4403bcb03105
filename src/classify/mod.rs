use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::model::Region;

mod command;
mod orchestrator;
mod recorded;
mod response;
#[cfg(test)]
mod tests;

pub use command::CommandClassifier;
pub use orchestrator::{BatchContext, BatchOrchestrator, ClassificationOutcome, merge_batch};
pub use recorded::RecordedClassifier;
pub use response::{parse_classification, repair_truncated_json};

pub const DEFAULT_CHUNK_SIZE: usize = 25;
pub const MAX_CONTEXT_CHARS: usize = 3000;

pub type RawClassification = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPosition {
    pub short_id: String,
    pub x: f64,
    pub y: f64,
}

impl RegionPosition {
    pub fn from_region(region: &Region) -> Self {
        let center = region.center();
        Self {
            short_id: region.short_id.clone(),
            x: round4(center.x),
            y: round4(center.y),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRequest {
    pub page: u32,
    pub page_context_text: String,
    pub regions: Vec<RegionPosition>,
    pub schema_categories: BTreeMap<String, Vec<String>>,
    pub form_description: String,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("classifier failed: {0}")]
    Failed(String),
    #[error("malformed classifier response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait Classifier: Send + Sync {
    fn name(&self) -> String;

    fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError>;
}
