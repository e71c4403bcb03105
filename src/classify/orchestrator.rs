use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{
    Classifier, ClassificationRequest, ClassifierError, RawClassification, RegionPosition,
};
use crate::cdm::CdmStore;
use crate::model::{BatchOutcome, BatchStatus, Mapping, Region, SchemaKey};

#[derive(Debug, Clone)]
pub struct BatchContext {
    pub page: u32,
    pub page_context_text: String,
    pub form_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    pub mapping: Mapping,
    pub batches: Vec<BatchOutcome>,
    pub warnings: Vec<String>,
}

impl ClassificationOutcome {
    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|batch| batch.status == BatchStatus::Failed)
            .count()
    }

    pub fn failed_regions(&self) -> usize {
        self.batches
            .iter()
            .filter(|batch| batch.status == BatchStatus::Failed)
            .map(|batch| batch.size)
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOrchestrator {
    chunk_size: usize,
    parallel: bool,
}

impl BatchOrchestrator {
    pub fn new(chunk_size: usize, parallel: bool) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            parallel,
        }
    }

    // A batch never holds two regions with the same short_id; answers come
    // back keyed by short_id and would otherwise land on both.
    pub fn partition<'r>(&self, regions: &'r [Region]) -> Vec<&'r [Region]> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut seen = HashSet::new();

        for (index, region) in regions.iter().enumerate() {
            let full = index - start == self.chunk_size;
            if full || !seen.insert(region.short_id.as_str()) {
                batches.push(&regions[start..index]);
                start = index;
                seen.clear();
                seen.insert(region.short_id.as_str());
            }
        }
        if start < regions.len() {
            batches.push(&regions[start..]);
        }

        batches
    }

    pub fn classify(
        &self,
        classifier: &dyn Classifier,
        regions: &[Region],
        context: &BatchContext,
        schema: &CdmStore,
    ) -> ClassificationOutcome {
        let batches = self.partition(regions);
        let schema_categories = schema.schema_categories();
        let total = batches.len();

        let requests = batches
            .iter()
            .map(|batch| ClassificationRequest {
                page: context.page,
                page_context_text: context.page_context_text.clone(),
                regions: batch.iter().map(RegionPosition::from_region).collect(),
                schema_categories: schema_categories.clone(),
                form_description: context.form_description.clone(),
            })
            .collect::<Vec<ClassificationRequest>>();

        let run_one = |(index, request): (usize, &ClassificationRequest)| {
            debug!(
                page = context.page,
                batch = index + 1,
                total,
                regions = request.regions.len(),
                "classifying batch"
            );
            classifier.classify(request)
        };

        let responses: Vec<Result<RawClassification, ClassifierError>> = if self.parallel {
            requests.par_iter().enumerate().map(run_one).collect()
        } else {
            requests.iter().enumerate().map(run_one).collect()
        };

        let mut outcome = ClassificationOutcome::default();
        for (index, (batch, response)) in batches.iter().zip(responses).enumerate() {
            match response {
                Ok(raw) => {
                    let mapped = merge_batch(
                        &mut outcome.mapping,
                        batch,
                        &raw,
                        schema,
                        &mut outcome.warnings,
                    );
                    info!(
                        page = context.page,
                        batch = index + 1,
                        total,
                        regions = batch.len(),
                        mapped,
                        "batch classified"
                    );
                    outcome.batches.push(BatchOutcome {
                        page: context.page,
                        index,
                        size: batch.len(),
                        status: BatchStatus::Completed,
                        mapped,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(
                        page = context.page,
                        batch = index + 1,
                        total,
                        regions = batch.len(),
                        error = %err,
                        "batch classification failed; regions left unmapped"
                    );
                    outcome.batches.push(BatchOutcome {
                        page: context.page,
                        index,
                        size: batch.len(),
                        status: BatchStatus::Failed,
                        mapped: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        outcome
    }
}

// Keyed by full_id only; an existing entry is never replaced.
pub fn merge_batch(
    mapping: &mut Mapping,
    batch: &[Region],
    response: &RawClassification,
    schema: &CdmStore,
    warnings: &mut Vec<String>,
) -> usize {
    let mut mapped = 0;

    for region in batch {
        let Some(Some(raw_key)) = response.get(&region.short_id) else {
            continue;
        };

        let key = match SchemaKey::parse(raw_key) {
            Ok(key) if schema.contains_key(&key) => key,
            _ => {
                debug!(
                    region = %region.full_id,
                    key = %raw_key,
                    "dropping classifier key outside schema"
                );
                continue;
            }
        };

        match mapping.get(&region.full_id) {
            Some(existing) if existing != &key => {
                let message = format!(
                    "kept {existing} for {}; classifier also proposed {key}",
                    region.full_id
                );
                warn!(
                    region = %region.full_id,
                    existing = %existing,
                    proposed = %key,
                    "conflicting key ignored"
                );
                warnings.push(message);
            }
            Some(_) => {}
            None => {
                mapping.insert(region.full_id.clone(), key);
                mapped += 1;
            }
        }
    }

    mapped
}
