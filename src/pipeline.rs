use std::collections::BTreeMap;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cdm::CdmStore;
use crate::classify::{
    BatchContext, BatchOrchestrator, Classifier, DEFAULT_CHUNK_SIZE, MAX_CONTEXT_CHARS,
};
use crate::fill::resolve_fill_values;
use crate::filter::RegionFilter;
use crate::inference::{KeyInference, widget_base_name};
use crate::model::{
    BatchOutcome, DocumentSnapshot, FillSet, Mapping, MappingSource, Region, RunCounts,
    sort_reading_order,
};
use crate::registry::PatternRegistry;
use crate::spatial::{LabelResolver, LabelResolverConfig};

pub const DEFAULT_SECONDARY_MARKERS: &[&str] = &[
    "benef",
    "spouse",
    "trustee",
    "authorized",
    "agent",
    "contingent",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub parallel: bool,
    pub labels: LabelResolverConfig,
    pub max_context_chars: usize,
    pub secondary_markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: false,
            labels: LabelResolverConfig::default(),
            max_context_chars: MAX_CONTEXT_CHARS,
            secondary_markers: DEFAULT_SECONDARY_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MappingRun {
    pub mapping: Mapping,
    pub sources: BTreeMap<String, MappingSource>,
    pub fill_set: FillSet,
    pub counts: RunCounts,
    pub batches: Vec<BatchOutcome>,
    pub warnings: Vec<String>,
}

pub struct FormMapper<'a> {
    inference: KeyInference<'a>,
    resolver: LabelResolver,
    filter: RegionFilter,
    orchestrator: BatchOrchestrator,
    config: PipelineConfig,
}

impl<'a> FormMapper<'a> {
    pub fn new(registry: &'a PatternRegistry, config: PipelineConfig) -> Result<Self> {
        Ok(Self {
            inference: KeyInference::new(registry),
            resolver: LabelResolver::new(config.labels)?,
            filter: RegionFilter::default(),
            orchestrator: BatchOrchestrator::new(config.chunk_size, config.parallel),
            config,
        })
    }

    pub fn with_filter(mut self, filter: RegionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn run(
        &self,
        snapshot: &DocumentSnapshot,
        cdm: &CdmStore,
        classifier: &dyn Classifier,
        form_description: &str,
    ) -> Result<MappingRun> {
        if snapshot.regions.is_empty() {
            bail!("document has no fillable regions");
        }

        let mut regions = snapshot.regions.clone();
        sort_reading_order(&mut regions);

        let eligible = self.filter.filter(&regions);
        let mut run = MappingRun::default();
        run.counts.total_regions = regions.len();
        run.counts.eligible = eligible.len();
        run.counts.filtered_out = regions.len() - eligible.len();

        info!(
            total = run.counts.total_regions,
            eligible = run.counts.eligible,
            filtered_out = run.counts.filtered_out,
            "filtered regions"
        );

        let mut pending = BTreeMap::<u32, Vec<Region>>::new();
        for region in eligible {
            let label = self.resolver.resolve(&region, &snapshot.text_runs);

            if self.is_secondary(&region, label.as_deref()) {
                debug!(region = %region.full_id, "secondary marker; deferring to classifier");
                pending.entry(region.page).or_default().push(region);
                continue;
            }

            if let Some(key) = self.inference.infer(widget_base_name(&region.short_id)) {
                run.sources.insert(region.full_id.clone(), MappingSource::Identifier);
                run.mapping.insert(region.full_id, key);
                continue;
            }

            if let Some(key) = label.as_deref().and_then(|label| self.inference.infer(label)) {
                run.sources.insert(region.full_id.clone(), MappingSource::Label);
                run.mapping.insert(region.full_id, key);
                continue;
            }

            pending.entry(region.page).or_default().push(region);
        }
        run.counts.inferred = run.mapping.len();

        let pending_count = pending.values().map(Vec::len).sum::<usize>();
        info!(
            inferred = run.counts.inferred,
            pending = pending_count,
            "fast path complete"
        );

        if pending_count > 0 && cdm.is_empty() {
            let message = format!(
                "CDM schema is empty; {pending_count} regions left unclassified"
            );
            warn!(pending = pending_count, "CDM schema is empty; skipping classification");
            run.warnings.push(message);
        } else {
            for (page, page_regions) in &pending {
                let context = BatchContext {
                    page: *page,
                    page_context_text: truncate_chars(
                        &snapshot.page_text(*page),
                        self.config.max_context_chars,
                    ),
                    form_description: form_description.to_string(),
                };

                let outcome = self
                    .orchestrator
                    .classify(classifier, page_regions, &context, cdm);
                run.counts.failed_batches += outcome.failed_batches();
                run.counts.classification_failed_regions += outcome.failed_regions();

                for (full_id, key) in outcome.mapping {
                    if run.mapping.contains_key(&full_id) {
                        continue;
                    }
                    run.sources.insert(full_id.clone(), MappingSource::Classifier);
                    run.mapping.insert(full_id, key);
                    run.counts.classified += 1;
                }
                run.batches.extend(outcome.batches);
                run.warnings.extend(outcome.warnings);
            }
        }

        run.fill_set = resolve_fill_values(&run.mapping, cdm);

        run.counts.mapped = run.mapping.len();
        run.counts.filled = run.fill_set.len();
        run.counts.mapped_without_value = run.counts.mapped - run.counts.filled;
        run.counts.skipped = run
            .counts
            .eligible
            .saturating_sub(run.counts.mapped)
            .saturating_sub(run.counts.classification_failed_regions);

        info!(
            mapped = run.counts.mapped,
            inferred = run.counts.inferred,
            classified = run.counts.classified,
            filled = run.counts.filled,
            skipped = run.counts.skipped,
            failed_batches = run.counts.failed_batches,
            "mapping complete"
        );

        Ok(run)
    }

    fn is_secondary(&self, region: &Region, label: Option<&str>) -> bool {
        let full_id = region.full_id.to_lowercase();
        let label = label.map(str::to_lowercase).unwrap_or_default();
        self.config.secondary_markers.iter().any(|marker| {
            let marker = marker.to_lowercase();
            full_id.contains(&marker) || label.contains(&marker)
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
