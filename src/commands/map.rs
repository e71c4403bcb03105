use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use crate::cdm::CdmStore;
use crate::classify::{Classifier, CommandClassifier, RecordedClassifier};
use crate::cli::MapArgs;
use crate::commands::cdm::load_record_cdm;
use crate::commands::load_registry;
use crate::filter::RegionFilter;
use crate::inference::KeyInference;
use crate::model::{DocumentSnapshot, MappedRegion, MappingSource, RunSummary};
use crate::pipeline::{FormMapper, PipelineConfig};
use crate::render::{FillPlanWriter, Renderer};
use crate::spatial::LabelResolverConfig;
use crate::util::{
    ensure_directory, now_utc_string, read_json, sha256_file, utc_compact_string,
    write_json_pretty,
};

const SUMMARY_VERSION: u32 = 1;

pub fn run(args: MapArgs) -> Result<()> {
    let started_ts = Utc::now();
    let generated_at = now_utc_string();
    let stamp = utc_compact_string(started_ts);
    let run_id = format!("map-{stamp}");

    let snapshot = load_snapshot(&args.document)?;
    if snapshot.regions.is_empty() {
        bail!("document {} has no fillable regions", args.document.display());
    }
    let source_sha256 = sha256_file(&args.document)?;

    let registry = load_registry(args.patterns.as_deref())?;
    let cdm = match &args.cdm {
        Some(path) => CdmStore::load(path)?,
        None => load_record_cdm(&args.record, &KeyInference::new(&registry))?,
    };
    let classifier = build_classifier(&args)?;
    let form_description = args
        .form_description
        .clone()
        .or_else(|| snapshot.form_description.clone())
        .unwrap_or_default();

    info!(
        run_id = %run_id,
        document = %args.document.display(),
        regions = snapshot.regions.len(),
        text_runs = snapshot.text_runs.len(),
        cdm_keys = cdm.len(),
        classifier = %classifier.name(),
        "starting map run"
    );

    let config = PipelineConfig {
        chunk_size: args.chunk_size,
        parallel: args.parallel,
        labels: LabelResolverConfig {
            search_radius: args.search_radius,
            ..LabelResolverConfig::default()
        },
        ..PipelineConfig::default()
    };
    let filter = RegionFilter::default().with_extra_entries(args.deny.as_slice());
    let mapper = FormMapper::new(&registry, config)?.with_filter(filter);
    let mapping_run = mapper.run(&snapshot, &cdm, classifier.as_ref(), &form_description)?;

    ensure_directory(&args.output_dir)?;
    let plan_path = args.output_dir.join(format!("fill_plan_{stamp}.json"));
    let mut renderer = FillPlanWriter::new(plan_path);
    let report = renderer.render(&snapshot, &mapping_run.fill_set)?;

    let mut counts = mapping_run.counts;
    counts.render_failed = report.failures.len();

    let mut warnings = mapping_run.warnings;
    warnings.extend(
        report
            .failures
            .iter()
            .map(|failure| format!("render failed for {}: {}", failure.full_id, failure.reason)),
    );

    let mapping = mapping_run
        .mapping
        .iter()
        .map(|(full_id, key)| {
            let entry = MappedRegion {
                key: key.clone(),
                source: mapping_run
                    .sources
                    .get(full_id)
                    .copied()
                    .unwrap_or(MappingSource::Classifier),
                filled: mapping_run.fill_set.contains_key(full_id),
            };
            (full_id.clone(), entry)
        })
        .collect::<BTreeMap<String, MappedRegion>>();

    let summary = RunSummary {
        manifest_version: SUMMARY_VERSION,
        run_id: run_id.clone(),
        generated_at,
        source: snapshot
            .source
            .clone()
            .or_else(|| Some(args.document.display().to_string())),
        source_sha256: Some(source_sha256),
        form_description,
        classifier: classifier.name(),
        chunk_size: args.chunk_size.max(1),
        counts,
        mapping,
        batches: mapping_run.batches,
        warnings,
    };

    let summary_path = args.output_dir.join(format!("map_run_{stamp}.json"));
    write_json_pretty(&summary_path, &summary)?;

    info!(
        run_id = %run_id,
        total = summary.counts.total_regions,
        filtered_out = summary.counts.filtered_out,
        mapped = summary.counts.mapped,
        filled = summary.counts.filled,
        skipped = summary.counts.skipped,
        failed_batches = summary.counts.failed_batches,
        render_failed = summary.counts.render_failed,
        fill_plan = %renderer.path().display(),
        summary = %summary_path.display(),
        "map run completed"
    );

    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<DocumentSnapshot> {
    read_json(path).with_context(|| format!("failed to load document snapshot {}", path.display()))
}

fn build_classifier(args: &MapArgs) -> Result<Box<dyn Classifier>> {
    match (&args.classifier_cmd, &args.recorded_responses) {
        (Some(_), Some(_)) => {
            bail!("--classifier-cmd and --recorded-responses cannot be combined")
        }
        (Some(program), None) => Ok(Box::new(CommandClassifier::new(
            program.clone(),
            args.classifier_args.clone(),
            Duration::from_millis(args.timeout_ms),
        ))),
        (None, Some(path)) => Ok(Box::new(RecordedClassifier::load(path)?)),
        (None, None) => bail!("one of --classifier-cmd or --recorded-responses is required"),
    }
}
