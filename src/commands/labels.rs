use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::LabelsArgs;
use crate::commands::map::load_snapshot;
use crate::filter::RegionFilter;
use crate::model::sort_reading_order;
use crate::spatial::{LabelResolver, LabelResolverConfig};

#[derive(Debug, Clone, Serialize)]
struct RegionLabel {
    full_id: String,
    page: u32,
    label: Option<String>,
}

pub fn run(args: LabelsArgs) -> Result<()> {
    let snapshot = load_snapshot(&args.document)?;
    let resolver = LabelResolver::new(LabelResolverConfig {
        search_radius: args.search_radius,
        ..LabelResolverConfig::default()
    })?;
    let filter = RegionFilter::default().with_extra_entries(args.deny.as_slice());

    let mut regions = filter.filter(&snapshot.regions);
    sort_reading_order(&mut regions);

    let labels = regions
        .iter()
        .map(|region| RegionLabel {
            full_id: region.full_id.clone(),
            page: region.page,
            label: resolver.resolve(region, &snapshot.text_runs),
        })
        .collect::<Vec<RegionLabel>>();

    let resolved = labels.iter().filter(|entry| entry.label.is_some()).count();
    info!(
        regions = labels.len(),
        resolved,
        search_radius = resolver.config().search_radius,
        "resolved region labels"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &labels)
            .context("failed to serialize label output")?;
        writeln!(output)?;
    } else {
        for entry in &labels {
            writeln!(
                output,
                "p{}\t{}\t{}",
                entry.page,
                entry.full_id,
                entry.label.as_deref().unwrap_or("-")
            )?;
        }
    }
    output.flush()?;

    Ok(())
}
