use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::InferArgs;
use crate::commands::load_registry;
use crate::inference::{KeyInference, normalize_identifier, widget_base_name};
use crate::registry::PatternRegistry;

#[derive(Debug, Clone, Serialize)]
struct InferenceResult {
    identifier: String,
    normalized: String,
    key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct KeyListing {
    key: String,
    patterns: Vec<String>,
}

pub fn run(args: InferArgs) -> Result<()> {
    if args.identifiers.is_empty() && !args.list_keys {
        bail!("pass at least one --identifier or --list-keys");
    }

    let registry = load_registry(args.patterns.as_deref())?;
    info!(keys = registry.len(), "pattern registry ready");

    if args.list_keys {
        write_key_listing(&registry, args.json)?;
    }

    if args.identifiers.is_empty() {
        return Ok(());
    }

    let inference = KeyInference::new(&registry);
    let results = args
        .identifiers
        .iter()
        .map(|identifier| {
            let base = widget_base_name(identifier.trim());
            InferenceResult {
                identifier: identifier.clone(),
                normalized: normalize_identifier(base),
                key: inference.infer(base).map(|key| key.to_string()),
            }
        })
        .collect::<Vec<InferenceResult>>();

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &results)
            .context("failed to serialize inference output")?;
        writeln!(output)?;
    } else {
        for result in &results {
            writeln!(
                output,
                "{}\t{}",
                result.identifier,
                result.key.as_deref().unwrap_or("-")
            )?;
        }
    }
    output.flush()?;

    Ok(())
}

fn write_key_listing(registry: &PatternRegistry, json: bool) -> Result<()> {
    let listing = registry
        .all_keys()
        .into_iter()
        .map(|key| KeyListing {
            key: key.to_string(),
            patterns: registry
                .patterns(key)
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        })
        .collect::<Vec<KeyListing>>();

    let mut output = io::BufWriter::new(io::stdout().lock());
    if json {
        serde_json::to_writer_pretty(&mut output, &listing)
            .context("failed to serialize key listing")?;
        writeln!(output)?;
    } else {
        for entry in &listing {
            writeln!(output, "{}\t{}", entry.key, entry.patterns.join(" ; "))?;
        }
    }
    output.flush()?;

    Ok(())
}
