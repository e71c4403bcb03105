use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::info;

use crate::cdm::{
    CdmStore, build_cdm_from_record, cdm_template_from_columns, load_record_from_sqlite,
    record_from_json_value,
};
use crate::cli::{CdmArgs, RecordSourceArgs};
use crate::commands::load_registry;
use crate::inference::KeyInference;
use crate::model::SchemaKey;
use crate::util::{read_json, utc_compact_string, write_json_pretty};

pub fn run(args: CdmArgs) -> Result<()> {
    let registry = load_registry(args.patterns.as_deref())?;
    let inference = KeyInference::new(&registry);
    let store = if args.template {
        let record = load_record(&args.record)?;
        let columns = record
            .iter()
            .map(|(column, _)| column.as_str())
            .collect::<Vec<&str>>();
        cdm_template_from_columns(&columns, &inference)
    } else {
        load_record_cdm(&args.record, &inference)?
    };

    let output = args.output.unwrap_or_else(|| {
        let stamp = utc_compact_string(Utc::now());
        PathBuf::from(".cache/formmap").join(format!("cdm_{stamp}.json"))
    });
    write_json_pretty(&output, &store)?;
    info!(path = %output.display(), keys = store.len(), "wrote CDM data");

    Ok(())
}

pub fn load_record_cdm(
    source: &RecordSourceArgs,
    inference: &KeyInference<'_>,
) -> Result<CdmStore> {
    let overrides = parse_overrides(&source.overrides)?;
    let record = load_record(source)?;

    let store = build_cdm_from_record(&record, &overrides, inference);
    info!(
        columns = record.len(),
        overrides = overrides.len(),
        keys = store.len(),
        "built CDM data from record"
    );

    Ok(store)
}

fn load_record(source: &RecordSourceArgs) -> Result<Vec<(String, Option<String>)>> {
    if let Some(path) = &source.record {
        let value: Value = read_json(path)?;
        return record_from_json_value(&value)
            .with_context(|| format!("invalid record file {}", path.display()));
    }

    if let Some(db_path) = &source.db {
        let Some(key_value) = source.key_value.as_deref() else {
            bail!("--key-value is required with --db");
        };
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database read-only: {}", db_path.display()))?;
        return load_record_from_sqlite(&connection, &source.table, &source.key_column, key_value);
    }

    bail!("one of --record or --db is required");
}

fn parse_overrides(raw: &[String]) -> Result<BTreeMap<String, SchemaKey>> {
    let mut overrides = BTreeMap::new();
    for entry in raw {
        let Some((column, key)) = entry.split_once('=') else {
            bail!("override must look like COLUMN=KEY: {entry:?}");
        };
        let column = column.trim();
        if column.is_empty() {
            bail!("override has an empty column name: {entry:?}");
        }
        let key = SchemaKey::parse(key).with_context(|| format!("invalid override {entry:?}"))?;
        overrides.insert(column.to_string(), key);
    }
    Ok(overrides)
}
