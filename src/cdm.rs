use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::Serialize;
use serde_json::Value;

use crate::inference::KeyInference;
use crate::model::SchemaKey;
use crate::util::read_json;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CdmStore {
    values: BTreeMap<SchemaKey, Option<String>>,
}

impl CdmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SchemaKey, value: Option<String>) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &SchemaKey) -> Option<&str> {
        self.values.get(key).and_then(|value| value.as_deref())
    }

    pub fn contains_key(&self, key: &SchemaKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn schema_categories(&self) -> BTreeMap<String, Vec<String>> {
        let mut categories = BTreeMap::<String, Vec<String>>::new();
        for key in self.values.keys() {
            categories
                .entry(key.category().to_string())
                .or_default()
                .push(key.as_str().to_string());
        }
        categories
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            bail!("CDM data must be a flat JSON object");
        };

        let mut store = Self::new();
        for (raw_key, raw_value) in object {
            let key = SchemaKey::parse(raw_key)
                .with_context(|| format!("invalid CDM key: {raw_key}"))?;
            let value = json_scalar_to_string(raw_value)
                .with_context(|| format!("unsupported value for CDM key {raw_key}"))?;
            store.insert(key, value);
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let value: Value = read_json(path)?;
        Self::from_json_value(&value)
            .with_context(|| format!("invalid CDM file {}", path.display()))
    }
}

fn json_scalar_to_string(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Array(_) | Value::Object(_) => bail!("expected a string, number, boolean or null"),
    }
}

pub fn record_from_json_value(value: &Value) -> Result<Vec<(String, Option<String>)>> {
    let Some(object) = value.as_object() else {
        bail!("record must be a flat JSON object");
    };

    object
        .iter()
        .map(|(column, raw_value)| {
            let value = json_scalar_to_string(raw_value)
                .with_context(|| format!("unsupported value for column {column}"))?;
            Ok((column.clone(), value))
        })
        .collect()
}

pub fn build_cdm_from_record(
    record: &[(String, Option<String>)],
    overrides: &BTreeMap<String, SchemaKey>,
    inference: &KeyInference<'_>,
) -> CdmStore {
    let mut store = CdmStore::new();

    for (column, value) in record {
        let Some(value) = value.as_ref().filter(|value| !value.trim().is_empty()) else {
            continue;
        };

        let key = overrides
            .get(column)
            .cloned()
            .or_else(|| inference.infer(column));

        if let Some(key) = key {
            store.insert(key, Some(value.clone()));
        }
    }

    store
}

pub fn cdm_template_from_columns<S: AsRef<str>>(
    columns: &[S],
    inference: &KeyInference<'_>,
) -> CdmStore {
    let mut store = CdmStore::new();
    for column in columns {
        if let Some(key) = inference.infer(column.as_ref()) {
            store.insert(key, None);
        }
    }
    store
}

pub fn load_record_from_sqlite(
    connection: &Connection,
    table: &str,
    key_column: &str,
    key_value: &str,
) -> Result<Vec<(String, Option<String>)>> {
    let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .context("failed to compile SQL identifier regex")?;
    for name in [table, key_column] {
        if !identifier.is_match(name) {
            bail!("invalid SQL identifier: {name:?}");
        }
    }

    let sql = format!("SELECT * FROM \"{table}\" WHERE \"{key_column}\" = ?1 LIMIT 1");
    let mut statement = connection
        .prepare(&sql)
        .with_context(|| format!("failed to prepare record query on table {table}"))?;
    let columns = statement
        .column_names()
        .into_iter()
        .map(ToOwned::to_owned)
        .collect::<Vec<String>>();

    let mut rows = statement.query([key_value])?;
    let Some(row) = rows.next()? else {
        bail!("no row in {table} where {key_column} = {key_value:?}");
    };

    let mut record = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => None,
            ValueRef::Integer(number) => Some(number.to_string()),
            ValueRef::Real(number) => Some(number.to_string()),
            ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(_) => None,
        };
        record.push((column.clone(), value));
    }

    Ok(record)
}
