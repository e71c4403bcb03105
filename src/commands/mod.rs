pub mod cdm;
pub mod infer;
pub mod labels;
pub mod map;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::registry::{PatternRegistry, PatternRuleConfig};
use crate::util::read_json;

pub fn load_registry(patterns: Option<&Path>) -> Result<PatternRegistry> {
    let mut registry = PatternRegistry::with_default_rules()?;

    if let Some(path) = patterns {
        let configs: Vec<PatternRuleConfig> = read_json(path)?;
        registry
            .register_all(&configs)
            .with_context(|| format!("invalid pattern file {}", path.display()))?;
        info!(path = %path.display(), rules = configs.len(), "loaded extra pattern rules");
    }

    Ok(registry)
}
