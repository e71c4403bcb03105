use crate::model::SchemaKey;
use crate::registry::PatternRegistry;

const SEPARATOR: &str = "_";

pub fn normalize_identifier(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(SEPARATOR)
}

pub fn widget_base_name(short_id: &str) -> &str {
    let mut base = short_id;
    while let Some(inner) = base.strip_suffix(']') {
        let Some(open) = inner.rfind('[') else {
            break;
        };
        let index = &inner[open + 1..];
        if index.is_empty() || !index.chars().all(|character| character.is_ascii_digit()) {
            break;
        }
        base = &inner[..open];
    }
    base
}

#[derive(Debug, Clone, Copy)]
pub struct KeyInference<'a> {
    registry: &'a PatternRegistry,
}

impl<'a> KeyInference<'a> {
    pub fn new(registry: &'a PatternRegistry) -> Self {
        Self { registry }
    }

    pub fn infer(&self, raw_identifier: &str) -> Option<SchemaKey> {
        let normalized = normalize_identifier(raw_identifier);
        if normalized.is_empty() {
            return None;
        }

        self.registry
            .rules()
            .iter()
            .find(|rule| {
                rule.patterns
                    .iter()
                    .any(|pattern| pattern.full_match(&normalized))
            })
            .map(|rule| rule.key.clone())
    }
}
