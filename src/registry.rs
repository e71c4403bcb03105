use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::model::SchemaKey;

const DEFAULT_RULES: &[(&str, &[&str])] = &[
    (
        "person.full_name",
        &[
            r"full_?name|name|full_?legal_?name",
            r"client_?name|customer_?name",
        ],
    ),
    ("person.first_name", &[r"first_?name|given_?name|fname"]),
    (
        "person.middle_name",
        &[r"middle_?name|middle_?initial|mname|mi"],
    ),
    ("person.last_name", &[r"last_?name|surname|family_?name|lname"]),
    ("person.suffix", &[r"suffix|name_?suffix|jr_?sr"]),
    ("person.ssn", &[r"ssn|social_?security(_?number)?|tax_?id|ein|tin"]),
    (
        "person.phone",
        &[
            r"phone|mobile|cell|telephone|contact_?number",
            r"phone_?number|mobile_?number|daytime_?phone(_?number)?",
        ],
    ),
    ("person.phone_extension", &[r"ext|extension|phone_?ext"]),
    ("person.email", &[r"email|e_?mail|email_?address"]),
    ("person.dob", &[r"dob|date_?of_?birth|birth_?date|birthdate"]),
    ("person.address", &[r"address|full_?address|mailing_?address"]),
    (
        "person.street",
        &[r"street|street_?address|address_?line|addr", r"street_?1|address_?1"],
    ),
    ("person.city", &[r"city"]),
    ("person.state", &[r"state|province"]),
    ("person.zip", &[r"zip|zip_?code|postal_?code|postcode"]),
    (
        "account.number",
        &[r"account_?number|acct_?num(ber)?|account_?no"],
    ),
    ("account.type", &[r"account_?type|acct_?type"]),
    (
        "bank.name",
        &[r"bank_?name|institution_?name|financial_?institution"],
    ),
    ("bank.routing", &[r"routing|routing_?number|aba|aba_?number"]),
];

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    regex: Regex,
}

impl CompiledPattern {
    fn compile(key: &SchemaKey, source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("(?i)^(?:{source})$")).with_context(|| {
            format!("failed to compile pattern {source:?} for schema key {key}")
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn full_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub key: SchemaKey,
    pub patterns: Vec<CompiledPattern>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    rules: Vec<PatternRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternRuleConfig {
    pub key: String,
    pub patterns: Vec<String>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_rules() -> Result<Self> {
        let mut registry = Self::new();
        for (key, patterns) in DEFAULT_RULES {
            registry.register(&SchemaKey::parse(key)?, *patterns)?;
        }
        Ok(registry)
    }

    pub fn register<S: AsRef<str>>(&mut self, key: &SchemaKey, patterns: &[S]) -> Result<()> {
        let compiled = patterns
            .iter()
            .map(|pattern| CompiledPattern::compile(key, pattern.as_ref()))
            .collect::<Result<Vec<CompiledPattern>>>()?;

        match self.rules.iter_mut().find(|rule| &rule.key == key) {
            Some(rule) => rule.patterns.extend(compiled),
            None => self.rules.push(PatternRule {
                key: key.clone(),
                patterns: compiled,
            }),
        }

        Ok(())
    }

    pub fn register_all(&mut self, configs: &[PatternRuleConfig]) -> Result<()> {
        for config in configs {
            let key = SchemaKey::parse(&config.key)
                .with_context(|| format!("invalid key in pattern config: {}", config.key))?;
            self.register(&key, config.patterns.as_slice())?;
        }
        Ok(())
    }

    pub fn patterns(&self, key: &SchemaKey) -> Vec<&str> {
        self.rules
            .iter()
            .find(|rule| &rule.key == key)
            .map(|rule| {
                rule.patterns
                    .iter()
                    .map(|pattern| pattern.source.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_keys(&self) -> Vec<&SchemaKey> {
        self.rules.iter().map(|rule| &rule.key).collect()
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SchemaKey {
        SchemaKey::parse(raw).expect("valid test key")
    }

    #[test]
    fn register_appends_under_existing_key_and_keeps_key_position() {
        let mut registry = PatternRegistry::new();
        registry
            .register(&key("patient.mrn"), &["mrn"])
            .expect("register mrn");
        registry
            .register(&key("patient.blood_type"), &["blood_?type"])
            .expect("register blood type");
        registry
            .register(&key("patient.mrn"), &["medical_?record"])
            .expect("append mrn pattern");

        let keys = registry
            .all_keys()
            .into_iter()
            .map(|value| value.as_str().to_string())
            .collect::<Vec<String>>();
        assert_eq!(keys, vec!["patient.mrn", "patient.blood_type"]);
        assert_eq!(
            registry.patterns(&key("patient.mrn")),
            vec!["mrn", "medical_?record"]
        );
        assert!(registry.patterns(&key("patient.unknown")).is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected_with_key_context() {
        let mut registry = PatternRegistry::new();
        let err = registry
            .register(&key("person.city"), &["(unclosed"])
            .expect_err("pattern should fail to compile");
        assert!(err.to_string().contains("person.city"));
        assert!(registry.rules().is_empty());
    }

    #[test]
    fn default_rules_start_with_person_keys() {
        let registry = PatternRegistry::with_default_rules().expect("default rules compile");
        assert_eq!(registry.len(), DEFAULT_RULES.len());
        assert_eq!(registry.all_keys()[0].as_str(), "person.full_name");
    }

    #[test]
    fn register_all_reads_config_entries_in_order() {
        let configs: Vec<PatternRuleConfig> = serde_json::from_str(
            r#"[
                {"key": "patient.mrn", "patterns": ["mrn|medical_?record"]},
                {"key": "patient.blood_type", "patterns": ["blood_?type"]}
            ]"#,
        )
        .expect("config json");

        let mut registry = PatternRegistry::new();
        registry.register_all(&configs).expect("register config");
        assert_eq!(registry.all_keys()[1].as_str(), "patient.blood_type");
    }
}
