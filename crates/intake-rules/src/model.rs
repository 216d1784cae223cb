use std::fmt;

use intake_core::{RecordType, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current contract version for rule documents.
pub const RULE_SET_VERSION: &str = "0.1";

/// How a rule expression is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// A field or function result compared against literal bounds.
    Range,
    /// A comparison between computed operands, e.g. `total == qty * price`.
    Comparison,
    /// Any boolean expression.
    Business,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Range => "RANGE",
            RuleType::Comparison => "COMPARISON",
            RuleType::Business => "BUSINESS",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version token a compiled rule is tied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RuleVersion {
    pub version: u64,
    /// Opaque timestamp text maintained by the rule store.
    pub updated_at: String,
}

/// A business rule as stored in the rule repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rule {
    pub rule_id: String,
    pub record_type: RecordType,
    pub rule_type: RuleType,
    /// Predicate that must hold for a valid row.
    pub expression: String,
    pub severity: Severity,
    /// Message template; `{field}` and `{rule_id}` placeholders are rendered.
    #[serde(default)]
    pub error_message: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Rule {
    pub fn new(
        rule_id: &str,
        record_type: RecordType,
        rule_type: RuleType,
        expression: &str,
        severity: Severity,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            record_type,
            rule_type,
            expression: expression.to_string(),
            severity,
            error_message: String::new(),
            active: true,
            version: 1,
            updated_at: String::new(),
            rule_name: None,
            description: None,
        }
    }

    pub fn with_message(mut self, template: &str) -> Self {
        self.error_message = template.to_string();
        self
    }

    pub fn with_version(mut self, version: u64, updated_at: &str) -> Self {
        self.version = version;
        self.updated_at = updated_at.to_string();
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn version_token(&self) -> RuleVersion {
        RuleVersion {
            version: self.version,
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Rule document as stored on disk (`rules.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RuleSet {
    /// Rule document contract version.
    #[serde(default = "default_rule_set_version")]
    pub rule_set_version: String,
    pub rules: Vec<Rule>,
}

fn default_rule_set_version() -> String {
    RULE_SET_VERSION.to_string()
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rule_set_version: default_rule_set_version(),
            rules,
        }
    }

    pub fn for_record_type(&self, record_type: RecordType) -> Vec<Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.record_type == record_type)
            .cloned()
            .collect()
    }
}

/// SHA-256 over the sorted `(rule_id, version, updated_at, active)` entries of a rule set.
///
/// Identifies the exact rule revision a response was produced with.
pub fn fingerprint(rules: &[Rule]) -> String {
    let mut entries = rules
        .iter()
        .map(|rule| {
            format!(
                "{}\u{1f}{}\u{1f}{}\u{1f}{}",
                rule.rule_id, rule.version, rule.updated_at, rule.active
            )
        })
        .collect::<Vec<_>>();
    entries.sort();

    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
