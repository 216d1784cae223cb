use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use intake_core::RecordType;

use crate::errors::{Result, ValidationIssue};
use crate::model::{Rule, RuleSet, RuleVersion};
use crate::validate::load_rule_set;

/// Read side of the external rule store.
pub trait RuleRepository: Send + Sync {
    /// Rules registered for a record type. Callers still re-check `active`.
    fn fetch_rules(&self, record_type: RecordType) -> Result<Vec<Rule>>;

    /// Current version token of one rule, `None` once it no longer exists.
    fn fetch_rule_version(&self, rule_id: &str) -> Result<Option<RuleVersion>>;
}

/// Repository backed by a map, mutable for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<BTreeMap<String, Rule>>,
}

impl InMemoryRuleRepository {
    pub fn new(rules: Vec<Rule>) -> Self {
        let repository = Self::default();
        for rule in rules {
            repository.upsert(rule);
        }
        repository
    }

    pub fn upsert(&self, rule: Rule) {
        let mut rules = self
            .rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.insert(rule.rule_id.clone(), rule);
    }

    pub fn remove(&self, rule_id: &str) -> Option<Rule> {
        self.rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(rule_id)
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn fetch_rules(&self, record_type: RecordType) -> Result<Vec<Rule>> {
        let rules = self
            .rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(rules
            .values()
            .filter(|rule| rule.record_type == record_type)
            .cloned()
            .collect())
    }

    fn fetch_rule_version(&self, rule_id: &str) -> Result<Option<RuleVersion>> {
        let rules = self
            .rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(rules.get(rule_id).map(Rule::version_token))
    }
}

/// Repository reading a `rules.json` document from disk.
///
/// The document is validated against the rule-set JSON Schema when opened and
/// on every [`JsonFileRuleRepository::reload`].
#[derive(Debug)]
pub struct JsonFileRuleRepository {
    path: PathBuf,
    inner: InMemoryRuleRepository,
    warnings: Vec<ValidationIssue>,
}

impl JsonFileRuleRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let validated = load_rule_set(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: InMemoryRuleRepository::new(validated.rule_set.rules),
            warnings: validated.warnings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-fatal issues found when the document was loaded.
    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    /// Re-read the document, replacing every rule.
    pub fn reload(&mut self) -> Result<()> {
        let validated = load_rule_set(&self.path)?;
        self.inner = InMemoryRuleRepository::new(validated.rule_set.rules);
        self.warnings = validated.warnings;
        Ok(())
    }

    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut rules = Vec::new();
        for record_type in RecordType::ALL {
            rules.extend(self.inner.fetch_rules(record_type)?);
        }
        Ok(RuleSet::new(rules))
    }
}

impl RuleRepository for JsonFileRuleRepository {
    fn fetch_rules(&self, record_type: RecordType) -> Result<Vec<Rule>> {
        self.inner.fetch_rules(record_type)
    }

    fn fetch_rule_version(&self, rule_id: &str) -> Result<Option<RuleVersion>> {
        self.inner.fetch_rule_version(rule_id)
    }
}

#[cfg(test)]
mod tests {
    use intake_core::Severity;

    use super::*;
    use crate::model::RuleType;

    #[test]
    fn in_memory_repository_filters_by_record_type() {
        let repository = InMemoryRuleRepository::new(vec![
            Rule::new("S1", RecordType::Sales, RuleType::Range, "quantity > 0", Severity::Critical),
            Rule::new("E1", RecordType::Expense, RuleType::Range, "amount > 0", Severity::Critical),
        ]);

        let sales = repository.fetch_rules(RecordType::Sales).expect("fetch");
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].rule_id, "S1");
        assert_eq!(
            repository.fetch_rule_version("E1").expect("version"),
            Some(RuleVersion {
                version: 1,
                updated_at: String::new()
            })
        );
        assert_eq!(repository.fetch_rule_version("missing").expect("version"), None);
    }
}
