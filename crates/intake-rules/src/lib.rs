//! Business rule documents, the expression language and the compiled-rule cache.

pub mod ast;
pub mod cache;
pub mod compile;
pub mod context;
pub mod errors;
pub mod eval;
pub mod executor;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod repository;
pub mod schema;
pub mod validate;

pub use cache::{CacheConfig, CacheStats, Lookup, RuleCache};
pub use compile::{CompiledRule, compile};
pub use context::{FileContext, RowContext};
pub use errors::{
    IssueSeverity, Result, RuleCompilationError, RuleEvaluationError, RulesError,
    ValidationIssue, ValidationReport,
};
pub use eval::evaluate_rule;
pub use executor::{RulePlan, RuleWarning, Violation, ViolationKind, evaluate, render_message};
pub use model::{RULE_SET_VERSION, Rule, RuleSet, RuleType, RuleVersion, fingerprint};
pub use parser::parse_expression;
pub use repository::{InMemoryRuleRepository, JsonFileRuleRepository, RuleRepository};
pub use schema::rule_set_json_schema;
pub use validate::{
    ValidatedRuleSet, check_rules, load_rule_set, validate_rule_set, validate_rule_set_json,
};
