use std::sync::Arc;

use intake_core::{FieldSchema, FieldSpec, FieldType, RecordType, Severity};
use intake_rules::{
    CacheConfig, CompiledRule, InMemoryRuleRepository, Lookup, Rule, RuleCache, RuleType,
};

fn schema() -> FieldSchema {
    FieldSchema::new(
        RecordType::Sales,
        vec![
            FieldSpec::required("quantity", FieldType::Integer),
            FieldSpec::required("unit_price", FieldType::Decimal),
        ],
    )
}

fn rule(id: &str) -> Rule {
    Rule::new(
        id,
        RecordType::Sales,
        RuleType::Range,
        "quantity > 0",
        Severity::Critical,
    )
}

fn compiled(cache: &RuleCache, rule: &Rule) -> Arc<CompiledRule> {
    match cache.get_or_compile(rule, &schema()).expect("compile") {
        Lookup::Compiled(compiled) => compiled,
        Lookup::Inactive => panic!("rule {} unexpectedly inactive", rule.rule_id),
    }
}

#[test]
fn least_recently_used_entry_is_evicted_first() {
    let cache = RuleCache::new(CacheConfig {
        capacity: 2,
        shards: 4,
    });

    compiled(&cache, &rule("A"));
    compiled(&cache, &rule("B"));
    compiled(&cache, &rule("A"));
    compiled(&cache, &rule("C"));

    assert_eq!(cache.len(), 2);
    assert!(cache.contains("A"));
    assert!(!cache.contains("B"));
    assert!(cache.contains("C"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.evictions, 1);

    compiled(&cache, &rule("B"));
    assert_eq!(cache.stats().misses, 4);
    assert!(!cache.contains("A"));
}

#[test]
fn version_change_forces_recompilation() {
    let cache = RuleCache::default();
    let first = compiled(&cache, &rule("A").with_version(1, "2024-01-01T00:00:00Z"));
    let bumped = Rule::new(
        "A",
        RecordType::Sales,
        RuleType::Range,
        "quantity > 10",
        Severity::Critical,
    )
    .with_version(2, "2024-02-01T00:00:00Z");

    let second = compiled(&cache, &bumped);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.expression, "quantity > 10");
    assert_eq!(second.version.version, 2);
    assert_eq!(cache.stats().invalidations, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn expression_edit_without_version_bump_is_not_served_stale() {
    let cache = RuleCache::default();
    compiled(&cache, &rule("A"));
    let mut edited = rule("A");
    edited.expression = "quantity >= 5".to_string();

    let refreshed = compiled(&cache, &edited);
    assert_eq!(refreshed.expression, "quantity >= 5");
}

#[test]
fn deactivated_rule_is_dropped_and_skipped() {
    let cache = RuleCache::default();
    compiled(&cache, &rule("A"));
    assert!(cache.contains("A"));

    let lookup = cache
        .get_or_compile(&rule("A").deactivated(), &schema())
        .expect("lookup");
    assert!(matches!(lookup, Lookup::Inactive));
    assert!(!cache.contains("A"));
}

#[test]
fn refresh_invalidates_changed_and_deleted_rules() {
    let cache = RuleCache::default();
    let repository = InMemoryRuleRepository::new(vec![rule("A"), rule("B"), rule("C")]);
    for id in ["A", "B", "C"] {
        compiled(&cache, &rule(id));
    }

    repository.upsert(rule("A").with_version(2, "2024-03-01T00:00:00Z"));
    repository.remove("B");

    assert_eq!(cache.refresh(&repository), 2);
    assert!(!cache.contains("A"));
    assert!(!cache.contains("B"));
    assert!(cache.contains("C"));
}

#[test]
fn concurrent_lookups_share_one_compiled_rule() {
    let cache = Arc::new(RuleCache::new(CacheConfig {
        capacity: 8,
        shards: 4,
    }));
    let handles = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                (0..50)
                    .map(|_| compiled(&cache, &rule("SHARED")))
                    .last()
                    .expect("at least one lookup")
            })
        })
        .collect::<Vec<_>>();

    let results = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect::<Vec<_>>();
    assert_eq!(cache.len(), 1);
    let stored = compiled(&cache, &rule("SHARED"));
    assert!(results.iter().all(|result| Arc::ptr_eq(result, &stored)));
}

#[test]
fn process_wide_cache_is_sized_by_the_first_initialiser() {
    assert!(RuleCache::init_global(CacheConfig {
        capacity: 7,
        shards: 2,
    }));
    assert!(!RuleCache::init_global(CacheConfig::default()));

    let cache = RuleCache::global();
    assert_eq!(cache.capacity(), 7);
    compiled(cache, &rule("R-global"));
    compiled(RuleCache::global(), &rule("R-global"));

    let stats = RuleCache::global().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}
