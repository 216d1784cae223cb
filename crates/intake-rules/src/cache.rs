use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use intake_core::FieldSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compile::{CompiledRule, compile};
use crate::errors::RuleCompilationError;
use crate::model::{Rule, RuleVersion};
use crate::repository::RuleRepository;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_SHARDS: usize = 16;

/// Sizing for a [`RuleCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shards: DEFAULT_SHARDS,
        }
    }
}

/// Counter snapshot for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Compiled(Arc<CompiledRule>),
    /// The rule is inactive; any cached entry was dropped.
    Inactive,
}

enum Probe {
    Fresh(Arc<CompiledRule>),
    Stale,
    Absent,
}

#[derive(Debug)]
struct Entry {
    compiled: Arc<CompiledRule>,
    last_access: AtomicU64,
}

/// Bounded LRU cache of compiled rules keyed by rule id.
///
/// Reads take a read lock on one shard and bump an atomic recency stamp, so
/// lookups of unrelated keys never wait on each other. Inserts and evictions
/// are serialized through a single writer lock.
#[derive(Debug)]
pub struct RuleCache {
    shards: Vec<RwLock<HashMap<String, Arc<Entry>>>>,
    writer: Mutex<()>,
    capacity: usize,
    clock: AtomicU64,
    len: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

static GLOBAL: OnceLock<RuleCache> = OnceLock::new();

impl RuleCache {
    pub fn new(config: CacheConfig) -> Self {
        let shards = config.shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            writer: Mutex::new(()),
            capacity: config.capacity.max(1),
            clock: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Process-wide cache, created empty on first use.
    pub fn global() -> &'static RuleCache {
        GLOBAL.get_or_init(|| RuleCache::new(CacheConfig::default()))
    }

    /// Size the process-wide cache before its first use.
    ///
    /// Returns `false` when the global cache already exists.
    pub fn init_global(config: CacheConfig) -> bool {
        GLOBAL.set(RuleCache::new(config)).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the compiled form of `rule`, compiling on a miss.
    ///
    /// A cached entry built from another version of the rule is invalidated
    /// and recompiled. Compilation errors are not cached.
    pub fn get_or_compile(
        &self,
        rule: &Rule,
        schema: &FieldSchema,
    ) -> Result<Lookup, RuleCompilationError> {
        if !rule.active {
            self.invalidate(&rule.rule_id);
            return Ok(Lookup::Inactive);
        }

        match self.probe(rule) {
            Probe::Fresh(compiled) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Lookup::Compiled(compiled));
            }
            Probe::Stale => {
                self.invalidate(&rule.rule_id);
            }
            Probe::Absent => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile(rule, schema)?);
        Ok(Lookup::Compiled(self.insert(compiled)))
    }

    fn probe(&self, rule: &Rule) -> Probe {
        let shard = self.read_shard(&rule.rule_id);
        match shard.get(&rule.rule_id) {
            None => Probe::Absent,
            Some(entry) if !entry.compiled.matches(rule) => Probe::Stale,
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                Probe::Fresh(Arc::clone(&entry.compiled))
            }
        }
    }

    fn insert(&self, compiled: Arc<CompiledRule>) -> Arc<CompiledRule> {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let key = compiled.rule_id.clone();
        let mut replaced = false;
        {
            let shard = self.read_shard(&key);
            if let Some(existing) = shard.get(&key) {
                if existing.compiled.same_revision(&compiled) {
                    existing.last_access.store(self.tick(), Ordering::Relaxed);
                    return Arc::clone(&existing.compiled);
                }
                replaced = true;
            }
        }

        if !replaced && self.len.load(Ordering::Relaxed) >= self.capacity {
            self.evict_least_recent();
        }

        let entry = Arc::new(Entry {
            compiled: Arc::clone(&compiled),
            last_access: AtomicU64::new(self.tick()),
        });
        let previous = self.write_shard(&key).insert(key, entry);
        if previous.is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        compiled
    }

    /// Remove the entry with the oldest recency stamp. Caller holds the writer lock.
    fn evict_least_recent(&self) {
        let mut oldest: Option<(u64, usize, String)> = None;
        for (index, shard) in self.shards.iter().enumerate() {
            let shard = shard.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            for (key, entry) in shard.iter() {
                let stamp = entry.last_access.load(Ordering::Relaxed);
                if oldest.as_ref().is_none_or(|(best, _, _)| stamp < *best) {
                    oldest = Some((stamp, index, key.clone()));
                }
            }
        }

        if let Some((_, index, key)) = oldest {
            let removed = self.shards[index]
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&key);
            if removed.is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(event = "rule_cache_evicted", rule_id = %key);
            }
        }
    }

    /// Drop the entry for `rule_id`; the next lookup is a miss.
    pub fn invalidate(&self, rule_id: &str) -> bool {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = self.write_shard(rule_id).remove(rule_id).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(event = "rule_cache_invalidated", rule_id = %rule_id);
        }
        removed
    }

    pub fn invalidate_all(&self) {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut removed = 0usize;
        for shard in &self.shards {
            let mut shard = shard.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            removed += shard.len();
            shard.clear();
        }
        self.len.store(0, Ordering::Relaxed);
        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        info!(event = "rule_cache_cleared", removed);
    }

    /// Invalidate every entry whose backing version changed or disappeared.
    ///
    /// Returns the number of invalidated entries.
    pub fn refresh(&self, repository: &dyn RuleRepository) -> usize {
        let cached = self.cached_versions();
        let mut invalidated = 0;
        for (rule_id, version) in cached {
            let current = match repository.fetch_rule_version(&rule_id) {
                Ok(current) => current,
                Err(err) => {
                    debug!(event = "rule_version_lookup_failed", rule_id = %rule_id, error = %err);
                    None
                }
            };
            if current.as_ref() != Some(&version) && self.invalidate(&rule_id) {
                invalidated += 1;
            }
        }
        invalidated
    }

    fn cached_versions(&self) -> Vec<(String, RuleVersion)> {
        let mut versions = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            versions.extend(
                shard
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.compiled.version.clone())),
            );
        }
        versions.sort_by(|a, b| a.0.cmp(&b.0));
        versions
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.read_shard(rule_id).contains_key(rule_id)
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, Arc<Entry>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    fn read_shard(&self, key: &str) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Entry>>> {
        self.shard(key)
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_shard(
        &self,
        key: &str,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Entry>>> {
        self.shard(key)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use intake_core::{FieldSpec, FieldType, RecordType, Severity};

    use super::*;
    use crate::model::RuleType;

    fn schema() -> FieldSchema {
        FieldSchema::new(
            RecordType::Sales,
            vec![FieldSpec::required("quantity", FieldType::Integer)],
        )
    }

    fn rule(id: &str) -> Rule {
        Rule::new(id, RecordType::Sales, RuleType::Range, "quantity > 0", Severity::Warning)
    }

    fn compiled(lookup: Lookup) -> Arc<CompiledRule> {
        match lookup {
            Lookup::Compiled(compiled) => compiled,
            Lookup::Inactive => panic!("expected compiled rule"),
        }
    }

    #[test]
    fn hit_returns_the_same_compiled_rule() {
        let cache = RuleCache::new(CacheConfig {
            capacity: 4,
            shards: 2,
        });
        let first = compiled(cache.get_or_compile(&rule("A"), &schema()).expect("compile"));
        let second = compiled(cache.get_or_compile(&rule("A"), &schema()).expect("compile"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn compile_errors_are_not_cached() {
        let cache = RuleCache::default();
        let broken = Rule::new("X", RecordType::Sales, RuleType::Range, "quantity >", Severity::Info);
        assert!(cache.get_or_compile(&broken, &schema()).is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_compile(&broken, &schema()).is_err());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn invalidate_all_empties_every_shard() {
        let cache = RuleCache::new(CacheConfig {
            capacity: 8,
            shards: 3,
        });
        for id in ["A", "B", "C", "D"] {
            cache.get_or_compile(&rule(id), &schema()).expect("compile");
        }
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 4);
        assert!(!cache.contains("A"));
    }
}
