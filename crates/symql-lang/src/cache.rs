//! Compiled statement cache.
//!
//! Statements are cached by shape: the printed statement with its template
//! slots left unresolved. Argument values never reach the compiled text, so
//! executions that differ only in their arguments share one entry. Entries
//! are never evicted.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use symql_proto::Value;

use crate::compiler::{CompiledStatement, Compiler};
use crate::dialect::Dialect;
use crate::error::CompileError;

/// Cache key: dialect name and printed statement.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ShapeKey {
    dialect: String,
    shape: String,
}

impl ShapeKey {
    /// Build the key for a statement compiled for a dialect.
    pub fn new(statement: &Value, dialect: &Dialect) -> Self {
        Self {
            dialect: dialect.name().to_string(),
            shape: statement.to_string(),
        }
    }

    /// The printed statement.
    pub fn shape(&self) -> &str {
        &self.shape
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Thread-safe cache of compiled statements.
///
/// Two threads missing on the same shape both compile it; compilation is
/// deterministic, so whichever insert lands last is equivalent.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: DashMap<ShapeKey, Arc<CompiledStatement>>,
    stats: CacheStats,
}

impl StatementCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static StatementCache {
        static GLOBAL: OnceLock<StatementCache> = OnceLock::new();
        GLOBAL.get_or_init(StatementCache::new)
    }

    /// Look up a compiled statement, compiling and inserting it on a miss.
    pub fn get_or_compile(
        &self,
        statement: &Value,
        dialect: &Dialect,
    ) -> Result<Arc<CompiledStatement>, CompileError> {
        self.lookup(statement, dialect).map(|(compiled, _)| compiled)
    }

    /// Like [`get_or_compile`](Self::get_or_compile), also reporting whether
    /// the entry was already cached.
    pub fn lookup(
        &self,
        statement: &Value,
        dialect: &Dialect,
    ) -> Result<(Arc<CompiledStatement>, bool), CompileError> {
        let key = ShapeKey::new(statement, dialect);
        if let Some(compiled) = self.entries.get(&key) {
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok((Arc::clone(compiled.value()), true));
        }

        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        // Compile outside any shard lock.
        let compiled = Arc::new(Compiler::new(dialect).compile(statement)?);
        self.entries.insert(key, Arc::clone(&compiled));
        Ok((compiled, false))
    }

    /// Get a cached statement without compiling.
    pub fn get(&self, key: &ShapeKey) -> Option<Arc<CompiledStatement>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a shape is cached.
    pub fn contains(&self, statement: &Value, dialect: &Dialect) -> bool {
        self.entries.contains_key(&ShapeKey::new(statement, dialect))
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and reset the statistics.
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.hits.store(0, AtomicOrdering::Relaxed);
        self.stats.misses.store(0, AtomicOrdering::Relaxed);
    }
}
