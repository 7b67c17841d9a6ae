use std::hash::Hasher;
use std::num::NonZeroUsize;

use lru::LruCache;
use xxhash_rust::xxh64::Xxh64;

use crate::planner::ast::Datum;
use crate::planner::plan::ReusedPlan;
use crate::types::StmtId;

/// Default number of cached plans per session.
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 100;

/// Cache key of an optimized prepared-statement plan.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PlanCacheKey {
    /// Prepared statement.
    pub stmt_id: StmtId,
    /// Schema version the plan was optimized against.
    pub schema_version: i64,
    /// Lowercased current database, which unqualified names resolve in.
    pub current_db: Option<String>,
    /// Digest of the bound parameter values.
    pub params_digest: u64,
}

impl PlanCacheKey {
    /// Builds the key for executing `stmt_id` with `params` at
    /// `schema_version` while `current_db` is selected.
    pub fn new(
        stmt_id: StmtId,
        schema_version: i64,
        current_db: Option<&str>,
        params: &[Datum],
    ) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.write_u64(params.len() as u64);
        for param in params {
            param.hash_into(&mut hasher);
        }
        Self {
            stmt_id,
            schema_version,
            current_db: current_db.map(str::to_ascii_lowercase),
            params_digest: hasher.finish(),
        }
    }
}

/// Per-session LRU of optimized prepared-statement plans.
///
/// Entries keep the visit info of the build that produced them so a cache
/// hit is privilege-checked like a fresh build. A capacity of zero disables
/// the cache.
pub struct PlanCache {
    entries: Option<LruCache<PlanCacheKey, ReusedPlan>>,
}

impl PlanCache {
    /// Creates a cache holding up to `capacity` plans.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Returns a copy of the cached plan and marks it recently used.
    pub fn get(&mut self, key: &PlanCacheKey) -> Option<ReusedPlan> {
        self.entries.as_mut()?.get(key).cloned()
    }

    /// Stores a plan, evicting the least recently used entry when full.
    pub fn put(&mut self, key: PlanCacheKey, plan: ReusedPlan) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(key, plan);
        }
    }

    /// Drops every plan of `stmt_id`.
    pub fn invalidate_stmt(&mut self, stmt_id: StmtId) -> usize {
        let Some(entries) = self.entries.as_mut() else {
            return 0;
        };
        let stale: Vec<PlanCacheKey> = entries
            .iter()
            .filter(|(key, _)| key.stmt_id == stmt_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    /// Whether the cache holds no plan.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached plans.
    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.cap().get())
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
