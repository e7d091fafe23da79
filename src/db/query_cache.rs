//! Logical-key statement cache.
//!
//! Maps a stable operation name (e.g. `"GET_GOLD"`) to the parameterized SQL
//! shape built for it on first use. Later calls skip shape construction and
//! only bind new values; because the text is identical every time, sqlx's
//! per-connection persistent statement cache prepares it once per pooled
//! connection and reuses the server-side plan afterwards.
//!
//! Entries are never evicted: there is one per distinct operation in the
//! codebase, so the key space is bounded.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::DbError;

/// A cached statement shape.
#[derive(Debug, PartialEq, Eq)]
pub struct PreparedStatement {
    pub key: &'static str,
    pub sql: &'static str,
    pub param_count: usize,
}

impl PreparedStatement {
    /// Check that a call binds as many values as the cached shape expects.
    pub fn check_arity(&self, actual: usize) -> Result<(), DbError> {
        if actual == self.param_count {
            Ok(())
        } else {
            Err(DbError::ShapeMismatch {
                key: self.key,
                expected: self.param_count,
                actual,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

static GLOBAL: Lazy<Arc<QueryCache>> = Lazy::new(|| Arc::new(QueryCache::new()));

/// Thread-safe logical-key -> statement shape map.
pub struct QueryCache {
    statements: DashMap<&'static str, &'static PreparedStatement>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            statements: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The process-wide cache, created lazily on first access.
    pub fn global() -> Arc<QueryCache> {
        Arc::clone(&GLOBAL)
    }

    /// Return the statement cached under `key`, building it with `build` if
    /// absent.
    ///
    /// `build` returns the SQL text and its placeholder count. It runs while
    /// the key's shard is locked, so concurrent first callers build a shape at
    /// most once per key.
    pub fn get_or_prepare<F>(
        &self,
        key: &'static str,
        build: F,
    ) -> Result<&'static PreparedStatement, DbError>
    where
        F: FnOnce() -> Result<(String, usize), DbError>,
    {
        if let Some(stmt) = self.statements.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*stmt);
        }

        let stmt = match self.statements.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                *entry.get()
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (sql, param_count) = build()?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, sql = %sql, "Prepared statement shape cached");
                // Lives for the rest of the process, like the map entry itself.
                let stmt: &'static PreparedStatement = Box::leak(Box::new(PreparedStatement {
                    key,
                    sql: Box::leak(sql.into_boxed_str()),
                    param_count,
                }));
                *entry.insert(stmt)
            }
        };
        Ok(stmt)
    }

    pub fn get(&self, key: &str) -> Option<&'static PreparedStatement> {
        self.statements.get(key).map(|stmt| *stmt)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_first_call_prepares_then_reuses() {
        let cache = QueryCache::new();
        let first = cache
            .get_or_prepare("GET_GOLD", || {
                Ok(("SELECT gold FROM user_currencies WHERE id = $1".into(), 1))
            })
            .unwrap();
        let second = cache
            .get_or_prepare("GET_GOLD", || panic!("shape must not be rebuilt"))
            .unwrap();

        assert!(std::ptr::eq(first, second));
        assert_eq!(first.sql, "SELECT gold FROM user_currencies WHERE id = $1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_distinct_keys_get_distinct_entries() {
        let cache = QueryCache::new();
        cache
            .get_or_prepare("GET_GOLD", || Ok(("SELECT gold".into(), 0)))
            .unwrap();
        cache
            .get_or_prepare("GET_CASH", || Ok(("SELECT cash".into(), 0)))
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("GET_CASH").unwrap().sql, "SELECT cash");
        assert!(cache.get("GET_LEVEL").is_none());
    }

    #[test]
    fn test_failed_build_caches_nothing() {
        let cache = QueryCache::new();
        let result = cache.get_or_prepare("BAD", || Err(DbError::InvalidIdentifier("x y".into())));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let cache = Arc::new(QueryCache::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            handles.push(thread::spawn(move || {
                cache
                    .get_or_prepare("COUNT_USER_CURRENCIES", || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Ok(("SELECT COUNT(*) FROM user_currencies WHERE id = $1".into(), 1))
                    })
                    .unwrap()
                    .sql
            }));
        }

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                "SELECT COUNT(*) FROM user_currencies WHERE id = $1"
            );
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits + cache.stats().misses, 16);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&QueryCache::global(), &QueryCache::global()));
    }

    #[test]
    fn test_arity_check() {
        let stmt = PreparedStatement {
            key: "VALIDATE_ACCESS_TOKEN",
            sql: "SELECT COUNT(*) FROM users WHERE id = $1 AND access_token = $2",
            param_count: 2,
        };
        assert!(stmt.check_arity(2).is_ok());
        assert!(matches!(
            stmt.check_arity(1),
            Err(DbError::ShapeMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }
}
