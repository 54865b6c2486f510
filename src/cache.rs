//! Parsed-query cache keyed by raw query text.
//!
//! Structured queries carry no resolved values, so a cached parse is valid for
//! every user and every point in time.

use crate::ast::StructuredQuery;
use crate::lexer::tokenize;
use crate::parser::Parser;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, Arc<StructuredQuery>>>,
    capacity: usize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Return the cached parse of `raw`, parsing on a miss.
    /// Once the cache holds `capacity` entries new parses are not stored.
    pub fn get_or_parse(&self, raw: &str) -> Arc<StructuredQuery> {
        if let Some(query) = self.entries.read().get(raw) {
            trace!(raw, "query cache hit");
            return Arc::clone(query);
        }

        let tokens = tokenize(raw);
        let query = Arc::new(Parser::new(&tokens).parse());

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(raw) {
            return Arc::clone(existing);
        }
        if entries.len() < self.capacity {
            entries.insert(raw.to_string(), Arc::clone(&query));
        }
        query
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_hit_returns_same_parse() {
        let cache = QueryCache::default();
        let first = cache.get_or_parse("assignee = currentUser()");
        let second = cache.get_or_parse("assignee = currentUser()");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let cache = QueryCache::new(2);
        cache.get_or_parse("status = Open");
        cache.get_or_parse("status = Done");
        let closed = cache.get_or_parse("status = Closed");
        assert_eq!(cache.len(), 2);
        assert_eq!(closed.clauses.len(), 1);

        let disabled = QueryCache::new(0);
        disabled.get_or_parse("status = Open");
        assert!(disabled.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(QueryCache::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let query = cache.get_or_parse(&format!("storyPoints > {}", i % 2));
                    query.clauses.len()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
