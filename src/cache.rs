//! Content-addressed result cache.
//!
//! Maps the BLAKE3 digest of the raw image bytes to the
//! [`ExtractionResult`] produced for them, so resubmitting the same image
//! never runs the model twice. Only successful results are stored; a
//! failed extraction leaves no entry behind.
//!
//! With [`CachePolicy::Unbounded`] entries live for the whole process. With
//! [`CachePolicy::Bounded`] the least recently used entry is evicted once
//! the capacity is reached.

use crate::config::CachePolicy;
use crate::output::ExtractionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// BLAKE3 digest of an image's raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..12])
    }
}

/// Counters for `--verbose` output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// `None` for an unbounded cache.
    pub capacity: Option<usize>,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub struct ExtractionCache {
    entries: HashMap<CacheKey, Arc<ExtractionResult>>,
    /// Recency order for bounded eviction, least recent first.
    order: Vec<CacheKey>,
    capacity: Option<usize>,
    hits: u64,
    misses: u64,
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl ExtractionCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            capacity: policy.capacity().map(|c| c.max(1)),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a result, counting the hit or miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<ExtractionResult>> {
        match self.entries.get(key) {
            Some(result) => {
                let result = Arc::clone(result);
                self.hits += 1;
                self.touch(key);
                Some(result)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching counters or recency.
    pub fn peek(&self, key: &CacheKey) -> Option<&Arc<ExtractionResult>> {
        self.entries.get(key)
    }

    /// Store a result. An existing entry for `key` is replaced.
    pub fn insert(&mut self, key: CacheKey, result: Arc<ExtractionResult>) {
        if self.entries.insert(key, Arc::clone(&result)).is_some() {
            self.touch(&key);
            return;
        }

        if self.capacity.is_some() {
            self.order.push(key);
            self.evict_over_capacity();
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            capacity: self.capacity,
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if self.capacity.is_none() {
            return;
        }
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_over_capacity(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.order.len() > capacity {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}
