//! Single-entry memoization keyed by identity
//!
//! Derived views are recomputed only when their key changes. Keys are cheap
//! identity values (version counters, pointers), never deep content.

use std::sync::Arc;

#[derive(Debug)]
pub struct Memo<K, V> {
    entry: Option<(K, Arc<V>)>,
    computations: u64,
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            entry: None,
            computations: 0,
        }
    }

    /// Return the cached value for `key`, running `compute` only on a miss.
    pub fn get_or_compute<F>(&mut self, key: K, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some((cached_key, value)) = &self.entry {
            if *cached_key == key {
                return Arc::clone(value);
            }
        }

        let value = Arc::new(compute());
        self.computations += 1;
        self.entry = Some((key, Arc::clone(&value)));
        value
    }

    /// How many times the value has actually been computed
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

impl<K: PartialEq, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
