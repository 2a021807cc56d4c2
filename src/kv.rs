// Barchart - Rolling bucketed aggregates for dashboards
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Key-value port
//!
//! The aggregation state lives in a host-provided context store that only
//! offers `get` and `set` on string keys. This module defines that seam and
//! an in-memory implementation for tests and embedded use.

use std::collections::HashMap;

use serde_json::Value;

/// Scoped key-value context provided by the host
///
/// Implementations must not expose partially written values. The core
/// never deletes keys; clearing writes an empty value instead.
pub trait KeyValueStore {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: Value);
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &mut T {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        (**self).set(key, value)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        (**self).set(key, value)
    }
}

/// A process-local store backed by a `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with entries
    pub fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Number of keys ever written
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all stored entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }
}
