// Barchart CLI - JSON-lines host for barchart
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Key-value store persisted to a JSON file.
//!
//! Entries live in memory and are written back by [`JsonFileStore::flush`],
//! which writes a sibling temp file and renames it over the target, so a
//! crash mid-write leaves the previous state readable.

use std::fs;
use std::path::PathBuf;

use barchart::{KeyValueStore, MemoryStore};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CliError, Result};

/// File-backed key-value store
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: MemoryStore,
    dirty: bool,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => MemoryStore::from_entries(map.into_iter().collect()),
                _ => {
                    return Err(CliError::InvalidState {
                        path: path.display().to_string(),
                    })
                }
            }
        } else {
            MemoryStore::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "state loaded");
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    /// Whether there are writes not yet flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist pending writes; a no-op when nothing changed
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let text = serde_json::to_string(&Value::Object(map))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        debug!(path = %self.path.display(), "state flushed");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.set(key, value);
        self.dirty = true;
    }
}
