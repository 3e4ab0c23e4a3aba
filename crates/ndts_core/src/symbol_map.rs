//! Name ⟷ dense `i64` id bijection. Callers address rows by symbol name;
//! the storage layer partitions and indexes by id. Persisted as a flat,
//! append-only, newline-delimited file: line `k` (0-indexed) is the name
//! assigned id `k`. Ids are never reused or renumbered.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{NdtsError, Result};

#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    names: Vec<String>,
    ids: HashMap<String, i64>,
}

impl SymbolMap {
    pub fn new() -> Self {
        SymbolMap::default()
    }

    /// Returns the existing id for `name`, or assigns and returns the next
    /// available id (`names.len()` before the call).
    pub fn get_or_insert(&mut self, name: &str) -> i64 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as i64;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn get_id(&self, name: &str) -> Option<i64> {
        self.ids.get(name).copied()
    }

    pub fn get_name(&self, id: i64) -> Option<&str> {
        if id < 0 {
            return None;
        }
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(SymbolMap::new());
        }
        let text = fs::read_to_string(path).map_err(|e| NdtsError::io(path, e))?;
        let mut map = SymbolMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            map.get_or_insert(line);
        }
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = String::with_capacity(self.names.iter().map(|n| n.len() + 1).sum());
        for name in &self.names {
            text.push_str(name);
            text.push('\n');
        }
        fs::write(path, text).map_err(|e| NdtsError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut m = SymbolMap::new();
        assert_eq!(m.get_or_insert("BTCUSDT"), 0);
        assert_eq!(m.get_or_insert("ETHUSDT"), 1);
        assert_eq!(m.get_or_insert("BTCUSDT"), 0);
        assert_eq!(m.get_name(0), Some("BTCUSDT"));
        assert_eq!(m.get_name(1), Some("ETHUSDT"));
        assert_eq!(m.get_id("ETHUSDT"), Some(1));
        assert_eq!(m.get_id("XRPUSDT"), None);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.map");
        let mut m = SymbolMap::new();
        m.get_or_insert("BTCUSDT");
        m.get_or_insert("ETHUSDT");
        m.save(&path).unwrap();

        let loaded = SymbolMap::load(&path).unwrap();
        assert_eq!(loaded.get_id("BTCUSDT"), Some(0));
        assert_eq!(loaded.get_id("ETHUSDT"), Some(1));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.map");
        let m = SymbolMap::load(&path).unwrap();
        assert!(m.is_empty());
    }
}
