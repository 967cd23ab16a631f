use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Bounded FIFO of recently delivered jokes, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from persisted entries, keeping only the newest `capacity`.
    pub fn from_entries(entries: Vec<String>, capacity: usize) -> Self {
        let mut ledger = Self {
            entries: VecDeque::from(entries),
            capacity,
        };
        ledger.evict();
        ledger
    }

    pub fn contains(&self, joke: &str) -> bool {
        self.entries.iter().any(|e| e == joke)
    }

    /// Append a delivered joke, evicting the oldest entries past capacity.
    pub fn record(&mut self, joke: impl Into<String>) {
        self.entries.push_back(joke.into());
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

/// JSON-array persistence for the ledger. Never fails towards the caller.
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        Self { path, capacity }
    }

    pub fn load(&self) -> Ledger {
        if !self.path.exists() {
            tracing::debug!("No history at {}, starting empty", self.path.display());
            return Ledger::new(self.capacity);
        }
        match self.read() {
            Ok(entries) => {
                let ledger = Ledger::from_entries(entries, self.capacity);
                tracing::info!("Loaded {} jokes from history", ledger.len());
                ledger
            }
            Err(e) => {
                tracing::error!("Failed to load history, starting empty: {e:#}");
                Ledger::new(self.capacity)
            }
        }
    }

    pub fn save(&self, ledger: &Ledger) {
        if let Err(e) = self.write(ledger) {
            tracing::error!("Failed to save history: {e:#}");
        }
    }

    fn read(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write(&self, ledger: &Ledger) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&ledger.entries)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_evicts_oldest_when_full() {
        let mut ledger = Ledger::new(20);
        for i in 0..20 {
            ledger.record(format!("joke {i}"));
        }
        assert_eq!(ledger.len(), 20);

        ledger.record("fresh");
        assert_eq!(ledger.len(), 20);
        assert!(!ledger.contains("joke 0"));
        assert!(ledger.contains("joke 1"));
        assert_eq!(ledger.iter().last(), Some("fresh"));
    }

    #[test]
    fn test_contains_is_exact_match() {
        let mut ledger = Ledger::new(3);
        ledger.record("Why did the chicken cross the road?");
        assert!(ledger.contains("Why did the chicken cross the road?"));
        assert!(!ledger.contains("why did the chicken cross the road?"));
        assert!(!ledger.contains("Why did the chicken"));
    }

    #[test]
    fn test_from_entries_keeps_newest() {
        let entries = (0..5).map(|i| i.to_string()).collect();
        let ledger = Ledger::from_entries(entries, 3);
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested/history.json"), 20);

        let mut ledger = Ledger::new(20);
        for joke in ["b", "a", "c", "a joke with \"quotes\"\nand a newline"] {
            ledger.record(joke);
        }
        store.save(&ledger);

        assert_eq!(store.load(), ledger);
        assert!(!dir.path().join("nested/history.json.tmp").exists());
    }

    #[test]
    fn test_persisted_form_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = HistoryStore::new(path.clone(), 20);

        let mut ledger = Ledger::new(20);
        ledger.record("X");
        store.save(&ledger);

        let raw: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, vec!["X"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"), 20);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{\"not\": \"an array\"").unwrap();
        let ledger = HistoryStore::new(path, 20).load();
        assert!(ledger.is_empty());
        assert_eq!(ledger.capacity(), 20);
    }

    #[test]
    fn test_load_truncates_oversized_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let entries: Vec<String> = (0..25).map(|i| format!("j{i}")).collect();
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let ledger = HistoryStore::new(path, 20).load();
        assert_eq!(ledger.len(), 20);
        assert!(!ledger.contains("j4"));
        assert!(ledger.contains("j5"));
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the file makes the rename fail.
        let path = dir.path().join("history.json");
        std::fs::create_dir_all(&path).unwrap();
        let store = HistoryStore::new(path, 20);
        let mut ledger = Ledger::new(20);
        ledger.record("X");
        store.save(&ledger);
    }
}
