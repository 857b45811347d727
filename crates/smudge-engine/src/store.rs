//! Key/value persistence port.
//!
//! The engine never touches ambient storage; persisted attempt fields are
//! read and written through [`KeyValueStore`]. [`MemoryStore`] doubles as the
//! test stub and as a write-back snapshot for remote backends: load entries,
//! run the engine, then drain [`MemoryStore::take_changes`] to the backend.

use std::collections::{BTreeMap, HashMap};

/// String-valued key/value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

/// A pending write recorded by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StoreChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Remove { key } => key,
        }
    }
}

/// In-memory store that also tracks writes since the last drain
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    /// Latest write per key; `None` means removed
    pending: BTreeMap<String, Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already persisted entries (no pending changes)
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            pending: BTreeMap::new(),
        }
    }

    /// Replace the visible entries with a fresh backend read.
    ///
    /// Undrained changes are dropped: the fresh read is authoritative.
    pub fn reload<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        *self = Self::from_entries(entries);
    }

    /// Fresh backend read with undrained writes laid over it.
    ///
    /// Used when earlier writes were put back with [`MemoryStore::requeue`]
    /// and have not reached the backend yet.
    pub fn reload_keeping_pending<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pending = std::mem::take(&mut self.pending);
        *self = Self::from_entries(entries);
        for (key, value) in &pending {
            match value {
                Some(value) => self.entries.insert(key.clone(), value.clone()),
                None => self.entries.remove(key),
            };
        }
        self.pending = pending;
    }

    /// Drain writes made since construction or the last drain, ordered by key
    pub fn take_changes(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => StoreChange::Set { key, value },
                None => StoreChange::Remove { key },
            })
            .collect()
    }

    /// Put drained changes back after a failed backend write. A key written
    /// again since the drain keeps its newer value.
    pub fn requeue(&mut self, changes: Vec<StoreChange>) {
        for change in changes {
            let (key, value) = match change {
                StoreChange::Set { key, value } => (key, Some(value)),
                StoreChange::Remove { key } => (key, None),
            };
            self.pending.entry(key).or_insert(value);
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value.clone());
        self.pending.insert(key.to_string(), Some(value));
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.pending.insert(key.to_string(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut store = MemoryStore::new();
        assert!(store.get("botAttempts").is_none());

        store.set("botAttempts", "2".to_string());
        assert_eq!(store.get("botAttempts").as_deref(), Some("2"));

        store.remove("botAttempts");
        assert!(store.get("botAttempts").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_take_changes_keeps_last_write_per_key() {
        let mut store = MemoryStore::from_entries([("timeoutEnd", "100")]);
        assert!(!store.has_changes());

        store.set("botAttempts", "1".to_string());
        store.set("botAttempts", "2".to_string());
        store.remove("timeoutEnd");

        let changes = store.take_changes();
        assert_eq!(
            changes,
            vec![
                StoreChange::Set { key: "botAttempts".into(), value: "2".into() },
                StoreChange::Remove { key: "timeoutEnd".into() },
            ]
        );
        assert!(store.take_changes().is_empty());
    }

    #[test]
    fn test_requeued_changes_survive_refresh() {
        let mut store = MemoryStore::new();
        store.set("botAttempts", "5".to_string());
        store.set("timeoutEnd", "300100".to_string());
        store.remove("lastSuccess");

        // backend write failed: put everything back
        let changes = store.take_changes();
        store.requeue(changes);
        assert!(store.has_changes());

        // a later write to the same key wins over the requeued one
        let changes = store.take_changes();
        store.set("botAttempts", "6".to_string());
        store.requeue(changes);

        // the backend still holds the old values
        store.reload_keeping_pending([("botAttempts", "4"), ("lastSuccess", "90")]);
        assert_eq!(store.get("botAttempts").as_deref(), Some("6"));
        assert_eq!(store.get("timeoutEnd").as_deref(), Some("300100"));
        assert!(store.get("lastSuccess").is_none());

        assert_eq!(
            store.take_changes(),
            vec![
                StoreChange::Set { key: "botAttempts".into(), value: "6".into() },
                StoreChange::Remove { key: "lastSuccess".into() },
                StoreChange::Set { key: "timeoutEnd".into(), value: "300100".into() },
            ]
        );
    }

    #[test]
    fn test_reload_discards_pending() {
        let mut store = MemoryStore::new();
        store.set("botAttempts", "1".to_string());
        store.reload([("botAttempts", "3")]);

        assert_eq!(store.get("botAttempts").as_deref(), Some("3"));
        assert!(!store.has_changes());
    }
}
