use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use herald_common::{Record, RecordKey};

use crate::{
    StoreError,
    r#trait::{RecordSource, STATUS_SENT, StatusSink},
};

#[derive(Debug, Default)]
struct State {
    records: Vec<Record>,
    /// Status written per record
    statuses: HashMap<RecordKey, String>,
    /// Every successful `mark_sent` call, in call order
    updates: Vec<(RecordKey, String)>,
    fail_fetch: Option<String>,
    fail_updates: HashSet<RecordKey>,
}

/// In-memory store
///
/// Holds records in insertion order behind an `RwLock`. A record is pending
/// until it has been marked sent. Failures can be injected for either side
/// to exercise error handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .records
            .extend(records);
        store
    }

    /// Make every subsequent `fetch` fail with `reason`.
    pub fn fail_fetch(&self, reason: impl Into<String>) {
        self.write_state().fail_fetch = Some(reason.into());
    }

    /// Make `mark_sent` fail for `key`.
    pub fn fail_update_for(&self, key: RecordKey) {
        self.write_state().fail_updates.insert(key);
    }

    /// Every successful status update, in the order it was applied.
    #[must_use]
    pub fn updates(&self) -> Vec<(RecordKey, String)> {
        self.read_state().updates.clone()
    }

    /// The status currently recorded for `key`, if any.
    #[must_use]
    pub fn status_of(&self, key: &RecordKey) -> Option<String> {
        self.read_state().statuses.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordSource for MemoryStore {
    async fn fetch(&self) -> crate::Result<Vec<Record>> {
        let state = self.state.read()?;

        if let Some(reason) = &state.fail_fetch {
            return Err(StoreError::Internal(reason.clone()));
        }

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for record in &state.records {
            if state.statuses.get(&record.key).is_some_and(|s| s == STATUS_SENT) {
                continue;
            }
            if !seen.insert(record.key.clone()) {
                return Err(StoreError::DuplicateKey(record.key.clone()));
            }
            pending.push(record.clone());
        }

        Ok(pending)
    }
}

#[async_trait]
impl StatusSink for MemoryStore {
    async fn mark_sent(&self, key: &RecordKey, status_tag: &str) -> crate::Result<()> {
        let mut state = self.state.write()?;

        if state.fail_updates.contains(key) {
            return Err(StoreError::Internal(format!(
                "injected status update failure for {key}"
            )));
        }

        if !state
            .records
            .iter()
            .any(|r| &r.key == key && r.status_tag == status_tag)
        {
            return Err(StoreError::NoMatchingRow(key.clone()));
        }

        state.statuses.insert(key.clone(), STATUS_SENT.to_string());
        state.updates.push((key.clone(), status_tag.to_string()));

        Ok(())
    }
}
