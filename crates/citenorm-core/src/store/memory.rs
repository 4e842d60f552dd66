use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{StandardizedCitation, StatusStore, StoreError};
use crate::status::StatusCode;

/// In-memory store for dry runs and tests. Counts `upsert_batch` calls.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, StandardizedCitation>>,
    batches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already reports `status` for each id.
    pub fn with_statuses<'a>(entries: impl IntoIterator<Item = (&'a str, StatusCode)>) -> Self {
        let store = Self::new();
        {
            let mut records = store.records.lock().unwrap_or_else(|e| e.into_inner());
            for (id, status) in entries {
                let mut rec = StandardizedCitation::not_normalized(id, "", "");
                rec.status = status;
                records.insert(id.to_string(), rec);
            }
        }
        store
    }

    /// Number of non-empty batches written so far.
    pub fn batches_written(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn get(&self, citation_id: &str) -> Option<StandardizedCitation> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(citation_id).cloned()
    }
}

impl StatusStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_status(&self, citation_id: &str) -> Result<Option<StatusCode>, StoreError> {
        Ok(self.get(citation_id).map(|r| r.status))
    }

    fn upsert_batch(&self, records: &[StandardizedCitation]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            stored.insert(record.citation_id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.len())
    }
}
