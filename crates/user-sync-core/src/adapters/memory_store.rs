//! # In-Memory User Store
//!
//! Thread-safe in-memory implementation of [`UserStore`] for testing and
//! secretless development runs. Records live in a `HashMap` behind an
//! `RwLock`; nothing survives a restart.

use crate::store::{StoreError, UserRecord, UserStore};
use crate::UserId;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// In-memory [`UserStore`] keyed by provider id.
///
/// Clones share the same underlying map, which makes this adapter handy as
/// a test double: hold one clone in the test and hand the other to the
/// processor.
#[derive(Clone)]
pub struct InMemoryUserStore {
    records: Arc<RwLock<HashMap<UserId, UserRecord>>>,
}

impl InMemoryUserStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch a record by id, if present.
    pub fn get(&self, id: &UserId) -> Option<UserRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict {
                id: record.id.clone(),
            });
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), StoreError> {
        // Full overwrite; a missing id is silently a no-op by contract.
        let mut records = self.records.write().unwrap();
        if records.contains_key(id) {
            records.insert(id.clone(), record);
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: &UserId) -> Result<(), StoreError> {
        self.records.write().unwrap().remove(id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
