//! # User Record Store
//!
//! Abstraction over the persistent store that holds synchronized user
//! records. The handler only ever issues the three keyed mutations defined
//! by [`UserStore`]; connection lifecycle and consistency of concurrent
//! writes are the adapter's concern.

use crate::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// Local user record, keyed by the provider-assigned id.
///
/// `email` and `image` carry explicit absent-markers; `name` is always
/// present but may be empty when the provider supplied neither name part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: Option<String>,
    pub name: String,
    pub image: Option<String>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by store mutations and connection handling.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same id already exists (create only).
    #[error("record already exists: {id}")]
    Conflict { id: UserId },

    /// The mutation was issued but the store rejected or failed it.
    #[error("store operation failed: {message}")]
    Operation { message: String },

    /// The store could not be reached at all.
    #[error("store not available: {message}")]
    Unavailable { message: String },
}

// ============================================================================
// Core Operations (Trait)
// ============================================================================

/// Interface for the persistent user record store.
///
/// Implementations must support concurrent use from many simultaneous
/// request handlers; no locking is performed above this seam and
/// last-write-wins semantics for a given id are acceptable.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::Conflict`] when a
    /// record with the same id already exists.
    async fn create(&self, record: UserRecord) -> Result<(), StoreError>;

    /// Overwrite all fields of the record with the given id. Updating an
    /// id that does not exist is not an error.
    async fn update_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), StoreError>;

    /// Remove the record with the given id. Deleting an id that does not
    /// exist is not an error.
    async fn delete_by_id(&self, id: &UserId) -> Result<(), StoreError>;

    /// Cheap connectivity probe used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;
}
