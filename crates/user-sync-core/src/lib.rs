//! # User-Sync Core
//!
//! Core business logic for the user-sync webhook intake service.
//!
//! This crate contains the domain logic for receiving identity-provider
//! webhooks, verifying their signatures, normalizing user payloads into
//! local records, and applying the matching store mutation.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations are injected at runtime
//! - The signature verifier and the user store are abstracted behind traits
//!
//! ## Usage
//!
//! ```rust
//! use user_sync_core::UserId;
//!
//! // The provider-assigned id is the primary key everywhere.
//! let user_id = UserId::new("user_2x9f");
//! assert_eq!(user_id.as_str(), "user_2x9f");
//! ```

pub mod adapters;
pub mod store;
pub mod webhook;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Provider-assigned user identifier.
///
/// The identity provider owns this value and it is shared across systems;
/// the local store keys user records by it and never generates its own
/// identity for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a provider-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Structural validation failures for inbound event payloads.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {field}")]
    Required { field: String },

    #[error("invalid field format: {field} - {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
