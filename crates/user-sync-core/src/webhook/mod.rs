//! # Webhook Processing Module
//!
//! Handles identity-provider webhook verification, payload validation,
//! normalization, and dispatch to the user record store.
//!
//! The pipeline is linear per request: verify the signature over the raw
//! body, guard the payload structure, classify the event, apply exactly one
//! store mutation (or none for unrecognized event types). Every failure is
//! terminal for the request; nothing is retried here.

use crate::{
    store::{StoreError, UserRecord, UserStore},
    UserId, ValidationError,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Core Types
// ============================================================================

/// Raw HTTP request data for a provider webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: WebhookHeaders,
    pub body: Bytes,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self { headers, body }
    }
}

/// The three signature-metadata headers the provider attaches to every
/// delivery.
#[derive(Debug, Clone)]
pub struct WebhookHeaders {
    pub message_id: String, // svix-id
    pub timestamp: String,  // svix-timestamp
    pub signature: String,  // svix-signature
}

impl WebhookHeaders {
    /// Parse the required headers from an HTTP header map.
    ///
    /// Any missing or empty header is a verification failure: without all
    /// three values the signature cannot be checked, so the request must be
    /// rejected before anything else happens.
    pub fn from_http_headers(
        headers: &HashMap<String, String>,
    ) -> Result<Self, VerificationError> {
        let parsed = Self {
            message_id: required_header(headers, "svix-id")?,
            timestamp: required_header(headers, "svix-timestamp")?,
            signature: required_header(headers, "svix-signature")?,
        };
        Ok(parsed)
    }
}

fn required_header(
    headers: &HashMap<String, String>,
    name: &str,
) -> Result<String, VerificationError> {
    headers
        .get(name)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| VerificationError::MissingHeader {
            header: name.to_string(),
        })
}

/// Verified, typed event payload: what happened (`type`) and the affected
/// entity (`data`).
///
/// Only a successful signature verification produces one of these; the
/// `data` value stays untyped until the event is classified.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

// ============================================================================
// Event Classification
// ============================================================================

/// Discriminated union over the provider event types this service acts on.
///
/// Anything outside the three `user.*` lifecycle events is carried as
/// [`UserEvent::Ignored`] so it can be acknowledged and logged without a
/// store mutation.
#[derive(Debug, Clone)]
pub enum UserEvent {
    Created(UserData),
    Updated(UserData),
    Deleted { id: UserId },
    Ignored { event_type: String },
}

impl UserEvent {
    /// Classify a verified envelope into a typed event.
    ///
    /// Deserialization failures for a known event type (for example a
    /// missing `id`) are validation errors, not signature errors: the
    /// request was authentic but its payload does not match the documented
    /// shape.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, ValidationError> {
        match envelope.event_type.as_str() {
            "user.created" => Ok(Self::Created(UserData::from_value(&envelope.data)?)),
            "user.updated" => Ok(Self::Updated(UserData::from_value(&envelope.data)?)),
            "user.deleted" => {
                let id = envelope
                    .data
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ValidationError::Required {
                        field: "data.id".to_string(),
                    })?;
                Ok(Self::Deleted {
                    id: UserId::new(id),
                })
            }
            other => Ok(Self::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}

/// Provider user fields relevant to the local record shape.
#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One entry of the provider's ordered email list.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub email_address: Option<String>,
}

impl UserData {
    fn from_value(data: &serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(data.clone()).map_err(|e| ValidationError::InvalidFormat {
            field: "data".to_string(),
            message: e.to_string(),
        })
    }

    /// Normalize the provider fields into the local record shape.
    ///
    /// `email` is the first entry of the ordered email list, `name` is the
    /// trimmed concatenation of the name parts (empty when both are
    /// absent), and missing optionals stay absent rather than becoming
    /// sentinel strings.
    pub fn to_record(&self) -> UserRecord {
        let email = self
            .email_addresses
            .first()
            .and_then(|entry| entry.email_address.clone());

        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();

        UserRecord {
            id: UserId::new(self.id.clone()),
            email,
            name,
            image: self.image_url.clone(),
        }
    }
}

/// Guard the verified payload structure before classification.
///
/// Every verified event, regardless of type, must carry a non-empty
/// `email_addresses` array in `data`; this check runs ahead of the event
/// switch so malformed deliveries are rejected uniformly.
pub fn validate_user_data(data: &serde_json::Value) -> Result<(), ValidationError> {
    match data.get("email_addresses") {
        None => Err(ValidationError::Required {
            field: "data.email_addresses".to_string(),
        }),
        Some(value) if !value.is_array() => Err(ValidationError::InvalidFormat {
            field: "data.email_addresses".to_string(),
            message: "must be an array".to_string(),
        }),
        Some(value) if value.as_array().is_some_and(Vec::is_empty) => {
            Err(ValidationError::InvalidFormat {
                field: "data.email_addresses".to_string(),
                message: "must not be empty".to_string(),
            })
        }
        Some(_) => Ok(()),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for webhook processing failures.
///
/// The three variants are disjoint and each maps to exactly one HTTP
/// outcome at the API layer.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("invalid user data: {0}")]
    InvalidUserData(#[from] ValidationError),

    #[error("store mutation failed: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a delivery fails signature verification.
///
/// All of these collapse to the same external outcome; the variants exist
/// for diagnostics only and are never surfaced in the response body.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("missing required header: {header}")]
    MissingHeader { header: String },

    #[error("timestamp header is not unix seconds")]
    InvalidTimestamp,

    #[error("timestamp outside tolerance (skew {skew_seconds}s)")]
    TimestampOutOfTolerance { skew_seconds: i64 },

    #[error("no signature matched the request body")]
    SignatureMismatch,

    #[error("signing secret is not valid base64: {message}")]
    InvalidSecret { message: String },

    #[error("verified payload is not a valid event envelope: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

// ============================================================================
// Processing Outcome
// ============================================================================

/// What a successfully handled delivery did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A mutation was applied for the given user id.
    Applied {
        mutation: MutationKind,
        user_id: UserId,
    },
    /// Recognized-but-ignored event type; no store call was made.
    Ignored { event_type: String },
}

/// The store mutation applied for a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

impl MutationKind {
    /// Stable lowercase label for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

// ============================================================================
// Core Operations (Traits)
// ============================================================================

/// Main interface for the webhook processing pipeline.
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Process a complete delivery: verify, validate, normalize, dispatch.
    async fn process(&self, request: WebhookRequest) -> Result<SyncOutcome, WebhookError>;
}

/// Interface for provider webhook signature verification.
///
/// A successful verification yields the parsed envelope; the raw body is
/// never interpreted before this step succeeds.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<EventEnvelope, VerificationError>;
}

// ============================================================================
// Default Implementation
// ============================================================================

/// Webhook processor with injected verifier and store.
///
/// Stateless between invocations; the only shared resources are the
/// injected collaborators, both of which must tolerate concurrent use.
pub struct WebhookProcessorImpl {
    verifier: Arc<dyn SignatureVerifier>,
    store: Arc<dyn UserStore>,
}

impl WebhookProcessorImpl {
    /// Create a processor from its two collaborators.
    pub fn new(verifier: Arc<dyn SignatureVerifier>, store: Arc<dyn UserStore>) -> Self {
        Self { verifier, store }
    }
}

#[async_trait]
impl WebhookProcessor for WebhookProcessorImpl {
    async fn process(&self, request: WebhookRequest) -> Result<SyncOutcome, WebhookError> {
        // 1. Verify authenticity of the raw body before reading anything
        //    else out of it.
        let envelope = self
            .verifier
            .verify(&request.body, &request.headers)
            .await?;

        // 2. Structural guard, applied to every verified event.
        validate_user_data(&envelope.data)?;

        // 3. Classify and dispatch.
        let event = UserEvent::from_envelope(&envelope)?;
        let outcome = match event {
            UserEvent::Created(data) => {
                let record = data.to_record();
                let user_id = record.id.clone();
                self.store.create(record).await?;
                SyncOutcome::Applied {
                    mutation: MutationKind::Created,
                    user_id,
                }
            }
            UserEvent::Updated(data) => {
                let record = data.to_record();
                let user_id = record.id.clone();
                self.store.update_by_id(&user_id, record).await?;
                SyncOutcome::Applied {
                    mutation: MutationKind::Updated,
                    user_id,
                }
            }
            UserEvent::Deleted { id } => {
                self.store.delete_by_id(&id).await?;
                SyncOutcome::Applied {
                    mutation: MutationKind::Deleted,
                    user_id: id,
                }
            }
            UserEvent::Ignored { event_type } => {
                warn!(event_type = %event_type, "unhandled event type");
                SyncOutcome::Ignored { event_type }
            }
        };

        if let SyncOutcome::Applied { mutation, user_id } = &outcome {
            info!(
                user_id = %user_id,
                mutation = mutation.as_str(),
                "applied user event"
            );
        }

        Ok(outcome)
    }
}

// Signature verifier
mod verifier;
pub use verifier::{SharedSecretVerifier, DEFAULT_TOLERANCE_SECONDS};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
