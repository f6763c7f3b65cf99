//! Common test utilities for user-sync-api integration tests
//!
//! This module provides:
//! - Store doubles (recording, failing) for asserting mutation behavior
//! - Request builders that sign bodies with the real provider scheme
//! - App state and router factories wired like production

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use user_sync_api::{create_router, AppState, DefaultHealthChecker, ServiceConfig};
use user_sync_core::{
    store::{StoreError, UserRecord, UserStore},
    webhook::{SharedSecretVerifier, WebhookProcessorImpl},
    UserId,
};

/// Raw key "test-secret-key", formatted as the provider distributes it.
pub const TEST_SECRET: &str = "whsec_dGVzdC1zZWNyZXQta2V5";

/// Endpoint path used by the default test configuration.
pub const WEBHOOK_PATH: &str = "/webhooks/clerk";

// ============================================================================
// Store Doubles
// ============================================================================

/// One observed store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum StoreCall {
    Create(UserRecord),
    Update(UserId, UserRecord),
    Delete(UserId),
}

/// Store double that records every mutation and always succeeds.
#[derive(Clone)]
pub struct RecordingUserStore {
    calls: Arc<Mutex<Vec<StoreCall>>>,
}

#[allow(dead_code)]
impl RecordingUserStore {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl UserStore for RecordingUserStore {
    async fn create(&self, record: UserRecord) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall::Create(record));
        Ok(())
    }

    async fn update_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Update(id.clone(), record));
        Ok(())
    }

    async fn delete_by_id(&self, id: &UserId) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall::Delete(id.clone()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store double whose every operation (including ping) fails.
pub struct FailingUserStore;

#[async_trait::async_trait]
impl UserStore for FailingUserStore {
    async fn create(&self, _record: UserRecord) -> Result<(), StoreError> {
        Err(StoreError::Operation {
            message: "simulated store failure".to_string(),
        })
    }

    async fn update_by_id(&self, _id: &UserId, _record: UserRecord) -> Result<(), StoreError> {
        Err(StoreError::Operation {
            message: "simulated store failure".to_string(),
        })
    }

    async fn delete_by_id(&self, _id: &UserId) -> Result<(), StoreError> {
        Err(StoreError::Operation {
            message: "simulated store failure".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            message: "simulated outage".to_string(),
        })
    }
}

// ============================================================================
// App Factories
// ============================================================================

/// Production-shaped configuration with the test signing secret.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.signing_secret = TEST_SECRET.to_string();
    config
}

/// Build a router wired exactly like the service binary, over the given
/// store.
pub fn test_router(store: Arc<dyn UserStore>) -> Router {
    let config = test_config();
    let verifier = Arc::new(
        SharedSecretVerifier::with_tolerance(
            &config.webhook.signing_secret,
            config.webhook.tolerance_seconds,
        )
        .expect("test secret is valid"),
    );
    let processor = Arc::new(WebhookProcessorImpl::new(verifier, store.clone()));
    let health_checker = Arc::new(DefaultHealthChecker::new(store));

    create_router(AppState::new(config, processor, health_checker))
}

// ============================================================================
// Request Builders
// ============================================================================

/// Sign `id.timestamp.body` with the test secret, provider-style.
pub fn sign(secret: &str, message_id: &str, timestamp: &str, body: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let trimmed = secret.trim();
    let encoded = trimmed.strip_prefix("whsec_").unwrap_or(trimmed);
    let key = BASE64.decode(encoded).expect("test secret is valid base64");

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&key).unwrap();
    mac.update(message_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());

    format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()))
}

/// Build a correctly signed webhook POST for the given body.
pub fn signed_request(body: &str) -> Request<Body> {
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign(TEST_SECRET, "msg_1", &timestamp, body);

    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(CONTENT_TYPE, "application/json")
        .header("svix-id", "msg_1")
        .header("svix-timestamp", timestamp)
        .header("svix-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a webhook POST with a signature computed over a different body.
#[allow(dead_code)]
pub fn tampered_request(signed_body: &str, sent_body: &str) -> Request<Body> {
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign(TEST_SECRET, "msg_1", &timestamp, signed_body);

    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(CONTENT_TYPE, "application/json")
        .header("svix-id", "msg_1")
        .header("svix-timestamp", timestamp)
        .header("svix-signature", signature)
        .body(Body::from(sent_body.to_string()))
        .unwrap()
}

/// Build a webhook POST with no signature headers at all.
#[allow(dead_code)]
pub fn unsigned_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Collect a response body into a string.
pub async fn body_string(response: axum::response::Response) -> String {
    use http_body_util::BodyExt;

    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body collects")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("response body is utf-8")
}
