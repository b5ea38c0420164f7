//! Device push tokens and admin broadcasts through the push relay.
//!
//! Delivery is best effort: a batch the relay refuses is logged and counted,
//! and the remaining batches are still sent.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::PushToken;
use crate::store::TicketStore;
use crate::utils::AppError;

/// Largest batch the relay accepts in one request.
pub const PUSH_BATCH_SIZE: usize = 100;

const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[async_trait]
pub trait PushRelay: Send + Sync {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct ExpoPushRelay {
    http: reqwest::Client,
    url: String,
}

impl ExpoPushRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PushRelay for ExpoPushRelay {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<(), AppError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(messages)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Push relay unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Push relay returned {status}"
            )));
        }

        debug!(count = messages.len(), "Push batch accepted");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Broadcast {
    pub title: String,
    pub body: String,
    pub data: Option<Value>,
    pub user_ids: Option<Vec<Uuid>>,
    pub send_to_all: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

pub async fn register_push_token(
    store: &dyn TicketStore,
    user_id: Uuid,
    expo_push_token: &str,
    device_id: Option<&str>,
) -> Result<(), AppError> {
    let expo_push_token = expo_push_token.trim();
    if expo_push_token.is_empty() {
        return Err(AppError::ValidationError(
            "Push token is required".to_string(),
        ));
    }

    store
        .save_push_token(PushToken {
            user_id,
            expo_push_token: expo_push_token.to_string(),
            device_id: device_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .unwrap_or(UNKNOWN_DEVICE)
                .to_string(),
        })
        .await
}

/// Sends `broadcast` to every registered device of the targeted users, or of
/// everyone when `send_to_all` is set or no users are named.
pub async fn broadcast(
    store: &dyn TicketStore,
    relay: &dyn PushRelay,
    broadcast: Broadcast,
) -> Result<BroadcastReport, AppError> {
    if broadcast.title.trim().is_empty() || broadcast.body.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Title and body are required".to_string(),
        ));
    }

    let targets = match &broadcast.user_ids {
        Some(ids) if !broadcast.send_to_all && !ids.is_empty() => Some(ids.as_slice()),
        _ => None,
    };
    let tokens = store.push_tokens(targets).await?;
    if tokens.is_empty() {
        info!("No push tokens found for broadcast");
        return Ok(BroadcastReport::default());
    }

    let data = broadcast
        .data
        .unwrap_or_else(|| Value::Object(Default::default()));
    let messages: Vec<PushMessage> = tokens
        .into_iter()
        .map(|to| PushMessage {
            to,
            sound: "default",
            title: broadcast.title.clone(),
            body: broadcast.body.clone(),
            data: data.clone(),
        })
        .collect();

    let mut report = BroadcastReport::default();
    for batch in messages.chunks(PUSH_BATCH_SIZE) {
        match relay.send_batch(batch).await {
            Ok(()) => report.sent += batch.len(),
            Err(e) => {
                warn!(error = %e, count = batch.len(), "Push batch failed");
                report.failed += batch.len();
            }
        }
    }

    info!(sent = report.sent, failed = report.failed, "Broadcast finished");
    Ok(report)
}
