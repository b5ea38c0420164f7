use std::sync::Arc;

use crate::middleware::AuthKeys;
use crate::payments::{PaymentGateway, WebhookVerifier};
use crate::services::{IssuancePolicy, PushRelay};
use crate::store::{IdentityDirectory, TicketStore};

/// Handles shared by every request. Cloning is cheap; everything sits
/// behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub push_relay: Arc<dyn PushRelay>,
    pub webhook_verifier: Arc<WebhookVerifier>,
    pub auth_keys: Arc<AuthKeys>,
    pub issuance: Arc<IssuancePolicy>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TicketStore>,
        directory: Arc<dyn IdentityDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        push_relay: Arc<dyn PushRelay>,
        webhook_verifier: WebhookVerifier,
        auth_keys: AuthKeys,
        issuance: IssuancePolicy,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            push_relay,
            webhook_verifier: Arc::new(webhook_verifier),
            auth_keys: Arc::new(auth_keys),
            issuance: Arc::new(issuance),
        }
    }
}
