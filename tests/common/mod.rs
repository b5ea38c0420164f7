#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::{json, Value};
use uuid::Uuid;

use fbcon_server::middleware::AuthKeys;
use fbcon_server::models::UserRole;
use fbcon_server::payments::{
    CheckoutSession, Expandable, LineItem, LineItemList, PaymentGateway, WebhookVerifier,
};
use fbcon_server::routes::create_routes;
use fbcon_server::services::{BundleRule, IssuancePolicy, PushMessage, PushRelay};
use fbcon_server::state::AppState;
use fbcon_server::store::InMemoryStore;
use fbcon_server::utils::AppError;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const VENDOR_PRICE: &str = "price_vendor";

#[derive(Default)]
pub struct StubGateway {
    pub line_items: Mutex<HashMap<String, Vec<LineItem>>>,
    pub charges: Mutex<HashMap<String, String>>,
    pub failing: Mutex<bool>,
}

impl StubGateway {
    pub fn set_line_items(&self, session_id: &str, items: Vec<LineItem>) {
        self.line_items
            .lock()
            .unwrap()
            .insert(session_id.to_string(), items);
    }

    pub fn set_charge(&self, charge_id: &str, payment_intent_id: &str) {
        self.charges
            .lock()
            .unwrap()
            .insert(charge_id.to_string(), payment_intent_id.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn list_line_items(&self, checkout_session_id: &str) -> Result<Vec<LineItem>, AppError> {
        if *self.failing.lock().unwrap() {
            return Err(AppError::ExternalServiceError("processor timeout".into()));
        }
        Ok(self
            .line_items
            .lock()
            .unwrap()
            .get(checkout_session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn charge_payment_intent(&self, charge_id: &str) -> Result<Option<String>, AppError> {
        if *self.failing.lock().unwrap() {
            return Err(AppError::ExternalServiceError("processor timeout".into()));
        }
        Ok(self.charges.lock().unwrap().get(charge_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingRelay {
    pub batches: Mutex<Vec<Vec<PushMessage>>>,
    pub fail_every_batch: Mutex<bool>,
}

#[async_trait]
impl PushRelay for RecordingRelay {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<(), AppError> {
        if *self.fail_every_batch.lock().unwrap() {
            return Err(AppError::ExternalServiceError("relay down".into()));
        }
        self.batches.lock().unwrap().push(messages.to_vec());
        Ok(())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
}

pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<StubGateway>,
    pub relay: Arc<RecordingRelay>,
    pub policy: IssuancePolicy,
    pub verifier: WebhookVerifier,
    pub keys: Arc<AuthKeys>,
}

impl Harness {
    pub fn new() -> Self {
        let mut policy = IssuancePolicy::new(vec![BundleRule {
            price_id: VENDOR_PRICE.to_string(),
            tickets: 2,
            ticket_type: "Vendor Package - Admission".to_string(),
        }]);
        policy.event_name = Some("Fingerboard Con".to_string());

        Self {
            store: InMemoryStore::new(),
            gateway: Arc::new(StubGateway::default()),
            relay: Arc::new(RecordingRelay::default()),
            policy,
            verifier: WebhookVerifier::new(SecretString::from(WEBHOOK_SECRET), 300),
            keys: Arc::new(AuthKeys::new(&SecretString::from(JWT_SECRET))),
        }
    }

    pub fn user(&self, email: &str, role: UserRole) -> TestUser {
        let id = Uuid::new_v4();
        self.store.add_user(id, email, role);
        TestUser {
            id,
            email: email.to_string(),
        }
    }

    /// A registered user who pays through `customer_id`.
    pub fn customer(&self, email: &str, customer_id: &str) -> TestUser {
        let user = self.user(email, UserRole::User);
        self.store.link_customer(customer_id, user.id);
        user
    }

    pub fn state(&self) -> AppState {
        let store = Arc::new(self.store.clone());
        AppState {
            store: store.clone(),
            directory: store,
            gateway: self.gateway.clone(),
            push_relay: self.relay.clone(),
            webhook_verifier: Arc::new(self.verifier.clone()),
            auth_keys: self.keys.clone(),
            issuance: Arc::new(self.policy.clone()),
        }
    }

    pub fn router(&self) -> Router {
        create_routes(self.state(), None)
    }

    pub fn token(&self, user: &TestUser) -> String {
        self.keys
            .issue(user.id, Some(user.email.as_str()), Duration::hours(1))
            .unwrap()
    }

    pub fn signed_webhook(&self, event: &Value) -> Request<Body> {
        let payload = serde_json::to_vec(event).unwrap();
        let signature = self.verifier.sign(&payload, Utc::now().timestamp());
        Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header(header::CONTENT_TYPE, "application/json")
            .header("Stripe-Signature", signature)
            .body(Body::from(payload))
            .unwrap()
    }
}

pub fn line_item(price_id: &str, quantity: u32, description: &str) -> LineItem {
    LineItem {
        price: Some(Expandable::Id(price_id.to_string())),
        quantity: Some(quantity),
        description: Some(description.to_string()),
    }
}

/// A paid one-time checkout session with its line items embedded.
pub fn paid_session(session_id: &str, customer_id: &str, items: Vec<LineItem>) -> CheckoutSession {
    CheckoutSession {
        id: session_id.to_string(),
        mode: Some("payment".to_string()),
        payment_status: Some("paid".to_string()),
        customer: Some(Expandable::Id(customer_id.to_string())),
        payment_intent: Some(Expandable::Id(format!("pi_{session_id}"))),
        amount_subtotal: Some(5000),
        amount_total: Some(5000),
        currency: Some("usd".to_string()),
        line_items: Some(LineItemList { data: items }),
    }
}

pub fn checkout_event(session: &CheckoutSession) -> Value {
    json!({
        "id": format!("evt_{}", session.id),
        "type": "checkout.session.completed",
        "data": { "object": session }
    })
}

pub fn charge_refunded_event(charge_id: &str, payment_intent_id: &str) -> Value {
    json!({
        "id": format!("evt_{charge_id}"),
        "type": "charge.refunded",
        "data": { "object": { "id": charge_id, "payment_intent": payment_intent_id } }
    })
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
