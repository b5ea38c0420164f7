//! Typed view of the payment processor's webhook events.
//!
//! Only the fields the ticket lifecycle needs are modelled; everything else in
//! the payload is ignored. Event types other than the three handled here parse
//! to [`PaymentEvent::Ignored`].

use serde::{Deserialize, Serialize};

use crate::utils::AppError;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const REFUND_UPDATED: &str = "refund.updated";

/// A reference the processor may send either as a bare id or as the expanded
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub price: Option<Expandable>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LineItem {
    pub fn price_id(&self) -> Option<&str> {
        self.price.as_ref().map(Expandable::id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemList {
    #[serde(default)]
    pub data: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Present only when the session was delivered with line items expanded.
    #[serde(default)]
    pub line_items: Option<LineItemList>,
}

impl CheckoutSession {
    /// One-time payment that has been paid; subscriptions and unpaid
    /// sessions never issue tickets.
    pub fn is_paid_one_time(&self) -> bool {
        self.mode.as_deref() == Some("payment") && self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub charge: Option<Expandable>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    CheckoutCompleted(CheckoutSession),
    ChargeRefunded(Charge),
    RefundUpdated(Refund),
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub payload: PaymentEvent,
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Malformed event payload: {e}")))?;

        let object = envelope.data.object;
        let payload = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => PaymentEvent::CheckoutCompleted(decode(object)?),
            CHARGE_REFUNDED => PaymentEvent::ChargeRefunded(decode(object)?),
            REFUND_UPDATED => PaymentEvent::RefundUpdated(decode(object)?),
            _ => PaymentEvent::Ignored,
        };

        Ok(WebhookEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            payload,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(object)
        .map_err(|e| AppError::ValidationError(format!("Malformed event object: {e}")))
}
