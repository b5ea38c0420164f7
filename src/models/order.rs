use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// `completed` on insert; `canceled` once the payment is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: String,
    pub user_id: uuid::Uuid,
    pub amount_subtotal: i64,
    pub amount_total: i64,
    pub currency: String,
    pub payment_status: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    pub id: i64,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: String,
    pub user_id: uuid::Uuid,
    pub amount_subtotal: i64,
    pub amount_total: i64,
    pub currency: String,
    pub payment_status: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            checkout_session_id: row.checkout_session_id,
            payment_intent_id: row.payment_intent_id,
            customer_id: row.customer_id,
            user_id: row.user_id,
            amount_subtotal: row.amount_subtotal,
            amount_total: row.amount_total,
            currency: row.currency,
            payment_status: row.payment_status,
            status: if row.status == OrderStatus::Canceled.as_str() {
                OrderStatus::Canceled
            } else {
                OrderStatus::Completed
            },
            created_at: row.created_at,
        }
    }
}

/// Order totals captured from a paid checkout session. The checkout session id
/// is the idempotency key: a second insert with the same id is refused.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: String,
    pub user_id: uuid::Uuid,
    pub amount_subtotal: i64,
    pub amount_total: i64,
    pub currency: String,
    pub payment_status: String,
}
