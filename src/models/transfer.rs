use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only audit row written once per completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TicketTransfer {
    pub id: i64,
    pub ticket_id: i64,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub transfer_status: String,
    pub transferred_at: DateTime<Utc>,
}

pub const TRANSFER_COMPLETED: &str = "completed";
