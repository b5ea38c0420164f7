use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a ticket.
///
/// `Validated`, `Cancelled` and `Expired` are terminal. `Transferred` is never
/// written by this server; rows that already carry it are treated as a
/// non-terminal state that can still be admitted at the door but cannot be
/// transferred again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Transferred,
    Validated,
    Expired,
    Cancelled,
}

/// A requested lifecycle transition. Every mutation of a ticket's status or
/// owner goes through exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Transfer,
    Validate,
    Cancel,
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {transition:?} a ticket that is {from}")]
pub struct IllegalTransition {
    pub from: TicketStatus,
    pub transition: Transition,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Active,
        TicketStatus::Transferred,
        TicketStatus::Validated,
        TicketStatus::Expired,
        TicketStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Transferred => "transferred",
            TicketStatus::Validated => "validated",
            TicketStatus::Expired => "expired",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Validated | TicketStatus::Expired | TicketStatus::Cancelled
        )
    }

    /// Statuses from which `transition` is legal. The SQL store uses this
    /// list verbatim in its `WHERE status = ANY(...)` guards.
    pub fn sources(transition: Transition) -> &'static [TicketStatus] {
        match transition {
            Transition::Transfer => &[TicketStatus::Active],
            Transition::Validate | Transition::Cancel | Transition::Expire => {
                &[TicketStatus::Active, TicketStatus::Transferred]
            }
        }
    }

    /// Applies `transition`, returning the resulting status.
    pub fn apply(self, transition: Transition) -> Result<TicketStatus, IllegalTransition> {
        if !Self::sources(transition).contains(&self) {
            return Err(IllegalTransition {
                from: self,
                transition,
            });
        }

        Ok(match transition {
            // ownership changes, status does not
            Transition::Transfer => TicketStatus::Active,
            Transition::Validate => TicketStatus::Validated,
            Transition::Cancel => TicketStatus::Cancelled,
            Transition::Expire => TicketStatus::Expired,
        })
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TicketStatus::Active),
            "transferred" => Ok(TicketStatus::Transferred),
            "validated" => Ok(TicketStatus::Validated),
            "expired" => Ok(TicketStatus::Expired),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub order_id: i64,
    pub ticket_type: String,
    pub ticket_number: i32,
    pub qr_code_data: Uuid,
    pub owner_id: Uuid,
    pub original_purchaser_id: Uuid,
    pub status: TicketStatus,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<Uuid>,
    pub background_color: String,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `tickets` row; status is stored as text and parsed on the way out.
#[derive(Debug, FromRow)]
pub(crate) struct TicketRow {
    pub id: i64,
    pub order_id: i64,
    pub ticket_type: String,
    pub ticket_number: i32,
    pub qr_code_data: Uuid,
    pub owner_id: Uuid,
    pub original_purchaser_id: Uuid,
    pub status: String,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<Uuid>,
    pub background_color: String,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = UnknownStatus;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            order_id: row.order_id,
            ticket_type: row.ticket_type,
            ticket_number: row.ticket_number,
            qr_code_data: row.qr_code_data,
            owner_id: row.owner_id,
            original_purchaser_id: row.original_purchaser_id,
            status: row.status.parse()?,
            validated_at: row.validated_at,
            validated_by: row.validated_by,
            background_color: row.background_color,
            event_name: row.event_name,
            event_date: row.event_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A ticket about to be minted. Ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub ticket_type: String,
    pub ticket_number: i32,
    pub qr_code_data: Uuid,
    pub background_color: String,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
}

/// Counts per status, as shown on the staff dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: i64,
    pub active: i64,
    pub transferred: i64,
    pub validated: i64,
    pub cancelled: i64,
    pub expired: i64,
}

impl TicketStats {
    pub fn record(&mut self, status: TicketStatus, count: i64) {
        self.total += count;
        match status {
            TicketStatus::Active => self.active += count,
            TicketStatus::Transferred => self.transferred += count,
            TicketStatus::Validated => self.validated += count,
            TicketStatus::Cancelled => self.cancelled += count,
            TicketStatus::Expired => self.expired += count,
        }
    }
}
