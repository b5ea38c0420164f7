//! Durable storage for orders, tickets, the transfer audit log and the
//! identity mirror.
//!
//! Every method that changes a ticket's owner or status is a guarded,
//! single-statement compare-and-swap: it names the [`Transition`] it performs
//! and only touches rows whose current status is one of
//! [`TicketStatus::sources`] for that transition. A caller that loses a race
//! gets `None` back, never a silent overwrite.
//!
//! [`Transition`]: crate::models::Transition
//! [`TicketStatus::sources`]: crate::models::TicketStatus::sources

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    NewOrder, NewTicket, Order, PushToken, Ticket, TicketStats, TicketTransfer, UserRole,
    UserSummary,
};
use crate::utils::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Result of a successful issuance insert.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedOrder {
    pub order: Order,
    pub tickets: Vec<Ticket>,
}

/// Result of cancelling an order's tickets after a payment reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledOrder {
    pub order_id: i64,
    pub cancelled_tickets: u64,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn order_exists(&self, checkout_session_id: &str) -> Result<bool, AppError>;

    /// Inserts the order and all of its tickets in one transaction.
    ///
    /// Returns `Ok(None)` without writing anything when an order with the same
    /// checkout session id already exists.
    async fn record_order(
        &self,
        order: NewOrder,
        tickets: Vec<NewTicket>,
    ) -> Result<Option<IssuedOrder>, AppError>;

    async fn ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, AppError>;

    async fn ticket_by_code(&self, qr_code_data: Uuid) -> Result<Option<Ticket>, AppError>;

    async fn tickets_for_order(&self, order_id: i64) -> Result<Vec<Ticket>, AppError>;

    async fn tickets_owned_by(&self, owner_id: Uuid) -> Result<Vec<Ticket>, AppError>;

    async fn transfers_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketTransfer>, AppError>;

    /// Writes the audit row and moves ownership from `from` to `to`, in one
    /// transaction, provided `from` still owns the ticket and it is still
    /// transferable. `Ok(None)` means the guard failed and nothing was written.
    async fn transfer_ticket(
        &self,
        ticket_id: i64,
        from: Uuid,
        to: Uuid,
    ) -> Result<Option<(Ticket, TicketTransfer)>, AppError>;

    /// Marks the ticket validated if it is still admissible. `Ok(None)` means
    /// another scan got there first (or the ticket left an admissible state).
    async fn validate_ticket(
        &self,
        ticket_id: i64,
        validated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError>;

    /// Cancels every non-terminal ticket of the order paid by
    /// `payment_intent_id` and marks the order canceled. `Ok(None)` when no
    /// order carries that payment intent.
    async fn cancel_order(&self, payment_intent_id: &str)
        -> Result<Option<CancelledOrder>, AppError>;

    /// Expires every non-terminal ticket, optionally restricted to one event.
    async fn expire_tickets(&self, event_name: Option<&str>) -> Result<u64, AppError>;

    async fn ticket_stats(&self) -> Result<TicketStats, AppError>;

    async fn save_push_token(&self, token: PushToken) -> Result<(), AppError>;

    async fn remove_push_token(&self, user_id: Uuid, expo_push_token: &str)
        -> Result<bool, AppError>;

    /// Push tokens of the given users, or of everyone when `user_ids` is `None`.
    async fn push_tokens(&self, user_ids: Option<&[Uuid]>) -> Result<Vec<String>, AppError>;
}

/// Read-only view of the identity provider's users and the payment
/// customer mapping.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<Uuid>, AppError>;

    /// Registered users whose email matches `email` (case-insensitive),
    /// never including `exclude`.
    async fn find_users_by_email(
        &self,
        email: &str,
        exclude: Uuid,
    ) -> Result<Vec<UserSummary>, AppError>;

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>, AppError>;

    async fn user_role(&self, user_id: Uuid) -> Result<UserRole, AppError>;
}
