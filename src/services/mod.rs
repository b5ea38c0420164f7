//! Ticket lifecycle operations. Every function takes the store and
//! collaborator handles it needs as arguments; nothing is held globally.

pub mod expiry;
pub mod issuance;
pub mod notifications;
pub mod reconciliation;
pub mod transfer;
pub mod validation;

pub use expiry::expire_tickets;
pub use issuance::{issue_tickets, BundleRule, IssuanceOutcome, IssuancePolicy, TICKET_COLORS};
pub use notifications::{
    broadcast, register_push_token, Broadcast, BroadcastReport, ExpoPushRelay, PushMessage,
    PushRelay, PUSH_BATCH_SIZE,
};
pub use reconciliation::{
    handle_charge_refunded, handle_refund_updated, reconcile_payment_intent,
    ReconciliationOutcome,
};
pub use transfer::{commit_transfer, lookup_recipients, transfer_history};
pub use validation::{validate_ticket, ScanOutcome, UNKNOWN_OWNER};
