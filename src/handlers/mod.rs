use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod notifications;
pub mod staff;
pub mod tickets;
pub mod transfers;
pub mod validation;
pub mod webhook;

pub use notifications::{register_push_token, send_notification, unregister_push_token};
pub use staff::{expire_tickets, ticket_stats};
pub use tickets::{list_my_tickets, list_ticket_transfers};
pub use transfers::{commit_transfer, lookup_recipient};
pub use validation::validate_ticket;
pub use webhook::stripe_webhook;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "fbcon-server",
    };

    success(payload, "Health check successful")
}
