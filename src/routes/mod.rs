use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::create_cors_layer;
use crate::handlers::{
    commit_transfer, expire_tickets, health_check, list_my_tickets, list_ticket_transfers,
    lookup_recipient, register_push_token, send_notification, stripe_webhook, ticket_stats,
    unregister_push_token, validate_ticket,
};
use crate::state::AppState;

pub fn create_routes(state: AppState, cors_allowed_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/tickets", get(list_my_tickets))
        .route("/tickets/:id/transfers", get(list_ticket_transfers))
        .route("/transfers/lookup", post(lookup_recipient))
        .route("/transfers", post(commit_transfer))
        .route("/validate", post(validate_ticket))
        .route("/staff/stats", get(ticket_stats))
        .route("/staff/expire", post(expire_tickets))
        .route(
            "/push-tokens",
            post(register_push_token).delete(unregister_push_token),
        )
        .route("/admin/notifications", post(send_notification))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(cors_allowed_origins))
        .with_state(state)
}
