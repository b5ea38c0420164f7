use axum::{extract::State, response::Response, Json};
use serde::{Deserialize, Serialize};

use crate::middleware::StaffUser;
use crate::services;
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

#[derive(Deserialize, Default)]
pub struct ExpireRequest {
    #[serde(default)]
    pub event_name: Option<String>,
}

#[derive(Serialize)]
pub struct ExpireResponse {
    pub expired: u64,
}

/// GET /staff/stats
pub async fn ticket_stats(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Response, AppError> {
    let stats = state.store.ticket_stats().await?;
    Ok(success(stats, "Ticket stats retrieved"))
}

/// POST /staff/expire
///
/// The body is optional; without an event name every event is expired.
pub async fn expire_tickets(
    State(state): State<AppState>,
    staff: StaffUser,
    body: Option<Json<ExpireRequest>>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    tracing::info!(staff_id = %staff.user.id, role = ?staff.role, "Expiry requested");
    let expired = services::expire_tickets(state.store.as_ref(), body.event_name.as_deref()).await?;

    Ok(success(ExpireResponse { expired }, "Tickets expired"))
}
