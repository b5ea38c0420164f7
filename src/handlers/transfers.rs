use axum::{extract::State, response::Response, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::{Ticket, TicketTransfer};
use crate::services;
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

#[derive(Deserialize)]
pub struct LookupRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub ticket_id: i64,
    pub recipient_user_id: Uuid,
}

#[derive(Serialize)]
pub struct TransferResponse {
    pub ticket: Ticket,
    pub transfer: TicketTransfer,
}

/// POST /transfers/lookup
pub async fn lookup_recipient(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<LookupRequest>,
) -> Result<Response, AppError> {
    let users = services::lookup_recipients(
        state.directory.as_ref(),
        user.id,
        user.email.as_deref(),
        &body.email,
    )
    .await?;

    Ok(success(users, "Recipients found"))
}

/// POST /transfers
pub async fn commit_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<TransferRequest>,
) -> Result<Response, AppError> {
    let (ticket, transfer) = services::commit_transfer(
        state.store.as_ref(),
        state.directory.as_ref(),
        user.id,
        body.ticket_id,
        body.recipient_user_id,
    )
    .await?;

    Ok(success(
        TransferResponse { ticket, transfer },
        "Ticket transferred",
    ))
}
