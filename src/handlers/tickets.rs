use axum::{
    extract::{Path, State},
    response::Response,
};

use crate::middleware::AuthUser;
use crate::services::transfer_history;
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

/// GET /tickets
pub async fn list_my_tickets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let tickets = state.store.tickets_owned_by(user.id).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

/// GET /tickets/:id/transfers
pub async fn list_ticket_transfers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<Response, AppError> {
    let transfers = transfer_history(state.store.as_ref(), user.id, ticket_id).await?;
    Ok(success(transfers, "Transfer history retrieved"))
}
