use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::middleware::StaffUser;
use crate::models::Ticket;
use crate::services::{self, ScanOutcome};
use crate::state::AppState;
use crate::utils::AppError;

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub qr_code_data: String,
}

#[derive(Serialize)]
pub struct ScannedTicket {
    pub id: i64,
    pub ticket_type: String,
    pub ticket_number: i32,
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
}

impl ScannedTicket {
    fn new(ticket: Ticket, owner_email: Option<String>) -> Self {
        Self {
            id: ticket.id,
            ticket_type: ticket.ticket_type,
            ticket_number: ticket.ticket_number,
            event_name: ticket.event_name,
            owner_email,
        }
    }
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub ticket: Option<ScannedTicket>,
}

/// POST /validate
///
/// An unknown code is a 404 error. A known ticket that cannot be admitted is
/// a 409 that still describes the ticket, so staff can tell a used ticket
/// from a counterfeit one.
pub async fn validate_ticket(
    State(state): State<AppState>,
    staff: StaffUser,
    Json(body): Json<ValidateRequest>,
) -> Result<Response, AppError> {
    let outcome = services::validate_ticket(
        state.store.as_ref(),
        state.directory.as_ref(),
        staff.user.id,
        &body.qr_code_data,
    )
    .await?;

    let response = match outcome {
        ScanOutcome::Admitted {
            ticket,
            owner_email,
        } => (
            StatusCode::OK,
            Json(ValidateResponse {
                success: true,
                message: "Ticket validated successfully".to_string(),
                code: None,
                ticket: Some(ScannedTicket::new(ticket, Some(owner_email))),
            }),
        ),
        ScanOutcome::Refused { ticket, rejection } => (
            StatusCode::CONFLICT,
            Json(ValidateResponse {
                success: false,
                message: rejection.to_string(),
                code: Some(rejection.code()),
                ticket: Some(ScannedTicket::new(ticket, None)),
            }),
        ),
    };

    Ok(response.into_response())
}
