//! Door scan: redeems a ticket exactly once.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Ticket, TicketStatus};
use crate::store::{IdentityDirectory, TicketStore};
use crate::utils::{AppError, Rejection};

pub const UNKNOWN_OWNER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// This scan redeemed the ticket.
    Admitted { ticket: Ticket, owner_email: String },
    /// The ticket exists but cannot be redeemed. For an already used ticket
    /// the rejection carries the first scan's timestamp.
    Refused { ticket: Ticket, rejection: Rejection },
}

/// Why `ticket` cannot be admitted, if it cannot.
fn refusal(ticket: &Ticket) -> Option<Rejection> {
    match ticket.status {
        TicketStatus::Validated => Some(Rejection::AlreadyValidated(
            ticket.validated_at.unwrap_or(ticket.updated_at),
        )),
        TicketStatus::Cancelled => Some(Rejection::TicketCancelled),
        TicketStatus::Expired => Some(Rejection::TicketExpired),
        TicketStatus::Active | TicketStatus::Transferred => None,
    }
}

pub async fn validate_ticket(
    store: &dyn TicketStore,
    directory: &dyn IdentityDirectory,
    staff_id: Uuid,
    qr_code_data: &str,
) -> Result<ScanOutcome, AppError> {
    let raw = qr_code_data.trim();
    if raw.is_empty() {
        return Err(AppError::ValidationError(
            "QR code data is required".to_string(),
        ));
    }

    // Anything that is not a UUID cannot match a stored code.
    let not_found = || AppError::NotFound("Invalid QR code - ticket not found".to_string());
    let code = Uuid::parse_str(raw).map_err(|_| not_found())?;
    let ticket = store.ticket_by_code(code).await?.ok_or_else(not_found)?;

    if let Some(rejection) = refusal(&ticket) {
        info!(ticket_id = ticket.id, reason = %rejection, "Scan refused");
        return Ok(ScanOutcome::Refused { ticket, rejection });
    }

    let Some(ticket) = store.validate_ticket(ticket.id, staff_id, Utc::now()).await? else {
        // Another scan won the conditional update; report what it left behind.
        let current = store.ticket(ticket.id).await?.ok_or_else(not_found)?;
        let rejection = refusal(&current).unwrap_or(Rejection::TicketNoLongerActive);
        info!(ticket_id = current.id, reason = %rejection, "Scan lost race");
        return Ok(ScanOutcome::Refused {
            ticket: current,
            rejection,
        });
    };

    let owner_email = match directory.user_email(ticket.owner_id).await {
        Ok(Some(email)) => email,
        Ok(None) => UNKNOWN_OWNER.to_string(),
        Err(e) => {
            warn!(ticket_id = ticket.id, error = %e, "Owner lookup failed");
            UNKNOWN_OWNER.to_string()
        }
    };

    info!(
        ticket_id = ticket.id,
        validated_by = %staff_id,
        "Ticket validated"
    );

    Ok(ScanOutcome::Admitted {
        ticket,
        owner_email,
    })
}
