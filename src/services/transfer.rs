//! Two-phase ticket transfer: the holder first looks up a recipient by email,
//! then commits the transfer to one of the returned accounts.

use tracing::info;
use uuid::Uuid;

use crate::models::{Ticket, TicketStatus, TicketTransfer, UserSummary};
use crate::store::{IdentityDirectory, TicketStore};
use crate::utils::{AppError, Rejection};

/// Lookup phase. Resolves `candidate_email` to registered accounts other than
/// the caller. Naming one's own email is rejected before any lookup, and an
/// empty result is a [`Rejection::RecipientHasNoAccount`].
pub async fn lookup_recipients(
    directory: &dyn IdentityDirectory,
    caller: Uuid,
    caller_email: Option<&str>,
    candidate_email: &str,
) -> Result<Vec<UserSummary>, AppError> {
    let candidate = candidate_email.trim().to_lowercase();
    if candidate.is_empty() {
        return Err(AppError::ValidationError(
            "Recipient email is required".to_string(),
        ));
    }

    let own_email = match caller_email {
        Some(email) => Some(email.to_string()),
        None => directory.user_email(caller).await?,
    };
    if own_email.is_some_and(|own| own.trim().eq_ignore_ascii_case(&candidate)) {
        return Err(Rejection::SelfTransfer.into());
    }

    let users = directory.find_users_by_email(&candidate, caller).await?;
    if users.is_empty() {
        return Err(Rejection::RecipientHasNoAccount.into());
    }

    Ok(users)
}

/// Commit phase. Writes the audit row and moves ownership in one transaction.
/// Checks run against a fresh read first so the caller gets a precise reason;
/// the store's guarded update then settles any race. A loser that read the
/// ticket before the winner committed sees [`Rejection::TicketNoLongerActive`];
/// one that read it afterwards sees [`Rejection::NotTicketOwner`].
pub async fn commit_transfer(
    store: &dyn TicketStore,
    directory: &dyn IdentityDirectory,
    caller: Uuid,
    ticket_id: i64,
    recipient: Uuid,
) -> Result<(Ticket, TicketTransfer), AppError> {
    let ticket = store
        .ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {ticket_id} not found")))?;

    if ticket.owner_id != caller {
        return Err(Rejection::NotTicketOwner.into());
    }
    if ticket.status != TicketStatus::Active {
        return Err(Rejection::TicketNotActive(ticket.status).into());
    }
    if recipient == caller {
        return Err(Rejection::SelfTransfer.into());
    }
    if directory.user_email(recipient).await?.is_none() {
        return Err(Rejection::RecipientHasNoAccount.into());
    }

    let (ticket, transfer) = store
        .transfer_ticket(ticket_id, caller, recipient)
        .await?
        .ok_or(Rejection::TicketNoLongerActive)?;

    info!(
        ticket_id = ticket.id,
        transfer_id = transfer.id,
        from_user_id = %caller,
        to_user_id = %recipient,
        "Ticket transferred"
    );

    Ok((ticket, transfer))
}

/// Transfer history of a ticket, visible to its current holder only.
pub async fn transfer_history(
    store: &dyn TicketStore,
    caller: Uuid,
    ticket_id: i64,
) -> Result<Vec<TicketTransfer>, AppError> {
    let ticket = store
        .ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {ticket_id} not found")))?;

    if ticket.owner_id != caller {
        return Err(AppError::Forbidden(
            "You can only view the history of tickets you hold".to_string(),
        ));
    }

    store.transfers_for_ticket(ticket_id).await
}
