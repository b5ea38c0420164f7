use tracing::info;

use crate::store::TicketStore;
use crate::utils::AppError;

/// Moves every non-terminal ticket, optionally of one event only, to
/// `expired`. Running it again finds nothing left to expire.
pub async fn expire_tickets(
    store: &dyn TicketStore,
    event_name: Option<&str>,
) -> Result<u64, AppError> {
    let event_name = event_name.map(str::trim).filter(|name| !name.is_empty());
    let expired = store.expire_tickets(event_name).await?;

    info!(event_name = ?event_name, expired, "Expired tickets");
    Ok(expired)
}
