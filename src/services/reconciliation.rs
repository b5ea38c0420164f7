//! Cancels unused tickets when their payment is reversed.

use tracing::{info, warn};

use crate::payments::{Charge, PaymentGateway, Refund};
use crate::store::{CancelledOrder, TicketStore};
use crate::utils::AppError;

const REFUND_SUCCEEDED: &str = "succeeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Cancelled(CancelledOrder),
    /// No order carries the payment intent. Subscriptions and unrelated
    /// charges end up here.
    UnknownPayment,
    /// The event does not name a payment intent, or the refund has not
    /// succeeded yet.
    Skipped,
}

/// Cancels the non-terminal tickets of the order paid by `payment_intent_id`.
/// Replays are harmless: tickets already cancelled are not matched again.
pub async fn reconcile_payment_intent(
    store: &dyn TicketStore,
    payment_intent_id: &str,
) -> Result<ReconciliationOutcome, AppError> {
    match store.cancel_order(payment_intent_id).await? {
        Some(cancelled) => {
            info!(
                order_id = cancelled.order_id,
                payment_intent_id,
                cancelled_tickets = cancelled.cancelled_tickets,
                "Cancelled tickets for reversed payment"
            );
            Ok(ReconciliationOutcome::Cancelled(cancelled))
        }
        None => {
            info!(payment_intent_id, "No order for reversed payment");
            Ok(ReconciliationOutcome::UnknownPayment)
        }
    }
}

pub async fn handle_charge_refunded(
    store: &dyn TicketStore,
    charge: &Charge,
) -> Result<ReconciliationOutcome, AppError> {
    let Some(payment_intent) = charge.payment_intent.as_ref() else {
        warn!(charge_id = %charge.id, "Refunded charge has no payment intent");
        return Ok(ReconciliationOutcome::Skipped);
    };

    reconcile_payment_intent(store, payment_intent.id()).await
}

/// Only succeeded refunds cancel tickets. When the refund does not carry the
/// payment intent it is resolved through the refund's charge.
pub async fn handle_refund_updated(
    store: &dyn TicketStore,
    gateway: &dyn PaymentGateway,
    refund: &Refund,
) -> Result<ReconciliationOutcome, AppError> {
    if refund.status.as_deref() != Some(REFUND_SUCCEEDED) {
        info!(refund_id = %refund.id, status = ?refund.status, "Refund not succeeded yet");
        return Ok(ReconciliationOutcome::Skipped);
    }

    let payment_intent = match (&refund.payment_intent, &refund.charge) {
        (Some(pi), _) => Some(pi.id().to_string()),
        (None, Some(charge)) => gateway.charge_payment_intent(charge.id()).await?,
        (None, None) => None,
    };

    let Some(payment_intent) = payment_intent else {
        warn!(refund_id = %refund.id, "Refund could not be tied to a payment intent");
        return Ok(ReconciliationOutcome::Skipped);
    };

    reconcile_payment_intent(store, &payment_intent).await
}
