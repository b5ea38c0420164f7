use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use tracing::info;

use crate::payments::{PaymentEvent, WebhookEvent, SIGNATURE_HEADER};
use crate::services::{handle_charge_refunded, handle_refund_updated, issue_tickets};
use crate::state::AppState;
use crate::utils::response::received;
use crate::utils::AppError;

/// Payment processor deliveries. The raw body is verified before it is
/// parsed. Processed, ignored and anomalous events are all acknowledged;
/// only transient failures return an error so the processor redelivers.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.webhook_verifier.verify(&body, signature)?;

    let event = WebhookEvent::parse(&body)?;
    info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

    match event.payload {
        PaymentEvent::CheckoutCompleted(session) => {
            let outcome = issue_tickets(
                state.store.as_ref(),
                state.directory.as_ref(),
                state.gateway.as_ref(),
                &state.issuance,
                &session,
            )
            .await?;
            info!(event_id = %event.id, outcome = ?outcome, "Checkout session handled");
        }
        PaymentEvent::ChargeRefunded(charge) => {
            let outcome = handle_charge_refunded(state.store.as_ref(), &charge).await?;
            info!(event_id = %event.id, outcome = ?outcome, "Charge refund handled");
        }
        PaymentEvent::RefundUpdated(refund) => {
            let outcome =
                handle_refund_updated(state.store.as_ref(), state.gateway.as_ref(), &refund)
                    .await?;
            info!(event_id = %event.id, outcome = ?outcome, "Refund update handled");
        }
        PaymentEvent::Ignored => {
            info!(event_id = %event.id, event_type = %event.event_type, "Unhandled event type");
        }
    }

    Ok(received())
}
