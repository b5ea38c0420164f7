use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::event::{Charge, LineItem, LineItemList};
use crate::utils::AppError;

/// Outbound calls to the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Line items of a checkout session, with prices expanded.
    async fn list_line_items(&self, checkout_session_id: &str) -> Result<Vec<LineItem>, AppError>;

    /// Payment intent that a charge belongs to, if any.
    async fn charge_payment_intent(&self, charge_id: &str) -> Result<Option<String>, AppError>;
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(api_base: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.api_base, path);
        debug!(%url, "Calling payment processor");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Payment processor unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(AppError::ExternalServiceError(format!(
                "Payment processor returned {status}: {message}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Unreadable processor response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn list_line_items(&self, checkout_session_id: &str) -> Result<Vec<LineItem>, AppError> {
        let list: LineItemList = self
            .get(
                &format!("/v1/checkout/sessions/{checkout_session_id}/line_items"),
                &[("expand[]", "data.price"), ("limit", "100")],
            )
            .await?;
        Ok(list.data)
    }

    async fn charge_payment_intent(&self, charge_id: &str) -> Result<Option<String>, AppError> {
        let charge: Charge = self.get(&format!("/v1/charges/{charge_id}"), &[]).await?;
        Ok(charge.payment_intent.map(|pi| pi.id().to_string()))
    }
}
