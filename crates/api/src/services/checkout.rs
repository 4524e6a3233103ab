//! Hosted checkout sessions over HTTP.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use domain::models::payment_notification::REGISTRATION_METADATA_KEY;
use domain::services::{
    CheckoutError, CheckoutProvider, CheckoutRequest, CheckoutSession, MockCheckoutProvider,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PaymentsConfig;

/// Form-encoded client for the provider's checkout session endpoint.
pub struct HttpCheckoutProvider {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

impl HttpCheckoutProvider {
    pub fn new(config: &PaymentsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let registration_id = request.registration_id.to_string();
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("client_reference_id".to_string(), registration_id.clone()),
            (
                format!("metadata[{}]", REGISTRATION_METADATA_KEY),
                registration_id.clone(),
            ),
            (
                format!("payment_intent_data[metadata][{}]", REGISTRATION_METADATA_KEY),
                registration_id,
            ),
            (
                "metadata[event_id]".to_string(),
                request.event_id.to_string(),
            ),
            (
                "expires_at".to_string(),
                request.expires_at.timestamp().to_string(),
            ),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.amount.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount.amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.event_title.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        form
    }
}

#[async_trait::async_trait]
impl CheckoutProvider for HttpCheckoutProvider {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        debug!(registration_id = %request.registration_id, url = %url, "Creating checkout session");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&Self::form(&request))
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(CheckoutError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::InvalidResponse(e.to_string()))?;

        let url = body
            .url
            .ok_or_else(|| CheckoutError::InvalidResponse("session has no url".into()))?;
        let expires_at = body
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or(request.expires_at);

        info!(
            registration_id = %request.registration_id,
            session_id = %body.id,
            "Checkout session created"
        );

        Ok(CheckoutSession {
            session_id: body.id,
            url,
            expires_at,
        })
    }
}

/// Builds the checkout provider named by configuration.
pub fn build_checkout_provider(
    config: &PaymentsConfig,
) -> Result<Arc<dyn CheckoutProvider>, reqwest::Error> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockCheckoutProvider::new())),
        _ => Ok(Arc::new(HttpCheckoutProvider::new(config)?)),
    }
}
