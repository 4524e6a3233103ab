//! Inbound payment provider notifications.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use domain::models::payment_notification::WebhookAck;
use domain::models::{PaymentNotificationRecord, ProviderNotification};
use serde::Deserialize;
use shared::signature::verify_provider_signature;
use tracing::warn;

use crate::app::AppState;
use crate::config::PaymentsConfig;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "payment-signature";

const DEFAULT_REVIEW_LIMIT: i64 = 50;
const MAX_REVIEW_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub limit: Option<i64>,
}

impl ReviewQuery {
    fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_REVIEW_LIMIT)
            .clamp(1, MAX_REVIEW_LIMIT)
    }
}

/// POST /api/v1/payments/webhook
///
/// The body is taken raw because the signature covers the exact bytes. Any
/// non-2xx answer makes the provider redeliver, so only transient failures
/// are reported as errors; duplicates, unknown references and illegal
/// transitions are acknowledged.
pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    verify_signature(&headers, &body, &state.config.payments, Utc::now().timestamp())?;

    let notification = ProviderNotification::parse(&body).map_err(|e| {
        warn!(error = %e, "Unreadable payment notification");
        ApiError::Validation(e.to_string())
    })?;

    let outcome = state.payment_notifications.process(&notification).await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

/// GET /api/v1/payments/notifications/review
///
/// Dead-lettered notifications and those acknowledged with a review note.
pub async fn list_review_queue(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Vec<PaymentNotificationRecord>>, ApiError> {
    let entries = state
        .payment_notifications
        .review_queue(query.effective_limit())
        .await?;
    Ok(Json(entries))
}

fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    config: &PaymentsConfig,
    now: i64,
) -> Result<(), ApiError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing payment signature".into()))?;

    verify_provider_signature(
        header,
        body,
        &config.webhook_signing_secret,
        now,
        config.signature_tolerance_secs,
    )
    .map_err(|e| {
        warn!(error = %e, "Payment notification signature rejected");
        ApiError::Unauthorized("Invalid payment signature".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::HeaderValue;
    use shared::signature::sign_provider_payload;

    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.completed"}"#;

    fn config() -> PaymentsConfig {
        Config::load_for_test(&[]).unwrap().payments
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_review_limit_is_clamped() {
        assert_eq!(ReviewQuery { limit: None }.effective_limit(), DEFAULT_REVIEW_LIMIT);
        assert_eq!(ReviewQuery { limit: Some(0) }.effective_limit(), 1);
        assert_eq!(ReviewQuery { limit: Some(10) }.effective_limit(), 10);
        assert_eq!(
            ReviewQuery { limit: Some(10_000) }.effective_limit(),
            MAX_REVIEW_LIMIT
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        let config = config();
        let now = 1_700_000_000;
        let header = sign_provider_payload(BODY, &config.webhook_signing_secret, now);

        assert!(verify_signature(&headers(&header), BODY, &config, now + 5).is_ok());
    }

    #[test]
    fn test_missing_header_rejected() {
        let result = verify_signature(&HeaderMap::new(), BODY, &config(), 1_700_000_000);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let config = config();
        let now = 1_700_000_000;
        let header = sign_provider_payload(BODY, &config.webhook_signing_secret, now);
        let tampered = br#"{"id":"evt_2","type":"checkout.completed"}"#;

        let result = verify_signature(&headers(&header), tampered, &config, now);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_stale_signature_rejected() {
        let config = config();
        let signed_at = 1_700_000_000;
        let header = sign_provider_payload(BODY, &config.webhook_signing_secret, signed_at);
        let later = signed_at + config.signature_tolerance_secs + 1;

        let result = verify_signature(&headers(&header), BODY, &config, later);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }
}
