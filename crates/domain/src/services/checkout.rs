//! Checkout provider seam.
//!
//! Creating a hosted checkout session is the only call the core makes into
//! the payment provider. Everything after that arrives as notifications.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::money::Money;

/// Parameters for a new checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub event_title: String,
    pub amount: Money,
    pub quantity: i32,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Provider handle for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout provider request failed: {0}")]
    Transport(String),

    #[error("checkout provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("checkout provider returned an unexpected response: {0}")]
    InvalidResponse(String),
}

#[async_trait::async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError>;
}

/// Mock provider for development and testing.
///
/// Session ids are `cs_mock_<n>`, unique per instance and shared across clones.
#[derive(Debug, Clone, Default)]
pub struct MockCheckoutProvider {
    pub simulate_failure: bool,
    counter: Arc<AtomicUsize>,
}

impl MockCheckoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Number of sessions created so far.
    pub fn sessions_created(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CheckoutProvider for MockCheckoutProvider {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        if self.simulate_failure {
            return Err(CheckoutError::Transport("Simulated failure".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_mock_{}_{}", request.registration_id.simple(), n);

        tracing::info!(
            registration_id = %request.registration_id,
            amount = %request.amount,
            session_id = %session_id,
            "Mock: Would create checkout session"
        );

        Ok(CheckoutSession {
            url: format!("https://checkout.invalid/pay/{}", session_id),
            session_id,
            expires_at: request.expires_at,
        })
    }
}

/// Expiry for a checkout session opened at `now`.
pub fn checkout_expiry(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now + Duration::hours(hours)
}
