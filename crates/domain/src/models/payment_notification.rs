//! Inbound payment provider notifications and the idempotency ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use super::payment::PaymentTrigger;

/// Metadata key the checkout provider echoes back with the registration id.
pub const REGISTRATION_METADATA_KEY: &str = "registration_id";

/// Notification kinds the core acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderEventType {
    CheckoutCompleted,
    CheckoutExpired,
    CheckoutFailed,
    PaymentRefunded,
    /// Any other provider tag. Acknowledged and recorded, never acted on.
    Other(String),
}

impl ProviderEventType {
    /// Parses a provider tag. Accepts both the short tags and the
    /// provider-native checkout session names.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "checkout.completed" | "checkout.session.completed" => Self::CheckoutCompleted,
            "checkout.expired" | "checkout.session.expired" => Self::CheckoutExpired,
            "checkout.failed" | "checkout.session.async_payment_failed" => Self::CheckoutFailed,
            "payment.refunded" | "charge.refunded" => Self::PaymentRefunded,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn trigger(&self) -> Option<PaymentTrigger> {
        match self {
            Self::CheckoutCompleted => Some(PaymentTrigger::CheckoutCompleted),
            Self::CheckoutExpired => Some(PaymentTrigger::CheckoutExpired),
            Self::CheckoutFailed => Some(PaymentTrigger::CheckoutFailed),
            Self::PaymentRefunded => Some(PaymentTrigger::Refunded),
            Self::Other(_) => None,
        }
    }
}

/// Errors raised while interpreting a verified notification body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationParseError {
    #[error("notification body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("notification has an empty event id")]
    MissingEventId,

    #[error("notification of type {0} carries no resource reference")]
    MissingReference(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawNotification {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: RawData,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    object: RawObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawObject {
    id: Option<String>,
    payment_intent: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Provider handle that must resolve to exactly one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderReference {
    CheckoutSession(String),
    PaymentIntent(String),
}

impl std::fmt::Display for ProviderReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderReference::CheckoutSession(id) => write!(f, "checkout session {}", id),
            ProviderReference::PaymentIntent(id) => write!(f, "payment intent {}", id),
        }
    }
}

/// A verified, interpreted provider notification.
#[derive(Debug, Clone)]
pub struct ProviderNotification {
    pub provider_event_id: String,
    pub raw_type: String,
    pub event_type: ProviderEventType,
    /// `None` only for [`ProviderEventType::Other`].
    pub reference: Option<ProviderReference>,
    /// Payment intent carried alongside a checkout session, if any.
    pub payment_intent_id: Option<String>,
    /// Registration id the provider echoes back, used to detect mismatches.
    pub claimed_registration_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl ProviderNotification {
    pub fn parse(body: &[u8]) -> Result<Self, NotificationParseError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| NotificationParseError::InvalidJson(e.to_string()))?;
        Self::from_value(payload)
    }

    /// Interprets an already decoded payload (used by the retry job, which
    /// re-reads payloads from the ledger).
    pub fn from_value(payload: serde_json::Value) -> Result<Self, NotificationParseError> {
        let raw: RawNotification = serde_json::from_value(payload.clone())
            .map_err(|e| NotificationParseError::InvalidJson(e.to_string()))?;

        if raw.id.trim().is_empty() {
            return Err(NotificationParseError::MissingEventId);
        }

        let event_type = ProviderEventType::parse(&raw.event_type);
        let object = raw.data.object;

        let reference = match event_type {
            ProviderEventType::CheckoutCompleted
            | ProviderEventType::CheckoutExpired
            | ProviderEventType::CheckoutFailed => Some(ProviderReference::CheckoutSession(
                object
                    .id
                    .clone()
                    .ok_or_else(|| NotificationParseError::MissingReference(raw.event_type.clone()))?,
            )),
            ProviderEventType::PaymentRefunded => Some(ProviderReference::PaymentIntent(
                object
                    .payment_intent
                    .clone()
                    .or_else(|| object.id.clone())
                    .ok_or_else(|| NotificationParseError::MissingReference(raw.event_type.clone()))?,
            )),
            ProviderEventType::Other(_) => None,
        };

        let claimed_registration_id = object
            .metadata
            .get(REGISTRATION_METADATA_KEY)
            .or(object.client_reference_id.as_ref())
            .and_then(|id| Uuid::parse_str(id).ok());

        Ok(Self {
            provider_event_id: raw.id,
            raw_type: raw.event_type,
            event_type,
            reference,
            payment_intent_id: object.payment_intent,
            claimed_registration_id,
            payload,
        })
    }
}

/// Result of claiming a notification in the idempotency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClaim {
    /// This caller owns processing. `prior_attempts` is 0 on first sight.
    Claimed { prior_attempts: i32 },
    /// Side effects were already committed. Skip.
    AlreadyProcessed,
    /// Retries exhausted; awaiting manual review. Skip.
    DeadLettered { attempts: i32 },
}

impl AttemptClaim {
    pub fn is_new(&self) -> bool {
        matches!(self, AttemptClaim::Claimed { prior_attempts: 0 })
    }

    pub fn should_process(&self) -> bool {
        matches!(self, AttemptClaim::Claimed { .. })
    }
}

/// How a notification was resolved. Everything except a transient error is
/// acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Applied {
        registration_id: Uuid,
        from: super::payment::PaymentStatus,
        to: super::payment::PaymentStatus,
    },
    AlreadyApplied { registration_id: Uuid },
    Duplicate,
    DeadLettered,
    IllegalTransition { registration_id: Uuid },
    UnknownReference,
    Ignored,
}

impl NotificationOutcome {
    /// Label used for the `payment_notifications_total` counter.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationOutcome::Applied { .. } => "applied",
            NotificationOutcome::AlreadyApplied { .. } => "already_applied",
            NotificationOutcome::Duplicate => "duplicate",
            NotificationOutcome::DeadLettered => "dead_lettered",
            NotificationOutcome::IllegalTransition { .. } => "illegal_transition",
            NotificationOutcome::UnknownReference => "unknown_reference",
            NotificationOutcome::Ignored => "ignored",
        }
    }
}

/// Ledger row in domain form.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentNotificationRecord {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub dead_lettered: bool,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response body returned to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: NotificationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_parse_event_type_aliases() {
        assert_eq!(
            ProviderEventType::parse("checkout.completed"),
            ProviderEventType::CheckoutCompleted
        );
        assert_eq!(
            ProviderEventType::parse("checkout.session.completed"),
            ProviderEventType::CheckoutCompleted
        );
        assert_eq!(
            ProviderEventType::parse("checkout.session.async_payment_failed"),
            ProviderEventType::CheckoutFailed
        );
        assert_eq!(
            ProviderEventType::parse("charge.refunded"),
            ProviderEventType::PaymentRefunded
        );
        assert_eq!(
            ProviderEventType::parse("customer.created"),
            ProviderEventType::Other("customer.created".into())
        );
        assert_eq!(ProviderEventType::parse("customer.created").trigger(), None);
    }

    #[test]
    fn test_parse_checkout_completed() {
        let registration_id = Uuid::new_v4();
        let n = ProviderNotification::parse(&body(json!({
            "id": "evt_123",
            "type": "checkout.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_1",
                "metadata": { "registration_id": registration_id.to_string() }
            }}
        })))
        .unwrap();

        assert_eq!(n.provider_event_id, "evt_123");
        assert_eq!(n.event_type, ProviderEventType::CheckoutCompleted);
        assert_eq!(
            n.reference,
            Some(ProviderReference::CheckoutSession("cs_test_1".into()))
        );
        assert_eq!(n.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(n.claimed_registration_id, Some(registration_id));
    }

    #[test]
    fn test_parse_refund_uses_payment_intent() {
        let n = ProviderNotification::parse(&body(json!({
            "id": "evt_9",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1", "payment_intent": "pi_7" } }
        })))
        .unwrap();
        assert_eq!(
            n.reference,
            Some(ProviderReference::PaymentIntent("pi_7".into()))
        );

        let n = ProviderNotification::parse(&body(json!({
            "id": "evt_10",
            "type": "payment.refunded",
            "data": { "object": { "id": "pi_8" } }
        })))
        .unwrap();
        assert_eq!(
            n.reference,
            Some(ProviderReference::PaymentIntent("pi_8".into()))
        );
    }

    #[test]
    fn test_parse_client_reference_fallback() {
        let registration_id = Uuid::new_v4();
        let n = ProviderNotification::parse(&body(json!({
            "id": "evt_1",
            "type": "checkout.expired",
            "data": { "object": {
                "id": "cs_1",
                "client_reference_id": registration_id.to_string()
            }}
        })))
        .unwrap();
        assert_eq!(n.claimed_registration_id, Some(registration_id));
    }

    #[test]
    fn test_parse_rejects_missing_reference() {
        let err = ProviderNotification::parse(&body(json!({
            "id": "evt_1",
            "type": "checkout.completed",
            "data": { "object": {} }
        })))
        .unwrap_err();
        assert!(matches!(err, NotificationParseError::MissingReference(_)));
    }

    #[test]
    fn test_parse_rejects_empty_id_and_bad_json() {
        assert_eq!(
            ProviderNotification::parse(&body(json!({ "id": " ", "type": "checkout.completed" })))
                .unwrap_err(),
            NotificationParseError::MissingEventId
        );
        assert!(matches!(
            ProviderNotification::parse(b"not json"),
            Err(NotificationParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_other_type_has_no_reference() {
        let n = ProviderNotification::parse(&body(json!({
            "id": "evt_2",
            "type": "customer.updated"
        })))
        .unwrap();
        assert!(n.reference.is_none());
        assert_eq!(n.raw_type, "customer.updated");
    }

    #[test]
    fn test_attempt_claim() {
        assert!(AttemptClaim::Claimed { prior_attempts: 0 }.is_new());
        assert!(!AttemptClaim::Claimed { prior_attempts: 2 }.is_new());
        assert!(AttemptClaim::Claimed { prior_attempts: 2 }.should_process());
        assert!(!AttemptClaim::AlreadyProcessed.is_new());
        assert!(!AttemptClaim::DeadLettered { attempts: 10 }.should_process());
    }

    #[test]
    fn test_ack_serialization() {
        let ack = WebhookAck {
            received: true,
            outcome: NotificationOutcome::Duplicate,
        };
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value, json!({ "received": true, "outcome": "duplicate" }));
    }
}
