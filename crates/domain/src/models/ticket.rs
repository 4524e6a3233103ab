//! Ticket domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::payment::PaymentStatus;

/// Proof of a confirmed reservation. Never deleted, only invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Ticket {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ticket_code: String,
    #[serde(skip_serializing)]
    pub verification_payload: String,
    pub is_valid: bool,
    pub document_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Valid flag set and not yet expired at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && self.expires_at > now
    }
}

/// Result of an issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(Ticket),
    /// A ticket already exists for the registration; no second one was created.
    AlreadyIssued(Ticket),
}

impl IssueOutcome {
    pub fn ticket(&self) -> &Ticket {
        match self {
            IssueOutcome::Issued(t) | IssueOutcome::AlreadyIssued(t) => t,
        }
    }

    pub fn into_ticket(self) -> Ticket {
        match self {
            IssueOutcome::Issued(t) | IssueOutcome::AlreadyIssued(t) => t,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, IssueOutcome::Issued(_))
    }
}

/// Issuance refused before touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuePreconditionError {
    #[error("registration payment status {0} does not entitle a ticket")]
    NotTicketable(PaymentStatus),
}

/// Checks the payment status precondition for issuance.
pub fn check_issuable(status: PaymentStatus) -> Result<(), IssuePreconditionError> {
    if status.is_ticketable() {
        Ok(())
    } else {
        Err(IssuePreconditionError::NotTicketable(status))
    }
}

/// What a scanner submits: either the printed code or the encoded payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerifyTicketRequest {
    pub code: Option<String>,
    pub payload: Option<String>,
}

/// Verification answer. Carries no reason for rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TicketVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl TicketVerification {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            registration_id: None,
            event_id: None,
        }
    }

    pub fn for_ticket(ticket: &Ticket, now: DateTime<Utc>) -> Self {
        if ticket.is_usable_at(now) {
            Self {
                valid: true,
                registration_id: Some(ticket.registration_id),
                event_id: Some(ticket.event_id),
            }
        } else {
            Self::invalid()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket(is_valid: bool, expires_in: Duration) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            registration_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: None,
            ticket_code: "TKT-ABCDEFGHJKLMNPQR".into(),
            verification_payload: "payload".into(),
            is_valid,
            document_url: None,
            expires_at: now + expires_in,
            invalidated_at: None,
            created_at: now,
        }
    }

    #[test]
    fn test_verification_valid_ticket() {
        let t = ticket(true, Duration::days(1));
        let v = TicketVerification::for_ticket(&t, Utc::now());
        assert!(v.valid);
        assert_eq!(v.registration_id, Some(t.registration_id));
        assert_eq!(v.event_id, Some(t.event_id));
    }

    #[test]
    fn test_verification_rejects_invalidated_and_expired() {
        let now = Utc::now();
        assert_eq!(
            TicketVerification::for_ticket(&ticket(false, Duration::days(1)), now),
            TicketVerification::invalid()
        );
        assert_eq!(
            TicketVerification::for_ticket(&ticket(true, Duration::hours(-1)), now),
            TicketVerification::invalid()
        );
    }

    #[test]
    fn test_invalid_response_leaks_nothing() {
        let json = serde_json::to_value(TicketVerification::invalid()).unwrap();
        assert_eq!(json, serde_json::json!({ "valid": false }));
    }

    #[test]
    fn test_check_issuable() {
        assert!(check_issuable(PaymentStatus::Paid).is_ok());
        assert!(check_issuable(PaymentStatus::NotRequired).is_ok());
        assert_eq!(
            check_issuable(PaymentStatus::Pending),
            Err(IssuePreconditionError::NotTicketable(PaymentStatus::Pending))
        );
        assert!(check_issuable(PaymentStatus::Refunded).is_err());
    }

    #[test]
    fn test_issue_outcome() {
        let t = ticket(true, Duration::days(1));
        assert!(IssueOutcome::Issued(t.clone()).is_new());
        assert!(!IssueOutcome::AlreadyIssued(t.clone()).is_new());
        assert_eq!(IssueOutcome::AlreadyIssued(t.clone()).into_ticket(), t);
    }

    #[test]
    fn test_payload_not_serialized() {
        let json = serde_json::to_value(ticket(true, Duration::days(1))).unwrap();
        assert!(json.get("verification_payload").is_none());
        assert!(json.get("ticket_code").is_some());
    }
}
