//! Ticket issuance, invalidation and verification.
//!
//! Issuance runs inside the caller's transaction, next to the payment status
//! change that entitles the registration to a ticket. The unique constraint on
//! `tickets.registration_id` is what makes a second issuance impossible; the
//! pre-read only saves a round of code generation.

use chrono::{DateTime, Utc};
use domain::models::ticket::{check_issuable, IssuePreconditionError, VerifyTicketRequest};
use domain::models::{IssueOutcome, Registration, Ticket, TicketVerification};
use metrics::counter;
use persistence::entities::NewTicket;
use persistence::repositories::{EventRepository, TicketRepository};
use shared::ticket_jwt::{TicketClaims, TicketJwtError, TicketSigner};
use shared::ticket_token::{generate_ticket_code, is_well_formed_ticket_code};
use sqlx::PgConnection;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Attempts at drawing a fresh code before giving up. With 80 random bits a
/// single collision is already improbable.
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    NotIssuable(#[from] IssuePreconditionError),

    #[error("Event {0} not found")]
    EventNotFound(Uuid),

    #[error("No unique ticket code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error("Ticket signing failed: {0}")]
    Signing(#[from] TicketJwtError),
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::Database(e) => e.into(),
            TicketError::NotIssuable(e) => e.into(),
            TicketError::EventNotFound(id) => ApiError::NotFound(format!("Event {} not found", id)),
            TicketError::CodeSpaceExhausted(_) | TicketError::Signing(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// Issues and checks tickets. Cheap to clone.
#[derive(Clone)]
pub struct TicketIssuer {
    signer: TicketSigner,
}

impl TicketIssuer {
    pub fn new(signing_secret: &str) -> Self {
        Self {
            signer: TicketSigner::new(signing_secret.as_bytes()),
        }
    }

    /// Issue the ticket of `registration`, or return the one it already has.
    ///
    /// `registration` must reflect the state locked in the current
    /// transaction. The ticket expires when the event ends.
    pub async fn issue(
        &self,
        conn: &mut PgConnection,
        registration: &Registration,
    ) -> Result<IssueOutcome, TicketError> {
        check_issuable(registration.payment_status)?;

        if let Some(existing) =
            TicketRepository::find_by_registration_in(conn, registration.id).await?
        {
            debug!(registration_id = %registration.id, "Ticket already issued");
            return Ok(IssueOutcome::AlreadyIssued(existing.into()));
        }

        let event = EventRepository::find_by_id_in(conn, registration.event_id)
            .await?
            .ok_or(TicketError::EventNotFound(registration.event_id))?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_ticket_code();
            let payload =
                self.sign(&code, registration.id, registration.event_id, event.ends_at)?;

            let new_ticket = NewTicket {
                registration_id: registration.id,
                event_id: registration.event_id,
                user_id: registration.user_id(),
                ticket_code: &code,
                verification_payload: &payload,
                expires_at: event.ends_at,
            };

            if let Some(ticket) = TicketRepository::insert_if_absent(conn, &new_ticket).await? {
                counter!("tickets_issued_total").increment(1);
                info!(
                    registration_id = %registration.id,
                    event_id = %registration.event_id,
                    ticket_id = %ticket.id,
                    "Ticket issued"
                );
                return Ok(IssueOutcome::Issued(ticket.into()));
            }

            // Nothing inserted: either a concurrent issuer won the registration
            // or the code collided.
            if let Some(existing) =
                TicketRepository::find_by_registration_in(conn, registration.id).await?
            {
                info!(registration_id = %registration.id, "Concurrent issuance detected");
                return Ok(IssueOutcome::AlreadyIssued(existing.into()));
            }

            warn!(
                registration_id = %registration.id,
                attempt = attempt,
                "Ticket code collision, regenerating"
            );
        }

        Err(TicketError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Invalidate the ticket of a refunded registration. Idempotent.
    pub async fn invalidate(
        &self,
        conn: &mut PgConnection,
        registration_id: Uuid,
    ) -> Result<Option<Ticket>, TicketError> {
        let ticket = TicketRepository::invalidate_for_registration(conn, registration_id).await?;
        match &ticket {
            Some(t) => info!(registration_id = %registration_id, ticket_id = %t.id, "Ticket invalidated"),
            None => warn!(registration_id = %registration_id, "No ticket to invalidate"),
        }
        Ok(ticket.map(Into::into))
    }

    /// Check a presented code or payload. Read-only; the answer never says why
    /// a ticket was rejected.
    pub async fn verify(
        &self,
        repo: &TicketRepository,
        request: &VerifyTicketRequest,
        now: DateTime<Utc>,
    ) -> Result<TicketVerification, ApiError> {
        let (code, claims) = match (&request.payload, &request.code) {
            (Some(payload), _) => match self.signer.verify(payload) {
                Ok(claims) => (claims.ticket_code().to_string(), Some((claims, payload))),
                Err(e) => {
                    debug!(error = %e, "Rejected verification payload");
                    return Ok(TicketVerification::invalid());
                }
            },
            (None, Some(code)) => (code.trim().to_uppercase(), None),
            (None, None) => {
                return Err(ApiError::Validation(
                    "Either code or payload is required".into(),
                ))
            }
        };

        if !is_well_formed_ticket_code(&code) {
            return Ok(TicketVerification::invalid());
        }

        let Some(ticket) = repo.find_by_code(&code).await? else {
            return Ok(TicketVerification::invalid());
        };
        let ticket: Ticket = ticket.into();

        if let Some((claims, payload)) = claims {
            if claims.registration_id != ticket.registration_id
                || claims.event_id != ticket.event_id
                || *payload != ticket.verification_payload
            {
                return Ok(TicketVerification::invalid());
            }
        }

        Ok(TicketVerification::for_ticket(&ticket, now))
    }

    fn sign(
        &self,
        code: &str,
        registration_id: Uuid,
        event_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TicketError> {
        let claims = TicketClaims::new(code, registration_id, event_id, expires_at.timestamp());
        Ok(self.signer.sign(&claims)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_signed_payload_decodes_with_same_secret() {
        let issuer = TicketIssuer::new("ticket-secret");
        let registration_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::days(3);
        let code = generate_ticket_code();

        let payload = issuer
            .sign(&code, registration_id, event_id, expires_at)
            .unwrap();
        let claims = TicketSigner::new(b"ticket-secret").verify(&payload).unwrap();

        assert_eq!(claims.ticket_code(), code);
        assert_eq!(claims.registration_id, registration_id);
        assert_eq!(claims.event_id, event_id);
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_signed_payload_rejected_with_other_secret() {
        let issuer = TicketIssuer::new("ticket-secret");
        let payload = issuer
            .sign(
                &generate_ticket_code(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                Utc::now() + Duration::days(1),
            )
            .unwrap();
        assert_eq!(
            TicketSigner::new(b"another-secret").verify(&payload),
            Err(TicketJwtError::InvalidToken)
        );
    }

    #[test]
    fn test_payload_of_ended_event_does_not_verify() {
        let issuer = TicketIssuer::new("ticket-secret");
        let payload = issuer
            .sign(
                &generate_ticket_code(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                Utc::now() - Duration::days(1),
            )
            .unwrap();
        assert_eq!(
            issuer.signer.verify(&payload),
            Err(TicketJwtError::TokenExpired)
        );
    }

    #[test]
    fn test_ticket_error_mapping() {
        let error: ApiError = TicketError::EventNotFound(Uuid::nil()).into();
        assert!(matches!(error, ApiError::NotFound(_)));

        let error: ApiError = TicketError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS).into();
        assert!(matches!(error, ApiError::Internal(_)));

        let error: ApiError =
            TicketError::Signing(TicketJwtError::EncodingError("bad key".into())).into();
        assert!(matches!(error, ApiError::Internal(_)));

        let error: ApiError = TicketError::NotIssuable(IssuePreconditionError::NotTicketable(
            domain::models::PaymentStatus::Pending,
        ))
        .into();
        assert!(matches!(error, ApiError::Unprocessable(_)));
    }
}
