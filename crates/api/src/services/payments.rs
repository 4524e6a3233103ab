//! Applying payment triggers to a locked registration.
//!
//! Shared by notification processing, checkout initiation and the checkout
//! expiry job so every status change goes through [`decide`] and carries its
//! ticket side effect in the same transaction.

use domain::models::{
    decide, IssueOutcome, PaymentStatus, PaymentTrigger, Registration, SideEffect, Ticket,
    TransitionDecision,
};
use domain::services::Notification;
use persistence::repositories::RegistrationRepository;
use sqlx::PgConnection;
use tracing::{info, warn};

use super::tickets::{TicketError, TicketIssuer};

/// Result of applying one trigger.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    pub decision: TransitionDecision,
    /// Registration as it stands after the transition.
    pub registration: Registration,
    pub ticket: Option<IssueOutcome>,
    pub invalidated: Option<Ticket>,
}

impl AppliedTransition {
    /// Notification owed to the registrant. Replays and rejected triggers owe
    /// nothing.
    pub fn notification(&self) -> Option<Notification> {
        let TransitionDecision::Apply { to, .. } = self.decision else {
            return None;
        };
        let registration_id = self.registration.id;
        let event_id = self.registration.event_id;

        match to {
            PaymentStatus::Paid => self
                .ticket
                .as_ref()
                .map(|outcome| Notification::RegistrationConfirmed {
                    registration_id,
                    event_id,
                    ticket_code: outcome.ticket().ticket_code.clone(),
                }),
            PaymentStatus::Failed => Some(Notification::PaymentFailed {
                registration_id,
                event_id,
            }),
            PaymentStatus::Refunded => Some(Notification::RefundProcessed {
                registration_id,
                event_id,
            }),
            _ => None,
        }
    }
}

/// Apply `trigger` to `registration`, which must have been locked in this
/// transaction.
pub async fn apply_trigger(
    conn: &mut PgConnection,
    issuer: &TicketIssuer,
    registration: Registration,
    trigger: PaymentTrigger,
    payment_intent_id: Option<&str>,
) -> Result<AppliedTransition, TicketError> {
    let decision = decide(registration.payment_status, trigger);

    let registration = match decision {
        TransitionDecision::Apply { from, to, .. } => {
            let updated = RegistrationRepository::update_payment_status(
                conn,
                registration.id,
                to,
                payment_intent_id,
            )
            .await?;
            info!(
                registration_id = %registration.id,
                from = %from,
                to = %to,
                trigger = %trigger,
                "Payment status changed"
            );
            Registration::try_from(updated)?
        }
        TransitionDecision::AlreadyApplied { state, .. } => {
            info!(
                registration_id = %registration.id,
                state = %state,
                trigger = %trigger,
                "Trigger already applied"
            );
            registration
        }
        TransitionDecision::Illegal { from, trigger } => {
            warn!(
                registration_id = %registration.id,
                from = %from,
                trigger = %trigger,
                "Illegal payment transition rejected"
            );
            registration
        }
    };

    let mut ticket = None;
    let mut invalidated = None;
    match decision.effect() {
        SideEffect::IssueTicket => ticket = Some(issuer.issue(conn, &registration).await?),
        SideEffect::InvalidateTicket => {
            invalidated = issuer.invalidate(conn, registration.id).await?
        }
        SideEffect::None => {}
    }

    Ok(AppliedTransition {
        decision,
        registration,
        ticket,
        invalidated,
    })
}
