//! Registration lifecycle: creation, attendee changes, checkout and checkout
//! expiry.
//!
//! Every write re-reads the registration under `FOR UPDATE` and validates the
//! attendee fields into an [`AttendeeShape`] before anything is persisted.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::models::registration::RegistrationFields;
use domain::models::{
    validate_format, AttendeeShape, Event, Money, PaymentStatus, PaymentTrigger,
    Registration, Ticket,
};
use domain::services::checkout::checkout_expiry;
use domain::services::{CheckoutProvider, CheckoutRequest, Notification, NotificationDispatcher};
use metrics::counter;
use persistence::repositories::{EventRepository, RegistrationRepository};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::notifications::{notify_after_commit, recipient_for};
use super::payments::apply_trigger;
use super::tickets::TicketIssuer;
use crate::config::PaymentsConfig;
use crate::error::ApiError;

/// Checkout settings taken from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub expiry_hours: i64,
    pub grace_minutes: i32,
}

impl From<&PaymentsConfig> for CheckoutSettings {
    fn from(config: &PaymentsConfig) -> Self {
        Self {
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            expiry_hours: config.checkout_expiry_hours,
            grace_minutes: config.expiry_grace_minutes,
        }
    }
}

/// A newly created registration with whatever the registrant needs next.
#[derive(Debug, Clone)]
pub struct CreatedRegistration {
    pub registration: Registration,
    pub checkout_url: Option<String>,
    pub ticket: Option<Ticket>,
}

#[derive(Clone)]
pub struct RegistrationService {
    pool: PgPool,
    registrations: RegistrationRepository,
    events: EventRepository,
    issuer: TicketIssuer,
    checkout: Arc<dyn CheckoutProvider>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    settings: CheckoutSettings,
}

impl RegistrationService {
    pub fn new(
        pool: PgPool,
        issuer: TicketIssuer,
        checkout: Arc<dyn CheckoutProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            registrations: RegistrationRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            pool,
            issuer,
            checkout,
            dispatcher,
            settings,
        }
    }

    /// Create a registration.
    ///
    /// Free events are settled immediately: the registration is stored as
    /// `not_required` and its ticket is issued in the same transaction. Priced
    /// events start `pending` and get a checkout session.
    pub async fn create(
        &self,
        event_id: Uuid,
        fields: &RegistrationFields,
    ) -> Result<CreatedRegistration, ApiError> {
        let shape = validate_format(fields)?;

        let event: Event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Event {} not found", event_id)))?
            .into();

        if event.has_ended(Utc::now()) {
            return Err(ApiError::Unprocessable(
                "Registration is closed for an event that has ended".into(),
            ));
        }

        let total = price_for(&event, &shape)?;
        let status = PaymentStatus::initial(total.is_some());

        let mut tx = self.pool.begin().await?;
        let entity =
            RegistrationRepository::insert(&mut tx, event_id, &shape, total.as_ref(), status)
                .await?;
        let registration = Registration::try_from(entity)?;

        let ticket = if status == PaymentStatus::NotRequired {
            Some(self.issuer.issue(&mut tx, &registration).await?.into_ticket())
        } else {
            None
        };
        tx.commit().await?;

        counter!("registrations_created_total", "payment_status" => status.as_str()).increment(1);
        info!(
            registration_id = %registration.id,
            event_id = %event_id,
            attendees = shape.attendee_count(),
            payment_status = %status,
            "Registration created"
        );

        if let Some(ticket) = &ticket {
            notify_after_commit(
                &self.pool,
                self.dispatcher.as_ref(),
                &registration,
                Notification::RegistrationConfirmed {
                    registration_id: registration.id,
                    event_id,
                    ticket_code: ticket.ticket_code.clone(),
                },
            )
            .await;
            return Ok(CreatedRegistration {
                registration,
                checkout_url: None,
                ticket: Some(ticket.clone()),
            });
        }

        // The registration is committed; a provider outage only delays the
        // checkout, which the registrant can restart.
        match self.begin_checkout(registration.id).await {
            Ok((registration, checkout_url)) => Ok(CreatedRegistration {
                registration,
                checkout_url: Some(checkout_url),
                ticket: None,
            }),
            Err(e) if e.is_retryable() => {
                warn!(
                    registration_id = %registration.id,
                    error = %e,
                    "Checkout could not be opened at registration time"
                );
                Ok(CreatedRegistration {
                    registration,
                    checkout_url: None,
                    ticket: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Registration, ApiError> {
        let entity = self
            .registrations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Registration {} not found", id)))?;
        Ok(Registration::try_from(entity)?)
    }

    /// Replace the attendee fields of a registration.
    ///
    /// Refunded registrations are frozen. Once paid, or while a checkout for
    /// the current total is open, the number of places cannot change.
    pub async fn update_attendees(
        &self,
        id: Uuid,
        fields: &RegistrationFields,
    ) -> Result<Registration, ApiError> {
        let shape = validate_format(fields)?;

        let mut tx = self.pool.begin().await?;
        let current: Registration = RegistrationRepository::lock_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Registration {} not found", id)))?
            .try_into()?;

        let count_changed = shape.attendee_count() != current.shape.attendee_count();
        match current.payment_status {
            PaymentStatus::Refunded => {
                return Err(ApiError::Conflict(
                    "A refunded registration cannot be changed".into(),
                ))
            }
            PaymentStatus::Paid if count_changed => {
                return Err(ApiError::Conflict(
                    "Cannot change the number of attendees on a paid registration".into(),
                ))
            }
            PaymentStatus::Pending if count_changed && current.checkout_session_id.is_some() => {
                return Err(ApiError::Conflict(
                    "A checkout for the current number of attendees is open".into(),
                ))
            }
            _ => {}
        }

        let total = match current.payment_status {
            PaymentStatus::Pending | PaymentStatus::Failed if count_changed => {
                let event: Event = EventRepository::find_by_id_in(&mut tx, current.event_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("Event {} not found", current.event_id))
                    })?
                    .into();
                price_for(&event, &shape)?
            }
            _ => current.total_price.clone(),
        };

        let updated =
            RegistrationRepository::update_attendees(&mut tx, id, &shape, total.as_ref()).await?;
        tx.commit().await?;

        info!(
            registration_id = %id,
            attendees = shape.attendee_count(),
            "Registration attendees updated"
        );
        Ok(Registration::try_from(updated)?)
    }

    /// Open a checkout session for a `pending` registration without one, or
    /// restart payment for a `failed` one. Returns the checkout URL.
    pub async fn begin_checkout(&self, id: Uuid) -> Result<(Registration, String), ApiError> {
        let registration = self.find(id).await?;
        let now = Utc::now();

        match registration.payment_status {
            PaymentStatus::Pending | PaymentStatus::Failed => {}
            other => {
                return Err(ApiError::Conflict(format!(
                    "Checkout is not available for a registration in status {}",
                    other
                )))
            }
        }
        if registration.payment_status == PaymentStatus::Pending
            && registration.checkout_session_id.is_some()
            && registration.checkout_expires_at.is_some_and(|at| at > now)
        {
            return Err(ApiError::Conflict("A checkout session is already open".into()));
        }

        let amount = registration
            .total_price
            .clone()
            .ok_or_else(|| ApiError::Internal(format!("Registration {} has no total", id)))?;
        let event: Event = self
            .events
            .find_by_id(registration.event_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Event {} not found", registration.event_id)))?
            .into();

        let session = self
            .checkout
            .create_session(CheckoutRequest {
                registration_id: id,
                event_id: event.id,
                event_title: event.title.clone(),
                amount,
                quantity: registration.shape.attendee_count(),
                customer_email: recipient_for(&self.events, &registration).await?,
                success_url: self.settings.success_url.clone(),
                cancel_url: self.settings.cancel_url.clone(),
                expires_at: checkout_expiry(now, self.settings.expiry_hours),
            })
            .await?;

        let mut tx = self.pool.begin().await?;
        let current: Registration = RegistrationRepository::lock_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Registration {} not found", id)))?
            .try_into()?;

        // Someone else moved the registration while the provider was called.
        if current.checkout_session_id != registration.checkout_session_id {
            return Err(ApiError::Conflict(
                "Registration changed while the checkout was being opened".into(),
            ));
        }

        let from = current.payment_status;
        let applied = apply_trigger(
            &mut tx,
            &self.issuer,
            current,
            PaymentTrigger::CheckoutInitiated,
            None,
        )
        .await?;
        if applied.decision.is_illegal() {
            return Err(ApiError::Conflict(
                "Registration changed while the checkout was being opened".into(),
            ));
        }

        let updated = RegistrationRepository::attach_checkout_session(
            &mut tx,
            id,
            &session.session_id,
            session.expires_at,
        )
        .await?;
        tx.commit().await?;

        info!(
            registration_id = %id,
            from = %from,
            session_id = %session.session_id,
            "Checkout session attached"
        );
        Ok((Registration::try_from(updated)?, session.url))
    }

    /// Fail a `pending` registration whose checkout ran out, as if the
    /// provider had reported the expiry. Returns whether it was failed.
    pub async fn expire_checkout(&self, id: Uuid) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await?;
        let Some(entity) = RegistrationRepository::lock_by_id(&mut tx, id).await? else {
            return Ok(false);
        };
        let registration = Registration::try_from(entity)?;

        // Re-check under the lock: a completion or a fresh session may have landed.
        let deadline = registration
            .checkout_expires_at
            .unwrap_or(registration.created_at + Duration::hours(self.settings.expiry_hours))
            + Duration::minutes(i64::from(self.settings.grace_minutes));
        if registration.payment_status != PaymentStatus::Pending || deadline > Utc::now() {
            return Ok(false);
        }

        let applied = apply_trigger(
            &mut tx,
            &self.issuer,
            registration,
            PaymentTrigger::CheckoutExpired,
            None,
        )
        .await?;
        tx.commit().await?;

        if let Some(message) = applied.notification() {
            notify_after_commit(&self.pool, self.dispatcher.as_ref(), &applied.registration, message)
                .await;
        }
        Ok(true)
    }

    /// Expire every overdue checkout in one batch. Returns how many were failed.
    pub async fn expire_stale_checkouts(&self, batch_size: i64) -> Result<usize, ApiError> {
        let unattached_hours = i32::try_from(self.settings.expiry_hours).unwrap_or(i32::MAX);
        let ids = self
            .registrations
            .find_expired_pending(self.settings.grace_minutes, unattached_hours, batch_size)
            .await?;

        let mut expired = 0;
        for id in ids {
            match self.expire_checkout(id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!(registration_id = %id, error = %e, "Checkout expiry failed"),
            }
        }
        Ok(expired)
    }
}

/// Total owed for `shape` at `event`'s price. `None` for free events.
fn price_for(event: &Event, shape: &AttendeeShape) -> Result<Option<Money>, ApiError> {
    if event.is_free() {
        return Ok(None);
    }
    event
        .total_price(shape.attendee_count())
        .map(Some)
        .ok_or_else(|| ApiError::Validation("Total price is out of range".into()))
}
