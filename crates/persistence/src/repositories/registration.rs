//! Registration repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::registration::AttendeeShape;
use domain::models::{Money, PaymentStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{PaymentStatusDb, RegistrationEntity};
use crate::metrics::QueryTimer;

const REGISTRATION_COLUMNS: &str = r#"
    id, event_id, user_id, attendee_info, attendees, contact, quantity,
    total_amount_minor, total_currency, payment_status, checkout_session_id,
    payment_intent_id, checkout_expires_at, created_at, updated_at
"#;

/// Column values derived from a validated shape.
struct ShapeColumns {
    user_id: Option<Uuid>,
    attendee_info: Option<serde_json::Value>,
    attendees: Option<serde_json::Value>,
    contact: Option<serde_json::Value>,
    quantity: i32,
}

impl ShapeColumns {
    fn from_shape(shape: &AttendeeShape) -> Result<Self, sqlx::Error> {
        let fields = shape.to_fields();
        Ok(Self {
            user_id: fields.user_id,
            attendee_info: to_json(&fields.attendee_info)?,
            attendees: to_json(&fields.attendees)?,
            contact: to_json(&fields.contact)?,
            quantity: shape.attendee_count(),
        })
    }
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<serde_json::Value>, sqlx::Error> {
    value
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| sqlx::Error::Protocol(format!("attendee fields not encodable: {}", e)))
}

/// Repository for registration database operations.
#[derive(Clone)]
pub struct RegistrationRepository {
    pool: PgPool,
}

impl RegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a registration. Only a validated shape can be stored.
    pub async fn insert(
        conn: &mut PgConnection,
        event_id: Uuid,
        shape: &AttendeeShape,
        total_price: Option<&Money>,
        status: PaymentStatus,
    ) -> Result<RegistrationEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_registration");
        let columns = ShapeColumns::from_shape(shape)?;

        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            INSERT INTO registrations
                (event_id, user_id, attendee_info, attendees, contact, quantity,
                 total_amount_minor, total_currency, payment_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(columns.user_id)
        .bind(columns.attendee_info)
        .bind(columns.attendees)
        .bind(columns.contact)
        .bind(columns.quantity)
        .bind(total_price.map(|p| p.amount_minor))
        .bind(total_price.map(|p| p.currency.clone()))
        .bind(PaymentStatusDb::from(status))
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Find a registration by ID without locking.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_registration_by_id");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE id = $1",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Lock a registration row for the rest of the transaction and return its
    /// current state.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_registration_by_id");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE id = $1 FOR UPDATE",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Lock the registration owning a checkout session.
    pub async fn lock_by_checkout_session(
        conn: &mut PgConnection,
        session_id: &str,
    ) -> Result<Option<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_registration_by_checkout_session");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE checkout_session_id = $1 FOR UPDATE",
            REGISTRATION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Lock the registrations carrying a payment intent.
    ///
    /// Returns every match so callers can reject ambiguous references.
    pub async fn lock_by_payment_intent(
        conn: &mut PgConnection,
        payment_intent_id: &str,
    ) -> Result<Vec<RegistrationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_registration_by_payment_intent");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            "SELECT {} FROM registrations WHERE payment_intent_id = $1 ORDER BY id FOR UPDATE",
            REGISTRATION_COLUMNS
        ))
        .bind(payment_intent_id)
        .fetch_all(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Persist a payment status change. Records the payment intent the first
    /// time the provider reports one.
    pub async fn update_payment_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: PaymentStatus,
        payment_intent_id: Option<&str>,
    ) -> Result<RegistrationEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_registration_payment_status");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            UPDATE registrations
            SET payment_status = $2,
                payment_intent_id = COALESCE(payment_intent_id, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .bind(PaymentStatusDb::from(status))
        .bind(payment_intent_id)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Attach a fresh checkout session. The payment status is left alone.
    pub async fn attach_checkout_session(
        conn: &mut PgConnection,
        id: Uuid,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RegistrationEntity, sqlx::Error> {
        let timer = QueryTimer::new("attach_checkout_session");
        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            UPDATE registrations
            SET checkout_session_id = $2,
                checkout_expires_at = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .bind(session_id)
        .bind(expires_at)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Replace the attendee-related columns with a validated shape.
    pub async fn update_attendees(
        conn: &mut PgConnection,
        id: Uuid,
        shape: &AttendeeShape,
        total_price: Option<&Money>,
    ) -> Result<RegistrationEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_registration_attendees");
        let columns = ShapeColumns::from_shape(shape)?;

        let result = sqlx::query_as::<_, RegistrationEntity>(&format!(
            r#"
            UPDATE registrations
            SET user_id = $2,
                attendee_info = $3,
                attendees = $4,
                contact = $5,
                quantity = $6,
                total_amount_minor = $7,
                total_currency = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .bind(columns.user_id)
        .bind(columns.attendee_info)
        .bind(columns.attendees)
        .bind(columns.contact)
        .bind(columns.quantity)
        .bind(total_price.map(|p| p.amount_minor))
        .bind(total_price.map(|p| p.currency.clone()))
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Pending registrations whose checkout expired more than `grace_minutes`
    /// ago. A registration that never got a session counts as expiring
    /// `unattached_expiry_hours` after creation.
    pub async fn find_expired_pending(
        &self,
        grace_minutes: i32,
        unattached_expiry_hours: i32,
        limit: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("find_expired_pending_registrations");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM registrations
            WHERE payment_status = 'pending'
              AND COALESCE(checkout_expires_at, created_at + make_interval(hours => $2))
                  < NOW() - make_interval(mins => $1)
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(grace_minutes)
        .bind(unattached_expiry_hours)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
