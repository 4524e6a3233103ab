//! Ticket repository for database operations.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{NewTicket, TicketEntity};
use crate::metrics::QueryTimer;

const TICKET_COLUMNS: &str = r#"
    id, registration_id, event_id, user_id, ticket_code, verification_payload,
    is_valid, document_url, expires_at, invalidated_at, created_at
"#;

/// Repository for ticket database operations.
#[derive(Clone)]
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a ticket unless one conflicts on registration or code.
    ///
    /// `None` means a conflict: either the registration already has a ticket
    /// or the code collided. The caller tells them apart.
    pub async fn insert_if_absent(
        conn: &mut PgConnection,
        ticket: &NewTicket<'_>,
    ) -> Result<Option<TicketEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_ticket");
        let result = sqlx::query_as::<_, TicketEntity>(&format!(
            r#"
            INSERT INTO tickets
                (registration_id, event_id, user_id, ticket_code, verification_payload, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(ticket.registration_id)
        .bind(ticket.event_id)
        .bind(ticket.user_id)
        .bind(ticket.ticket_code)
        .bind(ticket.verification_payload)
        .bind(ticket.expires_at)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Find the ticket of a registration inside a transaction.
    pub async fn find_by_registration_in(
        conn: &mut PgConnection,
        registration_id: Uuid,
    ) -> Result<Option<TicketEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_ticket_by_registration");
        let result = sqlx::query_as::<_, TicketEntity>(&format!(
            "SELECT {} FROM tickets WHERE registration_id = $1",
            TICKET_COLUMNS
        ))
        .bind(registration_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Find a ticket by its printed code.
    pub async fn find_by_code(&self, ticket_code: &str) -> Result<Option<TicketEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_ticket_by_code");
        let result = sqlx::query_as::<_, TicketEntity>(&format!(
            "SELECT {} FROM tickets WHERE ticket_code = $1",
            TICKET_COLUMNS
        ))
        .bind(ticket_code)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Invalidate the ticket of a registration. Keeps the first invalidation
    /// timestamp when called again.
    pub async fn invalidate_for_registration(
        conn: &mut PgConnection,
        registration_id: Uuid,
    ) -> Result<Option<TicketEntity>, sqlx::Error> {
        let timer = QueryTimer::new("invalidate_ticket");
        let result = sqlx::query_as::<_, TicketEntity>(&format!(
            r#"
            UPDATE tickets
            SET is_valid = FALSE,
                invalidated_at = COALESCE(invalidated_at, NOW())
            WHERE registration_id = $1
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(registration_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }
}
