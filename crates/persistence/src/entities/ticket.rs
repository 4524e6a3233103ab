//! Ticket entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Ticket;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the tickets table.
#[derive(Debug, Clone, FromRow)]
pub struct TicketEntity {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ticket_code: String,
    pub verification_payload: String,
    pub is_valid: bool,
    pub document_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TicketEntity> for Ticket {
    fn from(entity: TicketEntity) -> Self {
        Self {
            id: entity.id,
            registration_id: entity.registration_id,
            event_id: entity.event_id,
            user_id: entity.user_id,
            ticket_code: entity.ticket_code,
            verification_payload: entity.verification_payload,
            is_valid: entity.is_valid,
            document_url: entity.document_url,
            expires_at: entity.expires_at,
            invalidated_at: entity.invalidated_at,
            created_at: entity.created_at,
        }
    }
}

/// Values for a new ticket row.
#[derive(Debug, Clone)]
pub struct NewTicket<'a> {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ticket_code: &'a str,
    pub verification_payload: &'a str,
    pub expires_at: DateTime<Utc>,
}
