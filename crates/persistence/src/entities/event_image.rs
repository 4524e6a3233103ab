//! Event image entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::event_image::{EventImage, ImageSlot};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the event_images table.
#[derive(Debug, Clone, FromRow)]
pub struct EventImageEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub image_url: String,
    pub display_order: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<EventImageEntity> for EventImage {
    fn from(entity: EventImageEntity) -> Self {
        Self {
            id: entity.id,
            event_id: entity.event_id,
            image_url: entity.image_url,
            display_order: entity.display_order,
            is_primary: entity.is_primary,
            created_at: entity.created_at,
        }
    }
}

impl From<&EventImageEntity> for ImageSlot {
    fn from(entity: &EventImageEntity) -> Self {
        Self {
            id: entity.id,
            display_order: entity.display_order,
            is_primary: entity.is_primary,
        }
    }
}
