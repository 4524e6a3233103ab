//! Event image repository.
//!
//! All primary-flag writes go through [`EventImageRepository::apply_plan`],
//! called with the event row locked.

use domain::models::PrimaryRepair;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::EventImageEntity;
use crate::metrics::QueryTimer;

const IMAGE_COLUMNS: &str = "id, event_id, image_url, display_order, is_primary, created_at";

/// Repository for event image database operations.
#[derive(Clone)]
pub struct EventImageRepository {
    pool: PgPool,
}

impl EventImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the event row, serializing every image-set mutation of the event.
    /// Returns `false` when the event does not exist.
    pub async fn lock_event(conn: &mut PgConnection, event_id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("lock_event_for_images");
        let result = sqlx::query_scalar::<_, Uuid>("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *conn)
            .await;
        timer.record();
        Ok(result?.is_some())
    }

    /// Images of an event ordered by display order.
    pub async fn list_in(
        conn: &mut PgConnection,
        event_id: Uuid,
    ) -> Result<Vec<EventImageEntity>, sqlx::Error> {
        sqlx::query_as::<_, EventImageEntity>(&format!(
            "SELECT {} FROM event_images WHERE event_id = $1 ORDER BY display_order, id",
            IMAGE_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<EventImageEntity>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::list_in(&mut conn, event_id).await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        event_id: Uuid,
        image_url: &str,
        display_order: i32,
        is_primary: bool,
    ) -> Result<EventImageEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_event_image");
        let result = sqlx::query_as::<_, EventImageEntity>(&format!(
            r#"
            INSERT INTO event_images (event_id, image_url, display_order, is_primary)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        ))
        .bind(event_id)
        .bind(image_url)
        .bind(display_order)
        .bind(is_primary)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Delete an image. Returns the deleted row, or `None` if it was not part
    /// of the event.
    pub async fn delete(
        conn: &mut PgConnection,
        event_id: Uuid,
        image_id: Uuid,
    ) -> Result<Option<EventImageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("delete_event_image");
        let result = sqlx::query_as::<_, EventImageEntity>(&format!(
            "DELETE FROM event_images WHERE event_id = $1 AND id = $2 RETURNING {}",
            IMAGE_COLUMNS
        ))
        .bind(event_id)
        .bind(image_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Apply a primary-flag plan. Clears before setting so the partial unique
    /// index never sees two primaries.
    pub async fn apply_plan(
        conn: &mut PgConnection,
        event_id: Uuid,
        plan: &PrimaryRepair,
    ) -> Result<(), sqlx::Error> {
        let PrimaryRepair::Reassign { promote, .. } = plan else {
            return Ok(());
        };

        let timer = QueryTimer::new("apply_primary_image_plan");
        sqlx::query(
            r#"
            UPDATE event_images
            SET is_primary = FALSE
            WHERE event_id = $1 AND is_primary AND id <> $2
            "#,
        )
        .bind(event_id)
        .bind(promote)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            UPDATE event_images
            SET is_primary = TRUE
            WHERE event_id = $1 AND id = $2
            "#,
        )
        .bind(event_id)
        .bind(promote)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(())
    }

    /// Events whose image set does not have exactly one primary.
    pub async fn find_events_violating_primary(&self, limit: i64) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("find_events_violating_primary");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT event_id
            FROM event_images
            GROUP BY event_id
            HAVING COUNT(*) FILTER (WHERE is_primary) <> 1
            ORDER BY event_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
