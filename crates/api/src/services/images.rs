//! Event image set maintenance.
//!
//! Every mutation locks the event row first, reads the image set, asks the
//! domain planner what to flip and applies the plan before committing. The
//! partial unique index on primary images rejects anything that slips past.

use domain::models::event_image::{
    new_image_is_primary, next_display_order, plan_after_removal, plan_primary_repair,
    plan_set_primary, AddEventImageRequest, EventImagesResponse, ImageError,
};
use domain::models::{ImageSlot, PrimaryRepair};
use metrics::counter;
use persistence::db::is_unique_violation;
use persistence::entities::EventImageEntity;
use persistence::repositories::EventImageRepository;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

const DISPLAY_ORDER_CONSTRAINT: &str = "uq_event_images_display_order";

#[derive(Clone)]
pub struct EventImageService {
    pool: PgPool,
    images: EventImageRepository,
}

impl EventImageService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            images: EventImageRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn list(&self, event_id: Uuid) -> Result<EventImagesResponse, ApiError> {
        let images = self.images.list_for_event(event_id).await?;
        Ok(respond(event_id, images))
    }

    /// Attach an image. The first image of an event becomes its primary.
    pub async fn add_image(
        &self,
        event_id: Uuid,
        request: &AddEventImageRequest,
    ) -> Result<EventImagesResponse, ApiError> {
        request.validate()?;

        let mut tx = self.pool.begin().await?;
        let slots = slots(&lock_event(&mut tx, event_id).await?);

        let display_order = request
            .display_order
            .unwrap_or_else(|| next_display_order(&slots));
        if slots.iter().any(|s| s.display_order == display_order) {
            return Err(ImageError::DisplayOrderTaken(display_order).into());
        }
        let is_primary = new_image_is_primary(&slots);

        let image = EventImageRepository::insert(
            &mut tx,
            event_id,
            &request.image_url,
            display_order,
            is_primary,
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e, DISPLAY_ORDER_CONSTRAINT) {
                ApiError::from(ImageError::DisplayOrderTaken(display_order))
            } else {
                ApiError::from(e)
            }
        })?;

        let images = EventImageRepository::list_in(&mut tx, event_id).await?;
        tx.commit().await?;

        info!(
            event_id = %event_id,
            image_id = %image.id,
            display_order = display_order,
            is_primary = is_primary,
            "Event image added"
        );
        Ok(respond(event_id, images))
    }

    /// Make `image_id` the sole primary image of the event.
    pub async fn set_primary(
        &self,
        event_id: Uuid,
        image_id: Uuid,
    ) -> Result<EventImagesResponse, ApiError> {
        let mut tx = self.pool.begin().await?;
        let slots = slots(&lock_event(&mut tx, event_id).await?);

        let plan = plan_set_primary(event_id, &slots, image_id)?;
        EventImageRepository::apply_plan(&mut tx, event_id, &plan).await?;

        let images = EventImageRepository::list_in(&mut tx, event_id).await?;
        tx.commit().await?;

        info!(event_id = %event_id, image_id = %image_id, "Primary image set");
        Ok(respond(event_id, images))
    }

    /// Delete an image and re-elect a primary if it was the primary.
    pub async fn remove_image(
        &self,
        event_id: Uuid,
        image_id: Uuid,
    ) -> Result<EventImagesResponse, ApiError> {
        let mut tx = self.pool.begin().await?;
        lock_event(&mut tx, event_id).await?;

        let removed = EventImageRepository::delete(&mut tx, event_id, image_id)
            .await?
            .ok_or(ImageError::NotFound { event_id, image_id })?;

        let remaining = EventImageRepository::list_in(&mut tx, event_id).await?;
        let plan = plan_after_removal(&slots(&remaining));
        EventImageRepository::apply_plan(&mut tx, event_id, &plan).await?;

        let images = if plan.needs_write() {
            EventImageRepository::list_in(&mut tx, event_id).await?
        } else {
            remaining
        };
        tx.commit().await?;

        info!(
            event_id = %event_id,
            image_id = %image_id,
            was_primary = removed.is_primary,
            new_primary = ?plan.primary(),
            "Event image removed"
        );
        Ok(respond(event_id, images))
    }

    /// Restore the one-primary rule for an event. Idempotent.
    pub async fn ensure_invariant(
        &self,
        event_id: Uuid,
    ) -> Result<(PrimaryRepair, EventImagesResponse), ApiError> {
        let mut tx = self.pool.begin().await?;
        let images = lock_event(&mut tx, event_id).await?;

        let plan = plan_primary_repair(&slots(&images));
        let images = if plan.needs_write() {
            EventImageRepository::apply_plan(&mut tx, event_id, &plan).await?;
            counter!("primary_image_repairs_total").increment(1);
            warn!(event_id = %event_id, plan = ?plan, "Primary image invariant repaired");
            EventImageRepository::list_in(&mut tx, event_id).await?
        } else {
            images
        };
        tx.commit().await?;

        Ok((plan, respond(event_id, images)))
    }

    /// Repair every event whose image set has no single primary. Returns the
    /// number of events repaired.
    pub async fn sweep(&self, batch_size: i64) -> Result<usize, ApiError> {
        let event_ids = self.images.find_events_violating_primary(batch_size).await?;
        let mut repaired = 0;

        for event_id in event_ids {
            match self.ensure_invariant(event_id).await {
                Ok((plan, _)) if plan.needs_write() => repaired += 1,
                Ok(_) => {}
                Err(e) => warn!(event_id = %event_id, error = %e, "Primary image repair failed"),
            }
        }
        Ok(repaired)
    }
}

/// Locks the event and returns its images. Missing events are a 404.
async fn lock_event(
    conn: &mut PgConnection,
    event_id: Uuid,
) -> Result<Vec<EventImageEntity>, ApiError> {
    if !EventImageRepository::lock_event(conn, event_id).await? {
        return Err(ApiError::NotFound(format!("Event {} not found", event_id)));
    }
    Ok(EventImageRepository::list_in(conn, event_id).await?)
}

fn slots(images: &[EventImageEntity]) -> Vec<ImageSlot> {
    images.iter().map(ImageSlot::from).collect()
}

fn respond(event_id: Uuid, images: Vec<EventImageEntity>) -> EventImagesResponse {
    let primary_image_id = images.iter().find(|i| i.is_primary).map(|i| i.id);
    EventImagesResponse {
        event_id,
        primary_image_id,
        images: images.into_iter().map(Into::into).collect(),
    }
}
