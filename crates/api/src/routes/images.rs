//! Event image endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::event_image::{AddEventImageRequest, EventImagesResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Result of an explicit primary-image repair.
#[derive(Debug, Serialize)]
pub struct EnsurePrimaryResponse {
    pub repaired: bool,
    #[serde(flatten)]
    pub images: EventImagesResponse,
}

/// GET /api/v1/events/:event_id/images
pub async fn list_images(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventImagesResponse>, ApiError> {
    Ok(Json(state.images.list(event_id).await?))
}

/// POST /api/v1/events/:event_id/images
pub async fn add_image(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<AddEventImageRequest>,
) -> Result<(StatusCode, Json<EventImagesResponse>), ApiError> {
    let images = state.images.add_image(event_id, &request).await?;
    Ok((StatusCode::CREATED, Json(images)))
}

/// PUT /api/v1/events/:event_id/images/:image_id/primary
pub async fn set_primary(
    State(state): State<AppState>,
    Path((event_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EventImagesResponse>, ApiError> {
    Ok(Json(state.images.set_primary(event_id, image_id).await?))
}

/// DELETE /api/v1/events/:event_id/images/:image_id
pub async fn remove_image(
    State(state): State<AppState>,
    Path((event_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EventImagesResponse>, ApiError> {
    Ok(Json(state.images.remove_image(event_id, image_id).await?))
}

/// POST /api/v1/events/:event_id/images/ensure-primary
pub async fn ensure_primary(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EnsurePrimaryResponse>, ApiError> {
    let (plan, images) = state.images.ensure_invariant(event_id).await?;
    Ok(Json(EnsurePrimaryResponse {
        repaired: plan.needs_write(),
        images,
    }))
}
