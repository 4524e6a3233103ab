//! Registration endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::registration::{
    CreateRegistrationRequest, RegistrationResponse, UpdateAttendeesRequest,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// POST /api/v1/events/:event_id/registrations
///
/// Priced events answer with a checkout URL, free events with the ticket
/// code. A checkout URL can be missing when the provider was unreachable;
/// the registrant retries through the checkout endpoint.
pub async fn create_registration(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    let created = state
        .registrations
        .create(event_id, &request.fields)
        .await?;

    let ticket_code = created.ticket.map(|t| t.ticket_code);
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse::new(
            &created.registration,
            created.checkout_url,
            ticket_code,
        )),
    ))
}

/// GET /api/v1/registrations/:id
pub async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let registration = state.registrations.find(id).await?;
    Ok(Json(RegistrationResponse::new(&registration, None, None)))
}

/// PUT /api/v1/registrations/:id/attendees
pub async fn update_attendees(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAttendeesRequest>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let registration = state
        .registrations
        .update_attendees(id, &request.fields)
        .await?;
    Ok(Json(RegistrationResponse::new(&registration, None, None)))
}

/// POST /api/v1/registrations/:id/checkout
pub async fn begin_checkout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let (registration, checkout_url) = state.registrations.begin_checkout(id).await?;
    Ok(Json(RegistrationResponse::new(
        &registration,
        Some(checkout_url),
        None,
    )))
}
