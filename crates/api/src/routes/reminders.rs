//! Reminder deduplication endpoint.

use axum::{extract::State, Json};
use domain::models::reminder::{TrySendReminderRequest, TrySendReminderResponse};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

/// POST /api/v1/reminders
///
/// Records the reminder and tells the caller whether it may dispatch it.
/// `already_sent` means another sender got there first.
pub async fn try_send_reminder(
    State(state): State<AppState>,
    Json(request): Json<TrySendReminderRequest>,
) -> Result<Json<TrySendReminderResponse>, ApiError> {
    request.validate()?;

    let outcome = state
        .reminders
        .try_send(
            request.event_id,
            request.registration_id,
            request.reminder_type,
            &request.recipient,
        )
        .await?;

    Ok(Json(TrySendReminderResponse {
        outcome,
        should_dispatch: outcome.should_dispatch(),
    }))
}
