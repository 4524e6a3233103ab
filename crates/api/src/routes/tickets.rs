//! Ticket verification endpoint.

use axum::{extract::State, Json};
use chrono::Utc;
use domain::models::ticket::VerifyTicketRequest;
use domain::models::TicketVerification;
use persistence::repositories::TicketRepository;

use crate::app::AppState;
use crate::error::ApiError;

/// POST /api/v1/tickets/verify
///
/// Answers `{ "valid": false }` for anything unusable without saying why.
pub async fn verify_ticket(
    State(state): State<AppState>,
    Json(request): Json<VerifyTicketRequest>,
) -> Result<Json<TicketVerification>, ApiError> {
    let repo = TicketRepository::new(state.pool.clone());
    let verification = state.tickets.verify(&repo, &request, Utc::now()).await?;
    Ok(Json(verification))
}
