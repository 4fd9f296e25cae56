//! Producer endpoint for submitting alerts over HTTP.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::{AlertError, ErrorBody};
use crate::gateway::events::{AlertSubmission, ServerMessage};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/alerts", post(submit_alert))
}

// ---------------------------------------------------------------------------
// POST /api/v1/alerts
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    tag = "Alerts",
    request_body = AlertSubmission,
    responses(
        (status = 200, description = "Alert broadcasted or skipped as a duplicate", body = ServerMessage),
        (status = 400, description = "Malformed or invalid submission", body = ErrorBody),
        (status = 503, description = "Location index or claim store unavailable", body = ErrorBody),
        (status = 504, description = "Submission timed out", body = ErrorBody),
    ),
)]
pub async fn submit_alert(
    State(state): State<AppState>,
    body: Result<Json<AlertSubmission>, JsonRejection>,
) -> Result<Json<ServerMessage>, AlertError> {
    let Json(submission) = body.map_err(|rejection| {
        tracing::debug!(%rejection, "rejected alert submission body");
        AlertError::invalid_format()
    })?;

    let request = submission.into_request()?;
    let outcome = state.engine.submit_alert(request).await?;
    Ok(Json(ServerMessage::from_outcome(outcome)))
}
