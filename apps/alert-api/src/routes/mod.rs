pub mod alerts;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", alerts::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        alerts::submit_alert,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::gateway::events::AlertSubmission,
            crate::gateway::events::ServerMessage,
            health::HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Alerts", description = "Geofenced alert submission"),
    )
)]
pub struct ApiDoc;
