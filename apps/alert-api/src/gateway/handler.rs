//! Inbound message dispatch: location updates and alert submissions.

use crate::engine::{AlertEngine, ConnectionContext};
use crate::error::{AlertError, ErrorKind};

use super::events::{InboundMessage, ServerMessage};

/// Process one text frame from a session. Always yields exactly one reply.
pub async fn handle_text(engine: &AlertEngine, ctx: &ConnectionContext, text: &str) -> ServerMessage {
    match process(engine, ctx, text).await {
        Ok(reply) => reply,
        Err(err) => {
            match err.kind {
                ErrorKind::InvalidFormat | ErrorKind::Validation => {
                    tracing::debug!(connection_id = %ctx.connection_id, %err, "rejected message");
                }
                _ => {
                    tracing::warn!(connection_id = %ctx.connection_id, %err, "message processing failed");
                }
            }
            ServerMessage::error(&err)
        }
    }
}

async fn process(
    engine: &AlertEngine,
    ctx: &ConnectionContext,
    text: &str,
) -> Result<ServerMessage, AlertError> {
    match InboundMessage::parse(text)? {
        InboundMessage::Location(update) => {
            engine.update_location(ctx, update.coordinate()?).await?;
            Ok(ServerMessage::location_stored())
        }
        InboundMessage::Alert(submission) => {
            let request = submission.into_request()?;
            let outcome = engine.submit_alert(request).await?;
            Ok(ServerMessage::from_outcome(outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::db::{MemoryClaimStore, MemoryLocationIndex};
    use crate::engine::testing::{RecordingGateway, UnreachableStore};
    use crate::gateway::events::{STATUS_BROADCASTED, STATUS_DUPLICATE_SKIPPED};

    fn engine() -> AlertEngine {
        AlertEngine::new(
            Arc::new(MemoryLocationIndex::new()),
            Arc::new(MemoryClaimStore::new()),
            Arc::new(RecordingGateway::new()),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn location_then_alert_round_trip() {
        let engine = engine();
        let device = ConnectionContext::with_id("conn_device");
        let producer = ConnectionContext::with_id("conn_producer");

        let reply = handle_text(&engine, &device, r#"{"latitude": 12.34567, "longitude": 76.54321}"#).await;
        assert_eq!(reply, ServerMessage::location_stored());

        let alert = json!({
            "alert": {"msg": "pothole", "severity": 1},
            "alert_latitude": 12.34567,
            "alert_longitude": 76.54321,
            "class": "1"
        })
        .to_string();

        let first = handle_text(&engine, &producer, &alert).await;
        assert_eq!(first.status.as_deref(), Some(STATUS_BROADCASTED));
        assert_eq!(first.recipients, Some(1));

        let second = handle_text(&engine, &producer, &alert).await;
        assert_eq!(second.status.as_deref(), Some(STATUS_DUPLICATE_SKIPPED));
        assert_eq!(second.key, first.key);
    }

    #[tokio::test]
    async fn invalid_messages_get_an_error_reply() {
        let engine = engine();
        let ctx = ConnectionContext::with_id("conn_a");

        let reply = handle_text(&engine, &ctx, r#"{"foo": 1}"#).await;
        assert_eq!(reply.error.as_deref(), Some("invalid message format"));

        let reply = handle_text(&engine, &ctx, r#"{"latitude": 100.0, "longitude": 1.0}"#).await;
        assert!(reply.error.unwrap().contains("latitude"));
    }

    #[tokio::test]
    async fn store_outage_is_reported_not_swallowed() {
        let engine = AlertEngine::new(
            Arc::new(UnreachableStore),
            Arc::new(UnreachableStore),
            Arc::new(RecordingGateway::new()),
            &Config::default(),
        );
        let ctx = ConnectionContext::with_id("conn_a");

        let reply = handle_text(&engine, &ctx, r#"{"latitude": 1.0, "longitude": 1.0}"#).await;
        assert_eq!(reply.error.as_deref(), Some("alert store unavailable"));
    }
}
