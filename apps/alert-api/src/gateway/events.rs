//! Wire-format messages exchanged with device sessions and producers.

use geoalert_common::Coordinate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::engine::{AlertRequest, SubmissionOutcome, DEFAULT_RADIUS_KM};
use crate::error::AlertError;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

pub const STATUS_CONNECTED: &str = "connected";
pub const STATUS_LOCATION_STORED: &str = "location stored";
pub const STATUS_DUPLICATE_SKIPPED: &str = "duplicate_alert_skipped";
pub const STATUS_BROADCASTED: &str = "alert_broadcasted";

/// Acknowledgement or error sent back for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    fn status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            connection_id: None,
            recipients: None,
            key: None,
            error: None,
        }
    }

    /// `{"status": "connected", "connection_id": ...}`, sent once on accept.
    pub fn connected(connection_id: &str) -> Self {
        Self {
            connection_id: Some(connection_id.to_string()),
            ..Self::status(STATUS_CONNECTED)
        }
    }

    pub fn location_stored() -> Self {
        Self::status(STATUS_LOCATION_STORED)
    }

    pub fn from_outcome(outcome: SubmissionOutcome) -> Self {
        match outcome {
            SubmissionOutcome::Duplicate { key } => Self {
                key: Some(key),
                ..Self::status(STATUS_DUPLICATE_SKIPPED)
            },
            SubmissionOutcome::Broadcast { key, recipients } => Self {
                key: Some(key),
                recipients: Some(recipients),
                ..Self::status(STATUS_BROADCASTED)
            },
        }
    }

    pub fn error(err: &AlertError) -> Self {
        Self {
            status: None,
            connection_id: None,
            recipients: None,
            key: None,
            error: Some(err.message.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// `{"latitude": f64, "longitude": f64}`
#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationUpdate {
    pub fn coordinate(&self) -> Result<Coordinate, AlertError> {
        Ok(Coordinate::new(self.latitude, self.longitude)?)
    }
}

/// Alert submission, accepted from device sessions and the producer HTTP route.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AlertSubmission {
    #[schema(value_type = Object)]
    pub alert: Value,
    pub alert_latitude: f64,
    pub alert_longitude: f64,
    #[serde(default)]
    pub alert_radius_km: Option<f64>,
    /// Grouping tag; producers send either a string or a number.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub class: Option<Value>,
    #[serde(default)]
    pub alert_id: Option<String>,
}

impl AlertSubmission {
    /// Validate the submission into an engine request. No state is touched.
    pub fn into_request(self) -> Result<AlertRequest, AlertError> {
        if self.alert.is_null() {
            return Err(AlertError::validation("alert payload is required"));
        }

        let center = Coordinate::new(self.alert_latitude, self.alert_longitude)?;

        let radius_km = self.alert_radius_km.unwrap_or(DEFAULT_RADIUS_KM);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AlertError::validation("alert_radius_km must be a positive number"));
        }

        let class_id = match self.class {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => return Err(AlertError::validation("class must be a string or a number")),
        };

        Ok(AlertRequest {
            payload: self.alert,
            center,
            radius_km,
            class_id,
            explicit_id: self.alert_id.filter(|id| !id.is_empty()),
        })
    }
}

/// Any message a device session may send.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Alert(AlertSubmission),
    Location(LocationUpdate),
}

impl InboundMessage {
    /// Classify a text frame. A frame carrying `alert` is a submission; one
    /// carrying `latitude`/`longitude` is a location update; anything else,
    /// including wrongly typed fields, is an invalid format.
    pub fn parse(text: &str) -> Result<Self, AlertError> {
        let value: Value = serde_json::from_str(text).map_err(|_| AlertError::invalid_format())?;
        let Some(object) = value.as_object() else {
            return Err(AlertError::invalid_format());
        };

        if object.contains_key("alert") {
            serde_json::from_value(value)
                .map(Self::Alert)
                .map_err(|_| AlertError::invalid_format())
        } else if object.contains_key("latitude") && object.contains_key("longitude") {
            serde_json::from_value(value)
                .map(Self::Location)
                .map_err(|_| AlertError::invalid_format())
        } else {
            Err(AlertError::invalid_format())
        }
    }
}
