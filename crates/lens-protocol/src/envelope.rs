//! Cloud wire envelopes: outgoing JSON frames and incoming dispatch.
//!
//! Every outgoing frame is a JSON object tagged by `type` and stamped with
//! the wall-clock send time in milliseconds. Incoming frames are parsed
//! into [`IncomingMessage`] by their `type` field; unrecognized types are
//! surfaced as [`IncomingMessage::Unrecognized`] so the caller can log and
//! drop them instead of failing.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::AppListPayload;
use crate::error::ProtocolError;

/// Speech-stream kind requested from the cloud ASR pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsrStreamType {
    Transcription,
    Translation,
}

/// One requested ASR stream, sent inside a `config` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsrStreamConfig {
    pub stream_type: AsrStreamType,
    pub transcribe_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate_language: Option<String>,
}

/// Outgoing JSON envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// First frame after the socket opens; identifies the session user.
    #[serde(rename_all = "camelCase")]
    ConnectionInit { user_id: String },
    /// Voice-activity flag. `status` is the stringified boolean the cloud
    /// expects, not a JSON bool.
    #[serde(rename = "VAD")]
    Vad { status: String },
    Config {
        streams: Vec<AsrStreamConfig>,
    },
    #[serde(rename_all = "camelCase")]
    StartApp {
        package_name: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    StopApp {
        package_name: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    PhoneNotification {
        notification_id: String,
        app: String,
        title: String,
        content: String,
        priority: i32,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    ButtonPress {
        button_id: String,
        press_type: String,
        timestamp: i64,
    },
    HeadPosition {
        position: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    GlassesBatteryUpdate {
        level: u8,
        charging: bool,
        timestamp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining: Option<u32>,
    },
    PhoneBatteryUpdate {
        level: u8,
        charging: bool,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    GlassesConnectionState {
        model_name: String,
        status: String,
        timestamp: i64,
    },
    LocationUpdate {
        lat: f64,
        lng: f64,
        timestamp: i64,
    },
}

impl OutgoingMessage {
    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn connection_init(user_id: impl Into<String>) -> Self {
        Self::ConnectionInit {
            user_id: user_id.into(),
        }
    }

    pub fn vad(active: bool) -> Self {
        Self::Vad {
            status: active.to_string(),
        }
    }

    pub fn start_app(package_name: impl Into<String>) -> Self {
        Self::StartApp {
            package_name: package_name.into(),
            timestamp: Self::now_ms(),
        }
    }

    pub fn stop_app(package_name: impl Into<String>) -> Self {
        Self::StopApp {
            package_name: package_name.into(),
            timestamp: Self::now_ms(),
        }
    }

    pub fn button_press(button_id: impl Into<String>, press_type: impl Into<String>) -> Self {
        Self::ButtonPress {
            button_id: button_id.into(),
            press_type: press_type.into(),
            timestamp: Self::now_ms(),
        }
    }

    pub fn head_position(position: impl Into<String>) -> Self {
        Self::HeadPosition {
            position: position.into(),
            timestamp: Self::now_ms(),
        }
    }

    pub fn glasses_battery(level: u8, charging: bool, time_remaining: Option<u32>) -> Self {
        Self::GlassesBatteryUpdate {
            level,
            charging,
            timestamp: Self::now_ms(),
            time_remaining,
        }
    }

    pub fn phone_battery(level: u8, charging: bool) -> Self {
        Self::PhoneBatteryUpdate {
            level,
            charging,
            timestamp: Self::now_ms(),
        }
    }

    pub fn glasses_connection_state(
        model_name: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::GlassesConnectionState {
            model_name: model_name.into(),
            status: status.into(),
            timestamp: Self::now_ms(),
        }
    }

    pub fn location_update(lat: f64, lng: f64) -> Self {
        Self::LocationUpdate {
            lat,
            lng,
            timestamp: Self::now_ms(),
        }
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Incoming envelope, already dispatched by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Server accepted the session; carries the authoritative app list.
    ConnectionAck(AppListPayload),
    /// Server-side app state changed; carries the refreshed app list.
    AppStateChange(AppListPayload),
    ConnectionError { message: String },
    /// Raw display layout for the wearable; forwarded verbatim.
    DisplayEvent(Value),
    /// Raw dashboard layout for the wearable; forwarded verbatim.
    DashboardDisplayEvent(Value),
    /// Interim (non-final) speech transcript payload.
    Interim(Value),
    /// Final speech transcript payload.
    Final(Value),
    /// Unknown `type`; callers log and drop it.
    Unrecognized { msg_type: String },
}

impl IncomingMessage {
    /// Parse one text frame from the cloud channel.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let msg: Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        let msg_type = msg
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        Ok(match msg_type {
            "connection_ack" => Self::ConnectionAck(AppListPayload::from_value(&msg)),
            "app_state_change" => Self::AppStateChange(AppListPayload::from_value(&msg)),
            "connection_error" => Self::ConnectionError {
                message: msg
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_owned(),
            },
            "display_event" => Self::DisplayEvent(msg),
            "dashboard_display_event" => Self::DashboardDisplayEvent(msg),
            "interim" => Self::Interim(msg),
            "final" => Self::Final(msg),
            other => Self::Unrecognized {
                msg_type: other.to_owned(),
            },
        })
    }
}

/// Extract the transcript text from an `interim`/`final` payload.
pub fn transcript_text(payload: &Value) -> Option<&str> {
    payload.get("text").and_then(Value::as_str)
}

/// Whether a transcript payload is a translation rather than a
/// same-language transcription.
pub fn is_translation(payload: &Value) -> bool {
    payload.get("translateLanguage").is_some()
}
