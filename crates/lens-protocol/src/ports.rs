//! Boundary ports the session orchestrator talks through.
//!
//! The orchestrator never holds concrete collaborator types; it holds
//! trait objects implementing these ports. Production wires in the real
//! control surface, display bridge, and HTTP poll client; tests wire in
//! recording fakes.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::notify::RankedNotification;
use crate::status::StatusEnvelope;

/// Severity of a human-readable notice pushed to the manager UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// One signal published to control-surface subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    Status(StatusEnvelope),
    Notice { message: String, level: NoticeLevel },
    AuthFailure { reason: String },
}

/// Push-only surface toward the companion manager UI.
pub trait ControlSurfacePort: Send + Sync {
    /// Publish a full, freshly composed status snapshot.
    fn publish_status(&self, envelope: StatusEnvelope);
    /// Surface a human-readable notice.
    fn notify(&self, message: &str, level: NoticeLevel);
    /// Surface an authorization failure from the poll channel.
    fn auth_failure(&self, reason: &str);
}

/// Bridge toward the wearable's display layer.
pub trait DisplayPort: Send + Sync {
    /// Forward a raw `display_event` payload verbatim.
    fn display_event(&self, payload: &Value);
    /// Forward a raw `dashboard_display_event` payload verbatim.
    fn dashboard_event(&self, payload: &Value);
    /// Show the locally composed dashboard text.
    fn show_dashboard(&self, text: &str);
    fn hide_dashboard(&self);
}

/// Sink for speech transcripts relayed from the cloud.
pub trait TranscriptPort: Send + Sync {
    fn interim(&self, payload: &Value);
    fn final_transcript(&self, payload: &Value);
}

/// What one UI poll round produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollUpdate {
    pub notifications: Vec<RankedNotification>,
}

#[derive(Debug, Error)]
pub enum PollError {
    /// HTTP 401 from the poll endpoint; credentials are stale.
    #[error("poll endpoint rejected credentials")]
    Unauthorized,
    #[error("poll request failed: {0}")]
    Failed(String),
}

/// Secondary request/response channel polled on the adaptive interval.
#[async_trait]
pub trait UiPollPort: Send + Sync {
    async fn poll(&self, device_id: &str) -> Result<PollUpdate, PollError>;
}
