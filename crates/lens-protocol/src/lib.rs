//! # lens-protocol — OpenLens wire contract
//!
//! Shared types and trait interfaces for the OpenLens phone-resident
//! coordinator: the cloud WebSocket envelope taxonomy, the app descriptor
//! model, device hardware events, the published status snapshot, and the
//! runtime boundary ports the session orchestrator talks through.
//!
//! Intentionally dependency-light (no tokio, no HTTP client) so it can be
//! used as a pure contract crate by transports, UIs, and tests alike.
//!
//! ## Module Overview
//!
//! - [`envelope`] — incoming/outgoing cloud envelopes (tagged by `type`)
//! - [`app`] — `AppDescriptor` + server app-list payload parsing
//! - [`device`] — hardware events, connection state, wifi/cellular status
//! - [`status`] — `StatusSnapshot` published to the control surface
//! - [`notify`] — notification records and server-ranked summaries
//! - [`ports`] — runtime boundary ports (control surface, display,
//!   transcripts, UI polling)
//! - [`error`] — `ProtocolError`

pub mod app;
pub mod device;
pub mod envelope;
pub mod error;
pub mod notify;
pub mod ports;
pub mod status;

pub use app::{AppDescriptor, AppListPayload, UNKNOWN_PACKAGE};
pub use device::{
    BrightnessLevel, CellularStatus, ConnectionState, DeviceEvent, WifiStatus,
};
pub use envelope::{AsrStreamConfig, AsrStreamType, IncomingMessage, OutgoingMessage};
pub use error::ProtocolError;
pub use notify::{NotificationRecord, RankedNotification, sort_by_rank};
pub use ports::{
    ControlSignal, ControlSurfacePort, DisplayPort, NoticeLevel, PollError, PollUpdate,
    TranscriptPort, UiPollPort,
};
pub use status::{GlassesStatus, StatusEnvelope, StatusSnapshot};
