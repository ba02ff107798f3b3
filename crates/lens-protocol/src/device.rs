//! Hardware-side events and connectivity status types.

use serde::{Deserialize, Serialize};

/// Transport connection lifecycle. Owned exclusively by the transport
/// channel; the orchestrator only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Display brightness as reported by the wearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessLevel {
    Auto,
    Percent(u8),
}

impl BrightnessLevel {
    /// Manager-UI label; unknown brightness renders as `"-"` upstream.
    pub fn label(self) -> String {
        match self {
            Self::Auto => "AUTO".to_owned(),
            Self::Percent(value) => format!("{value}%"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifiStatus {
    pub is_connected: bool,
    pub ssid: Option<String>,
    pub signal_strength: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellularStatus {
    pub is_connected: bool,
    pub carrier: Option<String>,
    pub signal_strength: i32,
}

/// Discrete events from the wearable and the phone's own sensors.
///
/// Unordered relative to each other, monotonically timestamped per source;
/// producers enqueue these on the orchestrator's work queue.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    GlassesBattery {
        level: u8,
        charging: bool,
        time_remaining_min: Option<u32>,
    },
    PhoneBattery {
        level: u8,
        charging: bool,
    },
    Brightness {
        level: BrightnessLevel,
    },
    HeadUp,
    HeadDown,
    /// Side-of-frame tap gesture; `count` taps within the gesture window.
    Tap {
        count: u8,
        at_ms: i64,
    },
    ButtonPress {
        button_id: String,
        is_down: bool,
        at_ms: i64,
    },
    WearableConnected {
        model_name: String,
    },
    WearableDisconnected,
    SearchStarted {
        model_name: String,
    },
    SearchStopped,
    Wifi(WifiStatus),
    Cellular(CellularStatus),
    LocationFix {
        lat: f64,
        lng: f64,
    },
}
