//! The published status snapshot.
//!
//! The snapshot is recomputed whole from orchestrator state and atomically
//! replaces the previous one; consumers never see a partially mutated view.
//! Wire form is snake_case, wrapped as `{"status": {...}}`.

use serde::{Deserialize, Serialize};

use crate::app::AppDescriptor;
use crate::device::{CellularStatus, WifiStatus};

/// Connected-wearable detail, or the searching placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlassesStatus {
    Connected {
        model_name: String,
        battery_life: i32,
        /// `"-"` when unknown, `"AUTO"`, or `"NN%"`.
        brightness: String,
    },
    Searching {
        is_searching: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub puck_battery_life: i32,
    pub charging_status: bool,
    pub sensing_enabled: bool,
    pub contextual_dashboard_enabled: bool,
    pub default_wearable: Option<String>,
    pub connected_glasses: Option<GlassesStatus>,
    pub wifi: WifiStatus,
    pub gsm: CellularStatus,
    pub apps: Vec<AppDescriptor>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            puck_battery_life: -1,
            charging_status: false,
            sensing_enabled: true,
            contextual_dashboard_enabled: true,
            default_wearable: None,
            connected_glasses: None,
            wifi: WifiStatus::default(),
            gsm: CellularStatus::default(),
            apps: Vec::new(),
        }
    }
}

/// Wrapper giving the snapshot its `{"status": ...}` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub status: StatusSnapshot,
}

impl From<StatusSnapshot> for StatusEnvelope {
    fn from(status: StatusSnapshot) -> Self {
        Self { status }
    }
}
