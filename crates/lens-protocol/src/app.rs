//! Third-party app descriptors and server app-list payload parsing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Package name substituted when a server entry omits one.
pub const UNKNOWN_PACKAGE: &str = "unknown.package";

/// One third-party app as seen by the manager UI.
///
/// Identity is `package_name`. Serializes with the snake_case keys the
/// control surface expects; parsing from the server wire (camelCase keys)
/// goes through [`AppDescriptor::from_wire`] so a malformed field degrades
/// to a default instead of failing the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub package_name: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub description: String,
    pub webhook_url: String,
    pub logo_url: String,
    pub version: String,
    #[serde(rename = "type")]
    pub app_type: String,
    pub is_running: bool,
    pub is_foreground: bool,
}

impl AppDescriptor {
    /// Build a descriptor from one `installedApps` wire entry.
    ///
    /// Missing fields get defaults; `is_running` is membership in the
    /// active-package set from the same payload.
    pub fn from_wire(entry: &Value, active: &HashSet<String>) -> Self {
        let str_or = |key: &str, default: &str| -> String {
            entry
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_owned()
        };
        let package_name = str_or("packageName", UNKNOWN_PACKAGE);
        let is_running = active.contains(&package_name);
        Self {
            display_name: str_or("name", "Unknown App"),
            description: str_or("description", "No description available."),
            webhook_url: str_or("webhookURL", ""),
            logo_url: str_or("logoURL", ""),
            version: str_or("version", ""),
            app_type: str_or("type", "app"),
            is_running,
            is_foreground: false,
            package_name,
        }
    }

    /// Minimal descriptor for an app first observed locally, before the
    /// server directory has ever mentioned it.
    pub fn local_only(package_name: impl Into<String>) -> Self {
        let package_name = package_name.into();
        Self {
            display_name: package_name.clone(),
            description: String::new(),
            webhook_url: String::new(),
            logo_url: String::new(),
            version: String::new(),
            app_type: "app".to_owned(),
            is_running: false,
            is_foreground: false,
            package_name,
        }
    }
}

/// Parsed `installedApps` + `activeAppPackageNames` from a
/// `connection_ack` or `app_state_change` envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppListPayload {
    pub installed_apps: Vec<AppDescriptor>,
    pub active_packages: HashSet<String>,
}

impl AppListPayload {
    /// Extract the app list from an envelope.
    ///
    /// Both arrays are looked up at the top level first, then under a
    /// nested `userSession` object (top level wins). Entries that are not
    /// JSON objects are skipped; objects with missing fields are defaulted.
    pub fn from_value(msg: &Value) -> Self {
        let installed = Self::array_at(msg, "installedApps");
        let active_names = Self::array_at(msg, "activeAppPackageNames");

        let mut active_packages = HashSet::new();
        if let Some(names) = active_names {
            for name in names {
                if let Some(name) = name.as_str()
                    && !name.is_empty()
                {
                    active_packages.insert(name.to_owned());
                }
            }
        }

        let installed_apps = installed
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.is_object())
                    .map(|entry| AppDescriptor::from_wire(entry, &active_packages))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            installed_apps,
            active_packages,
        }
    }

    fn array_at<'a>(msg: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
        msg.get(key)
            .and_then(Value::as_array)
            .or_else(|| {
                msg.get("userSession")
                    .and_then(|session| session.get(key))
                    .and_then(Value::as_array)
            })
    }
}
