//! # lens-registry — app state reconciliation and local supervision
//!
//! Two authorities over whether an app is "running":
//!
//! - the cloud's directory, applied wholesale by [`AppRegistry::apply_server_list`];
//! - the local process supervisor, flagged per package through
//!   [`AppRegistry::set_local_running`].
//!
//! The externally visible `is_running` is the OR of the two. An entry is
//! destroyed only when the server list omits it AND no local process
//! supervises it; a locally-running app the server dropped survives until
//! its process stops.
//!
//! [`LocalAppSupervisor`] owns the actual child processes. It is a
//! separate type behind the [`AppSupervisor`] seam so the orchestrator
//! can be tested without spawning anything.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

use lens_protocol::{AppDescriptor, AppListPayload};

#[derive(Debug, Clone, PartialEq)]
struct AppEntry {
    descriptor: AppDescriptor,
    /// Whether the last server directory payload included this package.
    server_listed: bool,
    server_running: bool,
    local_running: bool,
}

/// The reconciled app view, keyed by package name.
///
/// Iteration order is insertion order, so the published `apps` sequence
/// is stable across republications.
#[derive(Debug, Default)]
pub struct AppRegistry {
    entries: IndexMap<String, AppEntry>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the server-derived view with a fresh directory payload.
    ///
    /// Surviving entries keep their `local_running` flag; entries the
    /// server dropped are retained only while locally running. Applying
    /// the same payload twice is a no-op.
    pub fn apply_server_list(&mut self, payload: &AppListPayload) {
        let previous = std::mem::take(&mut self.entries);

        for descriptor in &payload.installed_apps {
            let package = descriptor.package_name.clone();
            let local_running = previous
                .get(&package)
                .is_some_and(|entry| entry.local_running);
            self.entries.insert(
                package.clone(),
                AppEntry {
                    server_listed: true,
                    server_running: payload.active_packages.contains(&package),
                    local_running,
                    descriptor: descriptor.clone(),
                },
            );
        }

        // Locally-supervised apps the server no longer reports.
        for (package, entry) in previous {
            if entry.local_running && !self.entries.contains_key(&package) {
                self.entries.insert(
                    package,
                    AppEntry {
                        server_listed: false,
                        server_running: false,
                        ..entry
                    },
                );
            }
        }
    }

    /// Flag a package as locally running or stopped.
    ///
    /// A package never seen from the server gets a minimal local-only
    /// descriptor. Returns whether the visible state changed.
    pub fn set_local_running(&mut self, package: &str, running: bool) -> bool {
        match self.entries.get_mut(package) {
            Some(entry) => {
                let before = entry.server_running || entry.local_running;
                entry.local_running = running;
                let after = entry.server_running || entry.local_running;
                if !running && !entry.server_listed {
                    // Nothing backs this entry anymore.
                    self.entries.shift_remove(package);
                    return true;
                }
                before != after
            }
            None if running => {
                self.entries.insert(
                    package.to_owned(),
                    AppEntry {
                        descriptor: AppDescriptor::local_only(package),
                        server_listed: false,
                        server_running: false,
                        local_running: true,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Clear every `local_running` flag, returning the packages that had
    /// it set. Entries the server no longer lists are dropped once the
    /// local process was their only backing.
    pub fn stop_all_local(&mut self) -> Vec<String> {
        let stopped: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.local_running)
            .map(|(package, _)| package.clone())
            .collect();
        for package in &stopped {
            if let Some(entry) = self.entries.get_mut(package) {
                entry.local_running = false;
            }
        }
        self.entries
            .retain(|_, entry| entry.server_listed || entry.local_running);
        stopped
    }

    pub fn is_running(&self, package: &str) -> bool {
        self.entries
            .get(package)
            .is_some_and(|entry| entry.server_running || entry.local_running)
    }

    pub fn contains(&self, package: &str) -> bool {
        self.entries.contains_key(package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors as the control surface should see them: `is_running`
    /// is the OR of the two authorities, `is_foreground` tracks local
    /// supervision.
    pub fn visible_apps(&self) -> Vec<AppDescriptor> {
        self.entries
            .values()
            .map(|entry| {
                let mut descriptor = entry.descriptor.clone();
                descriptor.is_running = entry.server_running || entry.local_running;
                descriptor.is_foreground = entry.local_running;
                descriptor
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Errors from the local process supervisor, always scoped to one package.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no launch spec configured for package `{0}`")]
    UnknownPackage(String),
    #[error("failed to launch `{package}`: {source}")]
    Launch {
        package: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stop `{package}`: {source}")]
    Terminate {
        package: String,
        #[source]
        source: std::io::Error,
    },
}

/// How to start one package as a local process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// Seam between the orchestrator and real process management.
#[async_trait]
pub trait AppSupervisor: Send {
    async fn launch(&mut self, package: &str) -> Result<(), SupervisorError>;
    async fn terminate(&mut self, package: &str) -> Result<(), SupervisorError>;
    /// Best-effort stop of everything; per-package failures are logged,
    /// never propagated.
    async fn terminate_all(&mut self);
}

/// Supervises third-party app child processes via `tokio::process`.
#[derive(Debug, Default)]
pub struct LocalAppSupervisor {
    specs: HashMap<String, LaunchSpec>,
    children: HashMap<String, Child>,
}

impl LocalAppSupervisor {
    pub fn new(specs: HashMap<String, LaunchSpec>) -> Self {
        Self {
            specs,
            children: HashMap::new(),
        }
    }

    pub fn is_supervised(&self, package: &str) -> bool {
        self.children.contains_key(package)
    }
}

#[async_trait]
impl AppSupervisor for LocalAppSupervisor {
    #[instrument(skip(self))]
    async fn launch(&mut self, package: &str) -> Result<(), SupervisorError> {
        if self.children.contains_key(package) {
            debug!(package, "already supervised, launch is a no-op");
            return Ok(());
        }
        let spec = self
            .specs
            .get(package)
            .ok_or_else(|| SupervisorError::UnknownPackage(package.to_owned()))?;
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                package: package.to_owned(),
                source,
            })?;
        info!(package, "launched local app process");
        self.children.insert(package.to_owned(), child);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn terminate(&mut self, package: &str) -> Result<(), SupervisorError> {
        let Some(mut child) = self.children.remove(package) else {
            return Ok(());
        };
        child.kill().await.map_err(|source| SupervisorError::Terminate {
            package: package.to_owned(),
            source,
        })?;
        info!(package, "stopped local app process");
        Ok(())
    }

    async fn terminate_all(&mut self) {
        let packages: Vec<String> = self.children.keys().cloned().collect();
        for package in packages {
            if let Err(error) = self.terminate(&package).await {
                warn!(package, %error, "failed to stop local app during sweep");
            }
        }
    }
}
