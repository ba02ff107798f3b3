//! # lens-session — the session orchestrator
//!
//! One logical consumer: every producer (transport pump, device callbacks,
//! manager commands, timers) enqueues a [`SessionEvent`] on a single
//! bounded queue, and one [`SessionOrchestrator::run`] loop applies them
//! in order. The registry and the status snapshot are owned exclusively by
//! that loop; there is no locking on orchestrator state.
//!
//! Everything observable leaves through ports: the control surface gets
//! full [`StatusEnvelope`]s and notices via [`StatusStreamHub`], the
//! wearable display gets forwarded layouts and the locally composed
//! dashboard, and the cloud gets telemetry envelopes over the outbound
//! channel.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, instrument, warn};

use lens_protocol::envelope;
use lens_protocol::{
    AsrStreamConfig, BrightnessLevel, CellularStatus, ConnectionState, ControlSignal,
    ControlSurfacePort, DeviceEvent, DisplayPort, GlassesStatus, IncomingMessage, NoticeLevel,
    NotificationRecord, OutgoingMessage, PollError, RankedNotification, StatusEnvelope,
    StatusSnapshot, TranscriptPort, UiPollPort, WifiStatus, sort_by_rank,
};
use lens_registry::{AppRegistry, AppSupervisor, SupervisorError};
use lens_transport::{OutboundChannel, TransportEvent};

/// Poll interval while data left the phone within the activity window.
pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Poll interval once the session has gone quiet.
pub const INACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(5_000);
/// Activity window; the boundary itself counts as inactive.
pub const ACTIVITY_WINDOW_MS: i64 = 90_000;
/// Two presses closer than this are one double press.
pub const DOUBLE_PRESS_WINDOW_MS: i64 = 420;
/// Two taps closer than this are one double tap.
pub const DOUBLE_TAP_WINDOW_MS: i64 = 600;
/// A notification younger than this preempts the ranked list on the dashboard.
pub const NOTIFICATION_FRESHNESS_MS: i64 = 5_000;
/// Bounded notification / transcript history depth.
pub const HISTORY_CAPACITY: usize = 64;
/// How often a known location fix is forwarded to the cloud.
pub const LOCATION_INTERVAL: Duration = Duration::from_secs(10);
/// Delay before redialing after the channel drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

const EVENT_QUEUE_DEPTH: usize = 256;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Select the poll interval from the time since data last left the phone.
///
/// Strictly-less-than: at exactly [`ACTIVITY_WINDOW_MS`] the session is
/// already inactive.
pub fn poll_interval(now_ms: i64, last_data_sent_ms: i64) -> Duration {
    if now_ms - last_data_sent_ms < ACTIVITY_WINDOW_MS {
        ACTIVE_POLL_INTERVAL
    } else {
        INACTIVE_POLL_INTERVAL
    }
}

/// Double-press / double-tap debounce.
///
/// The two gesture families keep independent windows and independent
/// last-event timestamps; a press never affects tap detection. A
/// recognized double consumes both events, so a third in the same window
/// starts a new pair.
#[derive(Debug, Default)]
pub struct GestureTracker {
    last_press_ms: Option<i64>,
    last_tap_ms: Option<i64>,
}

impl GestureTracker {
    /// Returns `true` when this press completes a double press.
    pub fn register_press(&mut self, at_ms: i64) -> bool {
        let double = self
            .last_press_ms
            .is_some_and(|last| at_ms - last < DOUBLE_PRESS_WINDOW_MS);
        self.last_press_ms = if double { None } else { Some(at_ms) };
        double
    }

    /// Returns `true` when this tap completes a double tap.
    pub fn register_tap(&mut self, at_ms: i64) -> bool {
        let double = self
            .last_tap_ms
            .is_some_and(|last| at_ms - last < DOUBLE_TAP_WINDOW_MS);
        self.last_tap_ms = if double { None } else { Some(at_ms) };
        double
    }
}

/// Append-ordered notification history with a fixed capacity.
#[derive(Debug)]
pub struct NotificationBuffer {
    entries: VecDeque<NotificationRecord>,
    capacity: usize,
}

impl NotificationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: NotificationRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn latest(&self) -> Option<&NotificationRecord> {
        self.entries.back()
    }

    /// Most-recent-first view, derived at read time.
    pub fn recent(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compose the dashboard text for one render.
///
/// First line is `│ {MMM dd}, {h:mm}, {batt}%`. Below it: the single most
/// recent notification when it is younger than
/// [`NOTIFICATION_FRESHNESS_MS`], otherwise up to two entries from the
/// server-ranked list in ascending rank order.
pub fn compose_dashboard(
    now_ms: i64,
    battery: Option<u8>,
    latest: Option<&NotificationRecord>,
    ranked: &[RankedNotification],
) -> String {
    let batt = battery.map_or_else(|| "-%".to_owned(), |level| format!("{level}%"));
    let header = match DateTime::from_timestamp_millis(now_ms) {
        Some(now) => format!("│ {}, {}, {batt}", now.format("%b %d"), now.format("%-I:%M")),
        None => format!("│ -, -, {batt}"),
    };

    let mut lines = vec![header];
    match latest {
        Some(record) if now_ms - record.received_at_ms < NOTIFICATION_FRESHNESS_MS => {
            if record.title.is_empty() {
                lines.push(record.body.clone());
            } else {
                lines.push(format!("{}: {}", record.title, record.body));
            }
        }
        _ => {
            let mut entries = ranked.to_vec();
            sort_by_rank(&mut entries);
            lines.extend(entries.into_iter().take(2).map(|entry| entry.summary));
        }
    }
    lines.join("\n")
}

/// Directives from the companion manager UI.
#[derive(Debug, Clone)]
pub enum ManagerCommand {
    StartApp(String),
    StopApp(String),
    ConnectWearable { model_name: String },
    DisconnectWearable,
    ForgetWearable,
    SetSensingEnabled(bool),
    SetDashboardEnabled(bool),
    RequestStatus,
    SendVad(bool),
    SendAudioChunk(Vec<u8>),
    ConfigureAsr(Vec<AsrStreamConfig>),
    ForwardNotification(NotificationRecord),
}

/// One unit of work on the orchestrator queue.
#[derive(Debug)]
pub enum SessionEvent {
    Transport(TransportEvent),
    Device(DeviceEvent),
    Command(ManagerCommand),
    Shutdown,
}

/// Cloneable producer side of the orchestrator queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Transport events keep their arrival order; the pump awaits queue
    /// space instead of dropping.
    pub async fn transport(&self, event: TransportEvent) {
        let _ = self.tx.send(SessionEvent::Transport(event)).await;
    }

    pub fn device(&self, event: DeviceEvent) {
        if self.tx.try_send(SessionEvent::Device(event)).is_err() {
            warn!("session queue full, device event dropped");
        }
    }

    pub fn command(&self, command: ManagerCommand) {
        if self.tx.try_send(SessionEvent::Command(command)).is_err() {
            warn!("session queue full, manager command dropped");
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionEvent::Shutdown).await;
    }
}

/// Pump a channel of transport events into the session queue in order.
pub fn bridge_transport(
    handle: SessionHandle,
    mut events: mpsc::Receiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            handle.transport(event).await;
        }
    })
}

/// Broadcast hub for control-surface subscribers.
///
/// Fan-out is push-only: slow subscribers lag and drop, the orchestrator
/// never blocks on them.
#[derive(Debug, Clone)]
pub struct StatusStreamHub {
    sender: broadcast::Sender<ControlSignal>,
}

impl StatusStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn publish(&self, signal: ControlSignal) {
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlSignal> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<ControlSignal> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl ControlSurfacePort for StatusStreamHub {
    fn publish_status(&self, envelope: StatusEnvelope) {
        self.publish(ControlSignal::Status(envelope));
    }

    fn notify(&self, message: &str, level: NoticeLevel) {
        self.publish(ControlSignal::Notice {
            message: message.to_owned(),
            level,
        });
    }

    fn auth_failure(&self, reason: &str) {
        self.publish(ControlSignal::AuthFailure {
            reason: reason.to_owned(),
        });
    }
}

/// Display port that only logs; used where no wearable bridge is wired.
#[derive(Debug, Default, Clone)]
pub struct LogDisplay;

impl DisplayPort for LogDisplay {
    fn display_event(&self, payload: &serde_json::Value) {
        debug!(%payload, "display event forwarded");
    }

    fn dashboard_event(&self, payload: &serde_json::Value) {
        debug!(%payload, "dashboard display event forwarded");
    }

    fn show_dashboard(&self, text: &str) {
        info!(text, "dashboard shown");
    }

    fn hide_dashboard(&self) {
        info!("dashboard hidden");
    }
}

/// Transcript port that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogTranscripts;

impl TranscriptPort for LogTranscripts {
    fn interim(&self, payload: &serde_json::Value) {
        debug!(%payload, "interim transcript");
    }

    fn final_transcript(&self, payload: &serde_json::Value) {
        debug!(%payload, "final transcript");
    }
}

/// Static session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_id: String,
    pub poll_device_id: String,
    /// Wearable to auto-connect at startup, once the session is ready.
    pub default_wearable: Option<String>,
    /// Model names the connect-wearable command accepts.
    pub known_wearables: Vec<String>,
    pub sensing_enabled: bool,
    pub contextual_dashboard_enabled: bool,
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>, poll_device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            poll_device_id: poll_device_id.into(),
            default_wearable: None,
            known_wearables: vec![
                "Even Realities G1".to_owned(),
                "Vuzix Z100".to_owned(),
                "Mentra Mach1".to_owned(),
            ],
            sensing_enabled: true,
            contextual_dashboard_enabled: true,
        }
    }
}

/// Builder wiring the orchestrator to its ports.
pub struct SessionBuilder {
    config: SessionConfig,
    channel: Option<Arc<dyn OutboundChannel>>,
    poll: Option<Arc<dyn UiPollPort>>,
    supervisor: Option<Box<dyn AppSupervisor>>,
    control: Option<Arc<dyn ControlSurfacePort>>,
    display: Option<Arc<dyn DisplayPort>>,
    transcripts: Option<Arc<dyn TranscriptPort>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            channel: None,
            poll: None,
            supervisor: None,
            control: None,
            display: None,
            transcripts: None,
        }
    }

    pub fn channel(mut self, channel: Arc<dyn OutboundChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn poll(mut self, poll: Arc<dyn UiPollPort>) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn supervisor(mut self, supervisor: Box<dyn AppSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn control(mut self, control: Arc<dyn ControlSurfacePort>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn display(mut self, display: Arc<dyn DisplayPort>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn transcripts(mut self, transcripts: Arc<dyn TranscriptPort>) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    pub fn build(self) -> Result<(SessionOrchestrator, SessionHandle)> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let sensing_enabled = self.config.sensing_enabled;
        let dashboard_enabled = self.config.contextual_dashboard_enabled;
        let default_wearable = self.config.default_wearable.clone();
        let orchestrator = SessionOrchestrator {
            config: self.config,
            channel: self.channel.ok_or_else(|| anyhow!("missing channel"))?,
            poll: self.poll.ok_or_else(|| anyhow!("missing poll client"))?,
            supervisor: self
                .supervisor
                .ok_or_else(|| anyhow!("missing app supervisor"))?,
            control: self
                .control
                .ok_or_else(|| anyhow!("missing control surface"))?,
            display: self.display.unwrap_or_else(|| Arc::new(LogDisplay)),
            transcripts: self.transcripts.unwrap_or_else(|| Arc::new(LogTranscripts)),
            events: rx,
            registry: AppRegistry::new(),
            session_ready: false,
            pending: Vec::new(),
            gestures: GestureTracker::default(),
            notifications: NotificationBuffer::new(HISTORY_CAPACITY),
            final_transcripts: VecDeque::new(),
            ranked: Vec::new(),
            last_data_sent_ms: 0,
            last_location: None,
            reconnect_at: None,
            dashboard_visible: false,
            dashboard_enabled,
            sensing_enabled,
            default_wearable,
            glasses_model: None,
            glasses_battery: None,
            glasses_brightness: None,
            phone_battery: None,
            phone_charging: false,
            searching: false,
            wifi: WifiStatus::default(),
            gsm: CellularStatus::default(),
        };
        Ok((orchestrator, SessionHandle { tx }))
    }
}

/// The session state orchestrator.
pub struct SessionOrchestrator {
    config: SessionConfig,
    channel: Arc<dyn OutboundChannel>,
    poll: Arc<dyn UiPollPort>,
    supervisor: Box<dyn AppSupervisor>,
    control: Arc<dyn ControlSurfacePort>,
    display: Arc<dyn DisplayPort>,
    transcripts: Arc<dyn TranscriptPort>,
    events: mpsc::Receiver<SessionEvent>,

    registry: AppRegistry,
    session_ready: bool,
    pending: Vec<ManagerCommand>,
    gestures: GestureTracker,
    notifications: NotificationBuffer,
    final_transcripts: VecDeque<String>,
    ranked: Vec<RankedNotification>,
    last_data_sent_ms: i64,
    last_location: Option<(f64, f64)>,
    reconnect_at: Option<Instant>,
    dashboard_visible: bool,
    dashboard_enabled: bool,
    sensing_enabled: bool,
    default_wearable: Option<String>,
    glasses_model: Option<String>,
    glasses_battery: Option<u8>,
    glasses_brightness: Option<BrightnessLevel>,
    phone_battery: Option<u8>,
    phone_charging: bool,
    searching: bool,
    wifi: WifiStatus,
    gsm: CellularStatus,
}

impl SessionOrchestrator {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Drive the session until shutdown.
    ///
    /// Owns every timer: the self-rescheduling UI poll, the periodic
    /// location forward, and the pending reconnect deadline. They all die
    /// with the loop, then the channel closes, then the registry clears.
    #[instrument(skip(self), fields(user_id = %self.config.user_id))]
    pub async fn run(mut self) -> Result<()> {
        if let Some(model) = self.default_wearable.clone() {
            self.pending
                .push(ManagerCommand::ConnectWearable { model_name: model });
        }
        self.channel
            .connect()
            .await
            .context("initial cloud connect")?;

        let mut location_timer = time::interval(LOCATION_INTERVAL);
        location_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll_at = Instant::now() + self.current_poll_interval();

        loop {
            let reconnect_deadline = self.reconnect_at.unwrap_or_else(Instant::now);
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            if !self.handle_event(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = time::sleep_until(poll_at) => {
                    self.run_poll().await;
                    poll_at = Instant::now() + self.current_poll_interval();
                }
                _ = location_timer.tick() => {
                    self.forward_location();
                }
                _ = time::sleep_until(reconnect_deadline), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    if let Err(error) = self.channel.connect().await {
                        warn!(%error, "reconnect failed");
                    }
                }
            }
        }

        info!("session loop stopped, tearing down");
        self.channel.disconnect().await;
        self.supervisor.terminate_all().await;
        self.registry.clear();
        Ok(())
    }

    fn current_poll_interval(&self) -> Duration {
        poll_interval(now_ms(), self.last_data_sent_ms)
    }

    /// Apply one event. Returns `false` when the loop should stop.
    async fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Transport(event) => self.handle_transport(event).await,
            SessionEvent::Device(event) => self.handle_device(event).await,
            SessionEvent::Command(command) => self.handle_command(command).await,
            SessionEvent::Shutdown => return false,
        }
        true
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.reconnect_at = None;
                // The handshake identifies the session; it is not telemetry
                // and does not mark activity.
                match OutgoingMessage::connection_init(&self.config.user_id).to_json() {
                    Ok(text) => self.channel.send_text(text),
                    Err(error) => warn!(%error, "failed to encode handshake"),
                }
                info!("cloud channel open, handshake sent");
            }
            TransportEvent::Message(text) => match IncomingMessage::parse(&text) {
                Ok(message) => self.handle_incoming(message).await,
                Err(error) => warn!(%error, "dropping malformed cloud frame"),
            },
            TransportEvent::Binary(bytes) => {
                debug!(len = bytes.len(), "ignoring unexpected binary frame");
            }
            TransportEvent::Failed(reason) => {
                self.session_ready = false;
                self.control
                    .notify(&format!("Cloud connection error: {reason}"), NoticeLevel::Error);
                self.reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
            }
            TransportEvent::Closed => {
                self.session_ready = false;
                self.reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
                debug!("cloud channel closed, reconnect scheduled");
            }
        }
    }

    async fn handle_incoming(&mut self, message: IncomingMessage) {
        match message {
            IncomingMessage::ConnectionAck(payload) => {
                // Full resynchronization point: the server view is replaced
                // wholesale, then queued directives flush exactly once.
                self.registry.apply_server_list(&payload);
                let newly_ready = !self.session_ready;
                self.session_ready = true;
                info!(apps = self.registry.len(), "session acknowledged by cloud");
                if newly_ready {
                    self.flush_pending().await;
                }
                self.publish_status();
            }
            IncomingMessage::AppStateChange(payload) => {
                self.registry.apply_server_list(&payload);
                self.publish_status();
            }
            IncomingMessage::ConnectionError { message } => {
                self.control.notify(&message, NoticeLevel::Error);
            }
            IncomingMessage::DisplayEvent(payload) => {
                self.display.display_event(&payload);
            }
            IncomingMessage::DashboardDisplayEvent(payload) => {
                self.display.dashboard_event(&payload);
            }
            IncomingMessage::Interim(payload) => {
                self.transcripts.interim(&payload);
            }
            IncomingMessage::Final(payload) => {
                self.transcripts.final_transcript(&payload);
                if !envelope::is_translation(&payload)
                    && let Some(text) = envelope::transcript_text(&payload)
                {
                    if self.final_transcripts.len() == HISTORY_CAPACITY {
                        self.final_transcripts.pop_front();
                    }
                    self.final_transcripts.push_back(text.to_owned());
                }
            }
            IncomingMessage::Unrecognized { msg_type } => {
                debug!(msg_type, "dropping unrecognized cloud envelope");
            }
        }
    }

    async fn handle_device(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::GlassesBattery {
                level,
                charging,
                time_remaining_min,
            } => {
                self.glasses_battery = Some(level);
                self.send_envelope(OutgoingMessage::glasses_battery(
                    level,
                    charging,
                    time_remaining_min,
                ));
                self.publish_status();
            }
            DeviceEvent::PhoneBattery { level, charging } => {
                self.phone_battery = Some(level);
                self.phone_charging = charging;
                self.send_envelope(OutgoingMessage::phone_battery(level, charging));
                self.publish_status();
            }
            DeviceEvent::Brightness { level } => {
                self.glasses_brightness = Some(level);
                self.publish_status();
            }
            DeviceEvent::HeadUp => {
                if self.dashboard_enabled {
                    self.refresh_dashboard();
                }
                self.send_envelope(OutgoingMessage::head_position("up"));
            }
            DeviceEvent::HeadDown => {
                self.hide_dashboard();
                self.send_envelope(OutgoingMessage::head_position("down"));
            }
            DeviceEvent::Tap { count, at_ms } => {
                if matches!(count, 2 | 3) || self.gestures.register_tap(at_ms) {
                    self.toggle_dashboard();
                }
            }
            DeviceEvent::ButtonPress {
                button_id,
                is_down,
                at_ms,
            } => {
                if is_down {
                    let press_type = if self.gestures.register_press(at_ms) {
                        "double"
                    } else {
                        "single"
                    };
                    self.send_envelope(OutgoingMessage::button_press(button_id, press_type));
                }
            }
            DeviceEvent::WearableConnected { model_name } => {
                self.searching = false;
                self.glasses_model = Some(model_name.clone());
                self.send_envelope(OutgoingMessage::glasses_connection_state(
                    model_name, "CONNECTED",
                ));
                self.publish_status();
            }
            DeviceEvent::WearableDisconnected => {
                self.wearable_down().await;
            }
            DeviceEvent::SearchStarted { model_name } => {
                debug!(model_name, "searching for wearable");
                self.searching = true;
                self.publish_status();
            }
            DeviceEvent::SearchStopped => {
                self.searching = false;
                self.publish_status();
            }
            DeviceEvent::Wifi(status) => {
                self.wifi = status;
                self.publish_status();
            }
            DeviceEvent::Cellular(status) => {
                self.gsm = status;
                self.publish_status();
            }
            DeviceEvent::LocationFix { lat, lng } => {
                self.last_location = Some((lat, lng));
            }
        }
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::StartApp(package) => self.start_app(package).await,
            ManagerCommand::StopApp(package) => self.stop_app(package).await,
            ManagerCommand::ConnectWearable { model_name } => {
                if !self.config.known_wearables.iter().any(|m| m == &model_name) {
                    self.control.notify(
                        &format!("Incorrect model name: {model_name}"),
                        NoticeLevel::Error,
                    );
                    return;
                }
                self.default_wearable = Some(model_name);
                self.searching = true;
                self.publish_status();
            }
            ManagerCommand::DisconnectWearable => {
                self.wearable_down().await;
            }
            ManagerCommand::ForgetWearable => {
                self.default_wearable = None;
                self.wearable_down().await;
            }
            ManagerCommand::SetSensingEnabled(enabled) => {
                self.sensing_enabled = enabled;
                self.publish_status();
            }
            ManagerCommand::SetDashboardEnabled(enabled) => {
                self.dashboard_enabled = enabled;
                if !enabled {
                    self.hide_dashboard();
                }
                self.publish_status();
            }
            ManagerCommand::RequestStatus => {
                self.publish_status();
            }
            ManagerCommand::SendVad(active) => {
                if self.sensing_enabled {
                    self.send_envelope(OutgoingMessage::vad(active));
                }
            }
            ManagerCommand::SendAudioChunk(bytes) => {
                if self.sensing_enabled {
                    self.channel.send_binary(bytes);
                    if self.channel.state() == ConnectionState::Connected {
                        self.last_data_sent_ms = now_ms();
                    }
                }
            }
            ManagerCommand::ConfigureAsr(streams) => {
                self.send_envelope(OutgoingMessage::Config { streams });
            }
            ManagerCommand::ForwardNotification(record) => {
                self.send_envelope(OutgoingMessage::PhoneNotification {
                    notification_id: record.id.clone(),
                    app: record.app.clone(),
                    title: record.title.clone(),
                    content: record.body.clone(),
                    priority: record.priority,
                    timestamp: now_ms(),
                });
                self.notifications.push(record);
            }
        }
    }

    async fn start_app(&mut self, package: String) {
        if self.glasses_model.is_none() {
            self.control
                .notify("Must connect glasses to start an app", NoticeLevel::Error);
            return;
        }
        if !self.session_ready {
            debug!(package, "session not ready, queueing start directive");
            self.pending.push(ManagerCommand::StartApp(package));
            return;
        }
        self.send_envelope(OutgoingMessage::start_app(&package));
        match self.supervisor.launch(&package).await {
            Ok(()) => {
                self.registry.set_local_running(&package, true);
            }
            Err(SupervisorError::UnknownPackage(_)) => {
                // Cloud-only app, nothing to supervise locally.
                debug!(package, "no local launch spec");
            }
            Err(error) => {
                self.control.notify(
                    &format!("Error starting app {package}: {error}"),
                    NoticeLevel::Error,
                );
                let _ = self.supervisor.terminate(&package).await;
                self.registry.set_local_running(&package, false);
                // The cloud was already told to start it; walk that back so
                // its active set matches what the UI shows.
                self.send_envelope(OutgoingMessage::stop_app(&package));
            }
        }
        self.publish_status();
    }

    async fn stop_app(&mut self, package: String) {
        self.send_envelope(OutgoingMessage::stop_app(&package));
        if let Err(error) = self.supervisor.terminate(&package).await {
            warn!(package, %error, "failed to stop local app process");
            self.control.notify(
                &format!("Error stopping app {package}: {error}"),
                NoticeLevel::Error,
            );
        }
        self.registry.set_local_running(&package, false);
        self.publish_status();
    }

    /// Wearable is gone: fail safe by stopping every locally-running app,
    /// then republish so the UI reflects it immediately.
    async fn wearable_down(&mut self) {
        if let Some(model) = self.glasses_model.take() {
            self.send_envelope(OutgoingMessage::glasses_connection_state(
                model,
                "DISCONNECTED",
            ));
        }
        self.searching = false;
        self.glasses_battery = None;
        self.glasses_brightness = None;
        self.hide_dashboard();
        self.supervisor.terminate_all().await;
        let stopped = self.registry.stop_all_local();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "stopped all local apps on wearable disconnect");
        }
        self.publish_status();
    }

    async fn flush_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for command in pending {
            self.handle_command(command).await;
        }
    }

    async fn run_poll(&mut self) {
        match self.poll.poll(&self.config.poll_device_id).await {
            Ok(update) => {
                let mut entries = update.notifications;
                sort_by_rank(&mut entries);
                self.ranked = entries;
            }
            Err(PollError::Unauthorized) => {
                self.control.auth_failure("poll endpoint rejected credentials");
            }
            Err(error) => {
                warn!(%error, "ui poll failed");
            }
        }
    }

    fn forward_location(&mut self) {
        if let Some((lat, lng)) = self.last_location
            && self.channel.state() == ConnectionState::Connected
        {
            self.send_envelope(OutgoingMessage::location_update(lat, lng));
        }
    }

    fn refresh_dashboard(&mut self) {
        let text = compose_dashboard(
            now_ms(),
            self.glasses_battery,
            self.notifications.latest(),
            &self.ranked,
        );
        self.display.show_dashboard(&text);
        self.dashboard_visible = true;
    }

    fn hide_dashboard(&mut self) {
        if self.dashboard_visible {
            self.display.hide_dashboard();
            self.dashboard_visible = false;
        }
    }

    fn toggle_dashboard(&mut self) {
        if !self.dashboard_enabled {
            return;
        }
        if self.dashboard_visible {
            self.hide_dashboard();
        } else {
            self.refresh_dashboard();
        }
    }

    /// Queue a telemetry envelope; marks the activity window only when the
    /// channel is connected, since a disconnected send goes nowhere.
    fn send_envelope(&mut self, message: OutgoingMessage) {
        match message.to_json() {
            Ok(text) => {
                self.channel.send_text(text);
                if self.channel.state() == ConnectionState::Connected {
                    self.last_data_sent_ms = now_ms();
                }
            }
            Err(error) => warn!(%error, "failed to encode outgoing envelope"),
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let connected_glasses = if let Some(model) = &self.glasses_model {
            Some(GlassesStatus::Connected {
                model_name: model.clone(),
                battery_life: self.glasses_battery.map_or(-1, i32::from),
                brightness: self
                    .glasses_brightness
                    .map_or_else(|| "-".to_owned(), BrightnessLevel::label),
            })
        } else if self.searching {
            Some(GlassesStatus::Searching { is_searching: true })
        } else {
            None
        };
        StatusSnapshot {
            puck_battery_life: self.phone_battery.map_or(-1, i32::from),
            charging_status: self.phone_charging,
            sensing_enabled: self.sensing_enabled,
            contextual_dashboard_enabled: self.dashboard_enabled,
            default_wearable: self.default_wearable.clone(),
            connected_glasses,
            wifi: self.wifi.clone(),
            gsm: self.gsm.clone(),
            apps: self.registry.visible_apps(),
        }
    }

    fn publish_status(&self) {
        self.control.publish_status(StatusEnvelope::from(self.snapshot()));
    }

    /// Final, non-translated transcript texts in arrival order, bounded by
    /// [`HISTORY_CAPACITY`]. Used by the manager UI for backfill.
    pub fn recent_transcripts(&self) -> impl Iterator<Item = &str> {
        self.final_transcripts.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use lens_protocol::{
        ConnectionState, ControlSignal, ControlSurfacePort, DeviceEvent, DisplayPort,
        NoticeLevel, NotificationRecord, PollError, PollUpdate, RankedNotification,
        StatusEnvelope, UiPollPort,
    };
    use lens_registry::{AppSupervisor, SupervisorError};
    use lens_transport::{OutboundChannel, TransportError, TransportEvent};

    use super::{
        ACTIVE_POLL_INTERVAL, GestureTracker, INACTIVE_POLL_INTERVAL, ManagerCommand,
        NOTIFICATION_FRESHNESS_MS, NotificationBuffer, SessionConfig, SessionEvent,
        SessionOrchestrator, compose_dashboard, poll_interval,
    };

    struct FakeChannel {
        sent: Mutex<Vec<String>>,
        binary: Mutex<Vec<Vec<u8>>>,
        state: Mutex<ConnectionState>,
    }

    impl Default for FakeChannel {
        fn default() -> Self {
            Self {
                sent: Mutex::default(),
                binary: Mutex::default(),
                state: Mutex::new(ConnectionState::Connected),
            }
        }
    }

    impl FakeChannel {
        fn sent_types(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter_map(|text| {
                    let value: Value = serde_json::from_str(text).ok()?;
                    Some(value.get("type")?.as_str()?.to_owned())
                })
                .collect()
        }
    }

    #[async_trait]
    impl OutboundChannel for FakeChannel {
        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&self) {}

        fn send_text(&self, text: String) {
            self.sent.lock().push(text);
        }

        fn send_binary(&self, bytes: Vec<u8>) {
            self.binary.lock().push(bytes);
        }

        fn state(&self) -> ConnectionState {
            *self.state.lock()
        }
    }

    #[derive(Default)]
    struct FakeControl {
        signals: Mutex<Vec<ControlSignal>>,
    }

    impl FakeControl {
        fn notices(&self) -> Vec<String> {
            self.signals
                .lock()
                .iter()
                .filter_map(|signal| match signal {
                    ControlSignal::Notice { message, .. } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }

        fn last_status(&self) -> Option<StatusEnvelope> {
            self.signals
                .lock()
                .iter()
                .rev()
                .find_map(|signal| match signal {
                    ControlSignal::Status(envelope) => Some(envelope.clone()),
                    _ => None,
                })
        }

        fn auth_failures(&self) -> usize {
            self.signals
                .lock()
                .iter()
                .filter(|signal| matches!(signal, ControlSignal::AuthFailure { .. }))
                .count()
        }
    }

    impl ControlSurfacePort for FakeControl {
        fn publish_status(&self, envelope: StatusEnvelope) {
            self.signals.lock().push(ControlSignal::Status(envelope));
        }

        fn notify(&self, message: &str, level: NoticeLevel) {
            self.signals.lock().push(ControlSignal::Notice {
                message: message.to_owned(),
                level,
            });
        }

        fn auth_failure(&self, reason: &str) {
            self.signals.lock().push(ControlSignal::AuthFailure {
                reason: reason.to_owned(),
            });
        }
    }

    #[derive(Default)]
    struct FakeDisplay {
        shown: Mutex<Vec<String>>,
        hidden: Mutex<usize>,
    }

    impl DisplayPort for FakeDisplay {
        fn display_event(&self, _payload: &Value) {}

        fn dashboard_event(&self, _payload: &Value) {}

        fn show_dashboard(&self, text: &str) {
            self.shown.lock().push(text.to_owned());
        }

        fn hide_dashboard(&self) {
            *self.hidden.lock() += 1;
        }
    }

    struct FakeSupervisor {
        launched: Arc<Mutex<Vec<String>>>,
        terminated: Arc<Mutex<Vec<String>>>,
        failing: HashSet<String>,
    }

    impl FakeSupervisor {
        fn new(failing: &[&str]) -> Self {
            Self {
                launched: Arc::new(Mutex::new(Vec::new())),
                terminated: Arc::new(Mutex::new(Vec::new())),
                failing: failing.iter().map(|p| (*p).to_owned()).collect(),
            }
        }
    }

    #[async_trait]
    impl AppSupervisor for FakeSupervisor {
        async fn launch(&mut self, package: &str) -> Result<(), SupervisorError> {
            if self.failing.contains(package) {
                return Err(SupervisorError::Launch {
                    package: package.to_owned(),
                    source: std::io::Error::other("boom"),
                });
            }
            self.launched.lock().push(package.to_owned());
            Ok(())
        }

        async fn terminate(&mut self, package: &str) -> Result<(), SupervisorError> {
            self.terminated.lock().push(package.to_owned());
            Ok(())
        }

        async fn terminate_all(&mut self) {
            self.terminated.lock().push("*".to_owned());
        }
    }

    struct FakePoll {
        unauthorized: bool,
    }

    #[async_trait]
    impl UiPollPort for FakePoll {
        async fn poll(&self, _device_id: &str) -> Result<PollUpdate, PollError> {
            if self.unauthorized {
                Err(PollError::Unauthorized)
            } else {
                Ok(PollUpdate::default())
            }
        }
    }

    struct Harness {
        orchestrator: SessionOrchestrator,
        channel: Arc<FakeChannel>,
        control: Arc<FakeControl>,
        display: Arc<FakeDisplay>,
        launched: Arc<Mutex<Vec<String>>>,
        terminated: Arc<Mutex<Vec<String>>>,
    }

    fn harness() -> Harness {
        harness_with(FakeSupervisor::new(&[]), false)
    }

    fn harness_with(supervisor: FakeSupervisor, unauthorized_poll: bool) -> Harness {
        let launched = supervisor.launched.clone();
        let terminated = supervisor.terminated.clone();
        let channel = Arc::new(FakeChannel::default());
        let control = Arc::new(FakeControl::default());
        let display = Arc::new(FakeDisplay::default());
        let (orchestrator, _handle) =
            SessionOrchestrator::builder(SessionConfig::new("user-1", "device-1"))
                .channel(channel.clone())
                .poll(Arc::new(FakePoll {
                    unauthorized: unauthorized_poll,
                }))
                .supervisor(Box::new(supervisor))
                .control(control.clone())
                .display(display.clone())
                .build()
                .unwrap();
        Harness {
            orchestrator,
            channel,
            control,
            display,
            launched,
            terminated,
        }
    }

    fn ack_frame(installed: &[&str], active: &[&str]) -> SessionEvent {
        let frame = json!({
            "type": "connection_ack",
            "installedApps": installed
                .iter()
                .map(|p| json!({"packageName": p}))
                .collect::<Vec<_>>(),
            "activeAppPackageNames": active,
        });
        SessionEvent::Transport(TransportEvent::Message(frame.to_string()))
    }

    fn wearable_connected() -> SessionEvent {
        SessionEvent::Device(DeviceEvent::WearableConnected {
            model_name: "Even Realities G1".to_owned(),
        })
    }

    #[test]
    fn poll_interval_boundary_is_inactive() {
        assert_eq!(poll_interval(89_999, 0), ACTIVE_POLL_INTERVAL);
        assert_eq!(poll_interval(90_000, 0), INACTIVE_POLL_INTERVAL);
        assert_eq!(poll_interval(100_000, 50_000), ACTIVE_POLL_INTERVAL);
    }

    #[test]
    fn gesture_windows_are_strict_and_independent() {
        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_press(0));
        assert!(gestures.register_press(400));

        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_press(0));
        assert!(!gestures.register_press(500));

        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_tap(0));
        assert!(gestures.register_tap(500));

        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_tap(0));
        assert!(!gestures.register_tap(600));

        // A tap between two presses does not disturb press detection.
        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_press(0));
        assert!(!gestures.register_tap(100));
        assert!(gestures.register_press(300));
    }

    #[test]
    fn double_gesture_consumes_both_events() {
        let mut gestures = GestureTracker::default();
        assert!(!gestures.register_press(0));
        assert!(gestures.register_press(100));
        assert!(!gestures.register_press(200));
    }

    #[test]
    fn notification_buffer_evicts_oldest() {
        let mut buffer = NotificationBuffer::new(2);
        for i in 0..3 {
            buffer.push(NotificationRecord {
                id: i.to_string(),
                app: "app".to_owned(),
                title: String::new(),
                body: format!("body {i}"),
                priority: 0,
                received_at_ms: i,
            });
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest().unwrap().id, "2");
        let ids: Vec<_> = buffer.recent().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn dashboard_header_and_fresh_notification() {
        // 2026-03-05 14:30 UTC
        let now_ms = 1_772_721_000_000;
        let record = NotificationRecord {
            id: "n1".to_owned(),
            app: "chat".to_owned(),
            title: "Ada".to_owned(),
            body: "lunch?".to_owned(),
            priority: 0,
            received_at_ms: now_ms - 1_000,
        };
        let ranked = vec![RankedNotification {
            summary: "Meeting at 3".to_owned(),
            rank: Some(1),
        }];

        let text = compose_dashboard(now_ms, Some(84), Some(&record), &ranked);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "│ Mar 05, 2:30, 84%");
        assert_eq!(lines[1], "Ada: lunch?");
    }

    #[test]
    fn dashboard_falls_back_to_two_ranked_entries() {
        let now_ms = 1_772_721_000_000;
        let record = NotificationRecord {
            id: "n1".to_owned(),
            app: "chat".to_owned(),
            title: "Ada".to_owned(),
            body: "old news".to_owned(),
            priority: 0,
            received_at_ms: now_ms - NOTIFICATION_FRESHNESS_MS,
        };
        let ranked = vec![
            RankedNotification {
                summary: "second".to_owned(),
                rank: Some(2),
            },
            RankedNotification {
                summary: "first".to_owned(),
                rank: Some(1),
            },
            RankedNotification {
                summary: "third".to_owned(),
                rank: Some(3),
            },
        ];

        let text = compose_dashboard(now_ms, None, Some(&record), &ranked);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "│ Mar 05, 2:30, -%");
        assert_eq!(&lines[1..], ["first", "second"]);
    }

    #[tokio::test]
    async fn handshake_is_the_first_frame_after_open() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Transport(TransportEvent::Opened))
            .await;
        let sent = h.channel.sent.lock();
        let first: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(first["type"], "connection_init");
        assert_eq!(first["userId"], "user-1");
    }

    #[tokio::test]
    async fn ack_reconciles_and_publishes() {
        let mut h = harness();
        h.orchestrator
            .handle_event(ack_frame(&["a", "b"], &["b"]))
            .await;

        let status = h.control.last_status().unwrap().status;
        assert_eq!(status.apps.len(), 2);
        assert!(!status.apps[0].is_running);
        assert!(status.apps[1].is_running);
    }

    #[tokio::test]
    async fn pending_start_flushes_exactly_once_on_ready() {
        let mut h = harness();
        h.orchestrator.handle_event(wearable_connected()).await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::StartApp(
                "com.example.nav".to_owned(),
            )))
            .await;
        assert!(!h.channel.sent_types().contains(&"start_app".to_owned()));

        h.orchestrator.handle_event(ack_frame(&["com.example.nav"], &[])).await;
        h.orchestrator.handle_event(ack_frame(&["com.example.nav"], &[])).await;

        let starts = h
            .channel
            .sent_types()
            .iter()
            .filter(|t| *t == "start_app")
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn start_without_wearable_is_refused() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::StartApp(
                "com.example.nav".to_owned(),
            )))
            .await;
        assert_eq!(
            h.control.notices(),
            ["Must connect glasses to start an app"]
        );
        assert!(!h.channel.sent_types().contains(&"start_app".to_owned()));
    }

    #[tokio::test]
    async fn unknown_wearable_model_is_refused() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::ConnectWearable {
                model_name: "Fictional X9".to_owned(),
            }))
            .await;
        assert_eq!(h.control.notices(), ["Incorrect model name: Fictional X9"]);
    }

    #[tokio::test]
    async fn wearable_disconnect_stops_all_local_apps() {
        let mut h = harness();
        h.orchestrator.handle_event(wearable_connected()).await;
        h.orchestrator.handle_event(ack_frame(&["a"], &[])).await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::StartApp("a".to_owned())))
            .await;
        let running = h.control.last_status().unwrap().status;
        assert!(running.apps[0].is_running);

        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::WearableDisconnected))
            .await;
        let status = h.control.last_status().unwrap().status;
        assert!(status.apps.iter().all(|app| !app.is_running));
        assert!(status.connected_glasses.is_none());
        assert!(h.terminated.lock().contains(&"*".to_owned()));
    }

    #[tokio::test]
    async fn launch_failure_notices_and_forces_stop() {
        let mut h = harness_with(FakeSupervisor::new(&["bad.app"]), false);
        h.orchestrator.handle_event(wearable_connected()).await;
        h.orchestrator
            .handle_event(ack_frame(&["bad.app", "good.app"], &[]))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::StartApp(
                "bad.app".to_owned(),
            )))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::StartApp(
                "good.app".to_owned(),
            )))
            .await;

        assert!(h.control.notices()[0].starts_with("Error starting app bad.app"));
        let status = h.control.last_status().unwrap().status;
        let good = status.apps.iter().find(|a| a.package_name == "good.app").unwrap();
        let bad = status.apps.iter().find(|a| a.package_name == "bad.app").unwrap();
        assert!(good.is_running);
        assert!(!bad.is_running);
        assert_eq!(*h.launched.lock(), ["good.app"]);
        assert!(h.terminated.lock().contains(&"bad.app".to_owned()));

        // The failed start is walked back on the cloud side too.
        let stops: Vec<_> = h
            .channel
            .sent
            .lock()
            .iter()
            .filter_map(|text| {
                let value: Value = serde_json::from_str(text).ok()?;
                if value["type"] == "stop_app" {
                    value["packageName"].as_str().map(str::to_owned)
                } else {
                    None
                }
            })
            .collect();
        assert_eq!(stops, ["bad.app"]);
    }

    #[tokio::test]
    async fn disabled_dashboard_ignores_head_up() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SetDashboardEnabled(
                false,
            )))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::HeadUp))
            .await;
        assert!(h.display.shown.lock().is_empty());

        // Head position telemetry still flows.
        assert!(h.channel.sent_types().contains(&"head_position".to_owned()));
    }

    #[tokio::test]
    async fn multi_tap_toggles_dashboard() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::Tap { count: 2, at_ms: 0 }))
            .await;
        assert_eq!(h.display.shown.lock().len(), 1);
        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::Tap {
                count: 3,
                at_ms: 2_000,
            }))
            .await;
        assert_eq!(*h.display.hidden.lock(), 1);
    }

    #[tokio::test]
    async fn unrecognized_envelope_is_dropped_quietly() {
        let mut h = harness();
        let keep_running = h
            .orchestrator
            .handle_event(SessionEvent::Transport(TransportEvent::Message(
                json!({"type": "telemetry_v9"}).to_string(),
            )))
            .await;
        assert!(keep_running);
        assert!(h.control.signals.lock().is_empty());
    }

    #[tokio::test]
    async fn poll_unauthorized_surfaces_auth_failure() {
        let mut h = harness_with(FakeSupervisor::new(&[]), true);
        h.orchestrator.run_poll().await;
        h.orchestrator.run_poll().await;
        assert_eq!(h.control.auth_failures(), 2);
    }

    #[tokio::test]
    async fn audio_is_gated_by_sensing() {
        let mut h = harness();
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SetSensingEnabled(
                false,
            )))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SendAudioChunk(
                vec![0u8; 8],
            )))
            .await;
        assert!(h.channel.binary.lock().is_empty());

        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SetSensingEnabled(true)))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SendAudioChunk(
                vec![0u8; 8],
            )))
            .await;
        assert_eq!(h.channel.binary.lock().len(), 1);
    }

    #[tokio::test]
    async fn offline_telemetry_does_not_mark_activity() {
        let mut h = harness();
        *h.channel.state.lock() = ConnectionState::Disconnected;
        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::PhoneBattery {
                level: 50,
                charging: false,
            }))
            .await;
        h.orchestrator
            .handle_event(SessionEvent::Command(ManagerCommand::SendAudioChunk(
                vec![0u8; 8],
            )))
            .await;
        assert_eq!(h.orchestrator.last_data_sent_ms, 0);

        *h.channel.state.lock() = ConnectionState::Connected;
        h.orchestrator
            .handle_event(SessionEvent::Device(DeviceEvent::PhoneBattery {
                level: 49,
                charging: false,
            }))
            .await;
        assert!(h.orchestrator.last_data_sent_ms > 0);
    }

    #[tokio::test]
    async fn final_transcripts_buffer_skips_translations() {
        let mut h = harness();
        for frame in [
            json!({"type": "final", "text": "hello there"}),
            json!({"type": "final", "text": "bonjour", "translateLanguage": "fr-FR"}),
            json!({"type": "interim", "text": "not final"}),
        ] {
            h.orchestrator
                .handle_event(SessionEvent::Transport(TransportEvent::Message(
                    frame.to_string(),
                )))
                .await;
        }
        let texts: Vec<_> = h.orchestrator.recent_transcripts().collect();
        assert_eq!(texts, ["hello there"]);
    }

    #[tokio::test]
    async fn shutdown_event_stops_the_loop() {
        let mut h = harness();
        assert!(
            h.orchestrator
                .handle_event(SessionEvent::Device(DeviceEvent::SearchStopped))
                .await
        );
        assert!(!h.orchestrator.handle_event(SessionEvent::Shutdown).await);
    }
}
