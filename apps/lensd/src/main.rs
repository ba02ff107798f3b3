use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lens_protocol::{ControlSignal, NoticeLevel};
use lens_registry::{LaunchSpec, LocalAppSupervisor};
use lens_session::{SessionConfig, SessionOrchestrator, StatusStreamHub, bridge_transport};
use lens_transport::{EndpointConfig, HttpPollClient, WsChannel};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "lensd")]
#[command(about = "OpenLens session daemon")]
struct Cli {
    /// Cloud backend host.
    #[arg(long)]
    host: String,
    #[arg(long, default_value_t = 8002)]
    port: u16,
    /// Use wss/https instead of ws/http.
    #[arg(long)]
    secure: bool,
    /// Session user id; a random one is generated when omitted.
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long, default_value = "lensd-device")]
    device_id: String,
    /// UI poll endpoint; derived from host/port when omitted.
    #[arg(long)]
    poll_url: Option<String>,
    /// Wearable model to auto-connect once the session is ready.
    #[arg(long)]
    default_wearable: Option<String>,
    /// Local app launch spec as `package=command arg...`; repeatable.
    #[arg(long = "app")]
    apps: Vec<String>,
}

fn parse_launch_specs(entries: &[String]) -> Result<HashMap<String, LaunchSpec>> {
    let mut specs = HashMap::new();
    for entry in entries {
        let (package, command) = entry
            .split_once('=')
            .with_context(|| format!("invalid app spec `{entry}`, expected `package=command`"))?;
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .with_context(|| format!("app spec `{entry}` has an empty command"))?;
        specs.insert(
            package.to_owned(),
            LaunchSpec {
                program: program.to_owned(),
                args: parts.map(str::to_owned).collect(),
            },
        );
    }
    Ok(specs)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .init();

    let cli = Cli::parse();
    let user_id = cli.user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let poll_url = cli.poll_url.unwrap_or_else(|| {
        let scheme = if cli.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}/ui-poll", cli.host, cli.port)
    });
    let specs = parse_launch_specs(&cli.apps)?;

    let (transport_tx, transport_rx) = mpsc::channel(256);
    let channel = Arc::new(WsChannel::new(
        EndpointConfig::new(&cli.host, cli.port, cli.secure),
        transport_tx,
    ));
    let hub = Arc::new(StatusStreamHub::new(64));

    let mut config = SessionConfig::new(user_id.clone(), cli.device_id.clone());
    config.default_wearable = cli.default_wearable.clone();

    let (orchestrator, handle) = SessionOrchestrator::builder(config)
        .channel(channel)
        .poll(Arc::new(HttpPollClient::new(poll_url)))
        .supervisor(Box::new(LocalAppSupervisor::new(specs)))
        .control(hub.clone())
        .build()?;
    info!(%user_id, device_id = %cli.device_id, "session configured");

    let bridge = bridge_transport(handle.clone(), transport_rx);

    let mut signals = hub.subscribe();
    let signal_task = tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            match signal {
                ControlSignal::Status(envelope) => {
                    let rendered =
                        serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_owned());
                    info!(status = %rendered, "status.published");
                }
                ControlSignal::Notice { message, level } => match level {
                    NoticeLevel::Error => warn!(%message, "notice"),
                    NoticeLevel::Info => info!(%message, "notice"),
                },
                ControlSignal::AuthFailure { reason } => {
                    error!(%reason, "poll authorization failed");
                }
            }
        }
    });

    let session = tokio::spawn(orchestrator.run());

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    handle.shutdown().await;

    match session.await {
        Ok(result) => result?,
        Err(error) => warn!(%error, "session task failed"),
    }
    signal_task.abort();
    bridge.abort();
    Ok(())
}
