//! Reflow oven bridge server.
//!
//! Connects to the oven controller (or replays a fixture in fake mode) and
//! serves the dashboard and JSON API.
//!
//! # Usage
//!
//! ```sh
//! # Real oven on the default port
//! reflow-bridge --port /dev/ttyUSB0
//!
//! # No oven: replay the built-in profile twice as fast
//! reflow-bridge --fake --fake-period-ms 500
//! ```
//!
//! Every flag can also be set through a `REFLOW_*` environment variable;
//! flags win. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reflow_bridge::hal::SimulatedDevice;
use reflow_bridge::services::{run_server, WebServerConfig};
use reflow_bridge::{Config, OvenBridge};

const DEFAULT_LOG_FILTER: &str = "info,reflow_bridge=debug,tower_http=info";

/// Serial telemetry and command bridge for a reflow oven.
#[derive(Debug, Parser)]
#[command(name = "reflow-bridge", version, about)]
struct Args {
    /// Serial device path
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Address the HTTP server binds
    #[arg(long)]
    host: Option<String>,

    /// Port the HTTP server listens on
    #[arg(long)]
    http_port: Option<u16>,

    /// Replay a fixture instead of opening the serial port
    #[arg(long)]
    fake: bool,

    /// Fixture file for fake mode (built-in profile when omitted)
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Delay between replayed lines in fake mode
    #[arg(long)]
    fake_period_ms: Option<u64>,
}

impl Args {
    fn apply(self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.serial.port = port;
        }
        if let Some(baud) = self.baud {
            config.serial.baud = baud;
        }
        if let Some(host) = self.host {
            config.web.host = host;
        }
        if let Some(port) = self.http_port {
            config.web.port = port;
        }
        if self.fake {
            config.simulation.enabled = true;
        }
        if let Some(fixture) = self.fixture {
            config.simulation.fixture = Some(fixture);
        }
        if let Some(ms) = self.fake_period_ms {
            config.simulation.period_ms = ms;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = args.apply(Config::from_env().context("reading REFLOW_* environment")?);
    let web_config = WebServerConfig::from_config(&config.web)
        .with_context(|| format!("invalid bind address {}", config.web.bind_addr()))?;

    let bridge = Arc::new(OvenBridge::new(&config));
    let token = CancellationToken::new();

    let link_task = if config.simulation.enabled {
        let device = match &config.simulation.fixture {
            Some(path) => SimulatedDevice::from_file(path, config.simulation.period())
                .with_context(|| format!("loading fixture {}", path.display()))?,
            None => SimulatedDevice::with_default_profile(config.simulation.period()),
        };
        info!(lines = device.len(), "Fake mode: replaying fixture");
        bridge.spawn_link(device, token.clone())
    } else {
        spawn_serial(&bridge, &config, token.clone())?
    };

    let shutdown = {
        let token = token.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down");
            token.cancel();
        }
    };
    run_server(Arc::clone(&bridge), web_config, shutdown)
        .await
        .context("HTTP server failed")?;

    token.cancel();
    match link_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Link task ended with an error"),
        Err(e) => warn!(error = %e, "Link task panicked"),
    }
    Ok(())
}

#[cfg(feature = "serial")]
fn spawn_serial(
    bridge: &OvenBridge,
    config: &Config,
    token: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<Result<(), reflow_bridge::LinkError>>> {
    use reflow_bridge::hal::SerialDevice;

    let device = SerialDevice::new(
        config.serial.port.clone(),
        config.serial.baud,
        config.serial.read_timeout(),
    );
    info!(port = %config.serial.port, baud = config.serial.baud, "Using serial device");
    Ok(bridge.spawn_link(device, token))
}

#[cfg(not(feature = "serial"))]
fn spawn_serial(
    _bridge: &OvenBridge,
    _config: &Config,
    _token: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<Result<(), reflow_bridge::LinkError>>> {
    anyhow::bail!("built without the `serial` feature; run with --fake")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
