//! Co-simulation bridge binary.
//!
//! Runs a loopback engine: every `--wire` is both an input the peer may
//! drive and an output reported back, and time advances instantly.
//!
//! # Usage
//!
//! ```bash
//! # Wait for a peer started by hand
//! cosim-server --wire clk --wire data:8
//!
//! # Launch the peer, passing it the announced port
//! cosim-server --wire data:8 -- ./peer --port {port}
//! ```

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use cosim_core::{
    BridgeConfig, ClockConfig, ClockUnit, SignalMap, SupervisorConfig, Wire,
    scheduler::ImmediateScheduler,
};
use cosim_server::{RuntimeConfig, launch_on_port};
use tokio::process::Command;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Co-simulation bridge
#[derive(Parser, Debug)]
#[command(name = "cosim-server")]
#[command(about = "Bridge a peer simulator to a local simulator over a socket")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:0")]
    bind: String,

    /// Loopback signal as NAME or NAME:WIDTH (repeatable)
    #[arg(short, long = "wire", value_parser = parse_wire)]
    wires: Vec<(String, Option<usize>)>,

    /// Local time units per remote tick
    #[arg(long, default_value = "1000")]
    clock_ratio: u64,

    /// Local time unit label (fs, ps, ns, us, ms, s, step)
    #[arg(long, default_value = "ps")]
    clock_unit: ClockUnit,

    /// Local units advanced for a repeated tick
    #[arg(long, default_value = "1")]
    min_step: u64,

    /// Poll interval for liveness checks, in milliseconds
    #[arg(long, default_value = "5000")]
    listen_timeout_ms: u64,

    /// Maximum duration of one tick, in milliseconds
    #[arg(long, default_value = "5000")]
    tick_timeout_ms: u64,

    /// Seconds to wait for the peer to connect (default: forever, or 120
    /// when launching the peer)
    #[arg(long)]
    connect_timeout_secs: Option<u64>,

    /// Seconds of peer silence before giving up (default: off, or 120 when
    /// launching the peer)
    #[arg(long)]
    inactivity_timeout_secs: Option<u64>,

    /// Pause between sending END and closing, in milliseconds
    #[arg(long, default_value = "1000")]
    shutdown_grace_ms: u64,

    /// Base name for the launched peer's log files
    #[arg(long, default_value = "port_launch")]
    log_name: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Peer command to launch; `{port}` is replaced by the announced port
    #[arg(last = true)]
    peer: Vec<String>,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        let base =
            if self.peer.is_empty() { BridgeConfig::default() } else { BridgeConfig::launching() };
        BridgeConfig {
            listen_timeout: Duration::from_millis(self.listen_timeout_ms),
            connect_timeout: self
                .connect_timeout_secs
                .map(Duration::from_secs)
                .or(base.connect_timeout),
            tick_timeout: Duration::from_millis(self.tick_timeout_ms),
            inactivity_timeout: self
                .inactivity_timeout_secs
                .map(Duration::from_secs)
                .or(base.inactivity_timeout),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            clock: ClockConfig {
                ratio: self.clock_ratio,
                unit: self.clock_unit,
                min_step: self.min_step,
            },
        }
    }

    fn signals(&self) -> Result<SignalMap, Box<dyn std::error::Error>> {
        let mut signals = SignalMap::new();
        for (name, width) in &self.wires {
            let wire = match width {
                Some(width) => Wire::logic(*width),
                None => Wire::new("0"),
            };
            signals.register_wire(name, &wire)?;
        }
        Ok(signals)
    }
}

fn parse_wire(arg: &str) -> Result<(String, Option<usize>), String> {
    match arg.split_once(':') {
        None => Ok((arg.to_string(), None)),
        Some((name, width)) => {
            let width: usize =
                width.parse().map_err(|_| format!("invalid width {width:?} for wire {name:?}"))?;
            if width == 0 {
                return Err(format!("wire {name:?} must be at least one bit wide"));
            }
            Ok((name.to_string(), Some(width)))
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Standard output carries the port announcement only.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!("Co-simulation bridge starting");

    let config = RuntimeConfig {
        bind_address: args.bind.clone(),
        bridge: args.bridge_config(),
        supervisor: SupervisorConfig::default(),
        log_name: args.log_name.clone(),
    };
    let signals = args.signals()?;

    let launcher = args.peer.split_first().map(|(program, rest)| {
        let program = program.clone();
        let rest = rest.to_vec();
        move |port: u16| {
            let port = port.to_string();
            let mut command = Command::new(&program);
            command.args(rest.iter().map(|arg| arg.replace("{port}", &port)));
            command
        }
    });

    let report = launch_on_port(
        config,
        signals,
        Box::new(ImmediateScheduler::new()),
        launcher.as_ref().map(|l| l as &dyn cosim_server::PeerLauncher),
    )
    .await?;

    if report.succeeded() { Ok(ExitCode::SUCCESS) } else { Ok(ExitCode::FAILURE) }
}
