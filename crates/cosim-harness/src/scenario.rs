//! Scenario builder for simulated bridge sessions.
//!
//! A scenario is one bridge and one scripted peer on a Turmoil network. The
//! peer runs its script, then reads everything the bridge sends until the
//! bridge closes. The outcome captures both sides.
//!
//! ```text
//!   peer host                         bridge host
//!   ─────────                         ───────────
//!   steps: Send / Wait / Hangup  ──>  Bridge::run (SimEnv, Scheduler)
//!   drain() until EOF            <──  @t:UPDATE / TICK_COMPLETE / END
//! ```

use std::{
    error::Error,
    sync::{Arc, Mutex},
    time::Duration,
};

use cosim_core::{
    BridgeConfig, BridgeError, SignalMap,
    env::Environment,
    scheduler::{ImmediateScheduler, Scheduler},
};
use cosim_proto::{Envelope, Outbound};
use cosim_server::{Bridge, accept_peer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{SimEnv, SimPeer, SimTransport};

/// Simulated host running the bridge.
pub const BRIDGE_HOST: &str = "bridge";

/// Port the bridge listens on.
pub const BRIDGE_PORT: u16 = 9000;

/// Simulated host running the peer.
pub const PEER_HOST: &str = "peer";

/// Lets the bridge bind before the peer connects.
const CONNECT_DELAY: Duration = Duration::from_millis(1);

/// One step of the peer's script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerStep {
    /// Write raw protocol text.
    Send(String),
    /// Stay silent for a while.
    Wait(Duration),
    /// Close the write side without END.
    Hangup,
}

impl PeerStep {
    /// Write `data` as-is.
    pub fn send(data: impl Into<String>) -> Self {
        Self::Send(data.into())
    }

    /// Stay silent for `duration`.
    pub fn wait(duration: Duration) -> Self {
        Self::Wait(duration)
    }
}

/// What happened in a scenario.
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// Envelopes received by the peer, in order.
    pub received: Vec<Envelope>,
    /// Bridge's local clock at the end.
    pub local_time: u64,
    /// Commands the bridge dispatched.
    pub commands: u64,
    /// First fatal error of the session.
    pub error: Option<BridgeError>,
    /// Virtual time from bridge start to session end.
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    /// Time tags of every `TICK_COMPLETE`.
    pub fn tick_completions(&self) -> Vec<u64> {
        self.received
            .iter()
            .filter(|e| e.body == Outbound::TickComplete)
            .map(|e| e.time)
            .collect()
    }

    /// Every `UPDATE` as `(time, name, value)`.
    pub fn updates(&self) -> Vec<(u64, String, String)> {
        self.received
            .iter()
            .filter_map(|e| match &e.body {
                Outbound::Update { name, value } => Some((e.time, name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of `END` messages received.
    pub fn end_count(&self) -> usize {
        self.received.iter().filter(|e| e.body == Outbound::End).count()
    }
}

/// Builder for one simulated session.
pub struct Scenario {
    config: BridgeConfig,
    signals: SignalMap,
    scheduler: Box<dyn Scheduler>,
    steps: Vec<PeerStep>,
    latency: Option<Duration>,
    seed: u64,
    chunk_seed: Option<u64>,
    connect: bool,
    duration: Duration,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Scenario with default configuration, no signals and an immediate
    /// scheduler.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            signals: SignalMap::new(),
            scheduler: Box::new(ImmediateScheduler::new()),
            steps: Vec::new(),
            latency: None,
            seed: 0,
            chunk_seed: None,
            connect: true,
            duration: Duration::from_secs(600),
        }
    }

    /// Bridge configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Signals registered with the bridge.
    pub fn signals(mut self, signals: SignalMap) -> Self {
        self.signals = signals;
        self
    }

    /// Local simulator stand-in.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Append a step to the peer's script.
    pub fn step(mut self, step: PeerStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = PeerStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Fixed one-way network latency.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulation seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Split every `Send` into random chunks drawn from `seed`.
    pub fn chunked(mut self, seed: u64) -> Self {
        self.chunk_seed = Some(seed);
        self
    }

    /// Never connect the peer.
    pub fn without_peer(mut self) -> Self {
        self.connect = false;
        self
    }

    /// Virtual time limit for the whole simulation.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Run the simulation to completion.
    ///
    /// # Errors
    ///
    /// Returns error if either host fails or the simulation runs out of
    /// time. Bridge session errors are part of the outcome instead.
    pub fn run(self) -> Result<ScenarioOutcome, Box<dyn Error>> {
        let mut builder = turmoil::Builder::new();
        builder.simulation_duration(self.duration).rng_seed(self.seed);
        if let Some(latency) = self.latency {
            builder.min_message_latency(latency).max_message_latency(latency);
        }
        let mut sim = builder.build();

        let bridge_slot = Arc::new(Mutex::new(None));
        let received_slot = Arc::new(Mutex::new(Vec::new()));

        let Self { config, signals, scheduler, steps, chunk_seed, connect, .. } = self;

        let slot = Arc::clone(&bridge_slot);
        sim.client(BRIDGE_HOST, async move {
            let env = SimEnv::new();
            let start = env.now();
            let transport = SimTransport::bind(&format!("0.0.0.0:{BRIDGE_PORT}")).await?;
            let bridge = Bridge::new(env, config.clone(), signals, scheduler)?;

            let report = match accept_peer(&env, &transport, config.connect_timeout).await {
                Ok(stream) => bridge.run(stream).await,
                Err(e) => bridge.abandon(e),
            };

            let elapsed = env.now() - start;
            *slot.lock().map_err(|_| "bridge slot poisoned")? = Some((report, elapsed));
            Ok(())
        });

        if connect {
            let slot = Arc::clone(&received_slot);
            sim.client(PEER_HOST, async move {
                tokio::time::sleep(CONNECT_DELAY).await;
                let mut peer = SimPeer::connect(&format!("{BRIDGE_HOST}:{BRIDGE_PORT}")).await?;
                let mut rng = chunk_seed.map(ChaCha8Rng::seed_from_u64);

                run_script(&mut peer, &steps, rng.as_mut()).await;

                let received = peer.drain().await?;
                *slot.lock().map_err(|_| "peer slot poisoned")? = received;
                Ok(())
            });
        }

        sim.run()?;

        let (report, elapsed) = bridge_slot
            .lock()
            .map_err(|_| "bridge slot poisoned")?
            .take()
            .ok_or("bridge did not finish")?;
        let received =
            std::mem::take(&mut *received_slot.lock().map_err(|_| "peer slot poisoned")?);

        Ok(ScenarioOutcome {
            received,
            local_time: report.local_time,
            commands: report.commands,
            error: report.error,
            elapsed,
        })
    }
}

/// Play the script. Stops early once the bridge stops accepting data.
async fn run_script(peer: &mut SimPeer, steps: &[PeerStep], mut rng: Option<&mut ChaCha8Rng>) {
    for step in steps {
        match step {
            PeerStep::Send(data) => {
                let sent = match rng.as_deref_mut() {
                    Some(rng) => send_chunked(peer, data, rng).await,
                    None => peer.send_raw(data).await,
                };
                if sent.is_err() {
                    return;
                }
            },
            PeerStep::Wait(duration) => tokio::time::sleep(*duration).await,
            PeerStep::Hangup => {
                let _ = peer.hangup().await;
                return;
            },
        }
    }
}

async fn send_chunked(peer: &mut SimPeer, data: &str, rng: &mut ChaCha8Rng) -> std::io::Result<()> {
    let bytes = data.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let len = rng.gen_range(1..=bytes.len() - start);
        let end = start + len;
        let chunk = String::from_utf8_lossy(&bytes[start..end]);
        peer.send_raw(&chunk).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        start = end;
    }
    Ok(())
}
