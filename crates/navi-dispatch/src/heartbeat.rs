use navi_common::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{is_node_down, CommandBuilder, ExecuteOptions, PROBE_COMMAND};
use crate::node::{ControllerNodeStatus, ControllerRole};
use crate::registry::ControllerRegistry;
use crate::runner::CommandRunner;

/// Heartbeat configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// Delay between probe cycles. Zero disables the loop.
    pub interval: Duration,
    /// CLI timeout for a probe, in seconds
    pub probe_timeout_secs: u64,
    pub probe_command: Vec<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout_secs: 10,
            probe_command: PROBE_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of probing one storage processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub role: ControllerRole,
    pub address: String,
    pub available: bool,
    pub latency: Option<Duration>,
}

/// Periodically probes both storage processors and feeds the registry.
pub struct HeartbeatMonitor {
    registry: Arc<ControllerRegistry>,
    builder: Arc<CommandBuilder>,
    runner: Arc<dyn CommandRunner>,
    signatures: Arc<Vec<String>>,
    probe_command: Vec<String>,
    probe_timeout_secs: u64,
    interval_ms: Arc<AtomicU64>,
}

impl HeartbeatMonitor {
    /// Creates a new heartbeat monitor.
    ///
    /// # Arguments
    /// * `registry` - Node state shared with the dispatcher
    /// * `builder` - Builds the probe invocation
    /// * `runner` - Executes probes
    /// * `signatures` - Node-down output signatures
    /// * `config` - Heartbeat configuration
    pub fn new(
        registry: Arc<ControllerRegistry>,
        builder: Arc<CommandBuilder>,
        runner: Arc<dyn CommandRunner>,
        signatures: Arc<Vec<String>>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            registry,
            builder,
            runner,
            signatures,
            probe_command: config.probe_command,
            probe_timeout_secs: config.probe_timeout_secs,
            interval_ms: Arc::new(AtomicU64::new(config.interval.as_millis() as u64)),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    /// Changes the probe interval. Zero stops the loop before its next sleep.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Release);
    }

    /// Picks the best reachable storage processor from the shared registry.
    pub fn pick_alive_node(&self) -> Result<ControllerNodeStatus> {
        self.registry.pick_alive_node()
    }

    /// Probes every idle controller once, in parallel, and records results.
    pub fn run_once(&self) -> Vec<ProbeOutcome> {
        let targets: Vec<(ControllerRole, String)> = self
            .registry
            .controller_roles()
            .into_iter()
            .filter(|role| !self.registry.is_busy(*role))
            .filter_map(|role| self.registry.address(role).map(|addr| (role, addr)))
            .collect();

        let outcomes: Vec<ProbeOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = targets
                .iter()
                .map(|(role, address)| scope.spawn(move || self.probe(*role, address)))
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().ok())
                .collect()
        });

        for outcome in &outcomes {
            self.registry
                .update(outcome.role, outcome.available, outcome.latency);
        }
        outcomes
    }

    /// Probes one storage processor without touching the registry.
    pub fn probe(&self, role: ControllerRole, address: &str) -> ProbeOutcome {
        let options = ExecuteOptions::new()
            .no_poll()
            .with_timeout(self.probe_timeout_secs);
        let invocation = self.builder.build(address, &self.probe_command, &options);

        // Only a node-down answer or a failure to run marks the node down,
        // as for commands. Other non-zero exits are logged.
        let (available, latency) = match self.runner.run(address, &invocation) {
            Ok(result) if is_node_down(&result.text, &self.signatures) => {
                debug!(
                    "Probe of {} ({}) reports node down: {}",
                    role,
                    address,
                    result.text.trim()
                );
                (false, None)
            }
            Ok(result) => {
                if !result.success() {
                    warn!(
                        "Probe of {} ({}) exited with {:?}: {}",
                        role,
                        address,
                        result.exit_code,
                        result.text.trim()
                    );
                }
                debug!("Probe of {} ({}) took {:?}", role, address, result.elapsed);
                (true, Some(result.elapsed))
            }
            Err(e) => {
                debug!("Probe of {} ({}) failed: {}", role, address, e);
                (false, None)
            }
        };

        ProbeOutcome {
            role,
            address: address.to_string(),
            available,
            latency,
        }
    }

    /// Starts the probe loop on a background thread.
    ///
    /// The first cycle runs immediately so the registry leaves the unknown
    /// state as soon as possible.
    pub fn spawn(self) -> HeartbeatHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval_ms = Arc::clone(&self.interval_ms);

        let thread = thread::Builder::new()
            .name("navi-heartbeat".to_string())
            .spawn(move || {
                info!("Heartbeat started with interval {:?}", self.interval());
                loop {
                    self.run_once();

                    let interval = self.interval();
                    if interval.is_zero() {
                        info!("Heartbeat interval is zero, stopping");
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Heartbeat stopped");
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start heartbeat thread: {}", e);
                None
            }
        };

        HeartbeatHandle {
            stop_tx: Some(stop_tx),
            thread,
            interval_ms,
        }
    }
}

/// Owner of a running heartbeat loop. Dropping it stops the loop.
pub struct HeartbeatHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    interval_ms: Arc<AtomicU64>,
}

impl HeartbeatHandle {
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Signals the loop to stop and waits for the current cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Heartbeat thread panicked");
            }
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
