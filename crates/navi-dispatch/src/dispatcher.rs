use navi_common::{NaviError, Result, RetryPolicy};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{is_node_down, CommandBuilder, ExecuteOptions};
use crate::config::ClientConfig;
use crate::heartbeat::{HeartbeatConfig, HeartbeatHandle, HeartbeatMonitor, ProbeOutcome};
use crate::node::{ControllerNodeStatus, ControllerRole};
use crate::registry::ControllerRegistry;
use crate::runner::{CommandRunner, ProcessRunner, RawCommandResult};

/// Sends commands to whichever storage processor is alive.
///
/// The dispatcher owns the node registry for one array. Commands go to the
/// node picked by [`ControllerRegistry::pick_alive_node`]; a node-down
/// answer marks that node unavailable, and the retry policy then sends the
/// next attempt to the other storage processor.
///
/// # Thread Safety
///
/// `CommandDispatcher` is `Send + Sync`. Commands issued from several threads
/// may run on SPA and SPB at the same time.
pub struct CommandDispatcher {
    registry: Arc<ControllerRegistry>,
    builder: Arc<CommandBuilder>,
    runner: Arc<dyn CommandRunner>,
    signatures: Arc<Vec<String>>,
    retry: RetryPolicy,
    heartbeat_config: HeartbeatConfig,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
}

impl CommandDispatcher {
    /// Creates a dispatcher that runs the CLI as a child process.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runner = ProcessRunner::new().with_deadline(config.process_timeout());
        Self::with_runner(config, Arc::new(runner))
    }

    /// Creates a dispatcher with a custom command runner.
    pub fn with_runner(config: ClientConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ControllerRegistry::new(
            config.nodes(),
            config.latency_window,
        ));
        let builder = Arc::new(
            CommandBuilder::new(config.locator(), config.credentials.clone())
                .with_timeout(config.timeout_secs),
        );

        info!(
            "Dispatcher created for {} node(s), {} attempt(s) per command",
            registry.node_count(),
            config.max_attempts
        );

        Ok(Self {
            registry,
            builder,
            runner,
            signatures: Arc::new(config.node_down_signatures.clone()),
            retry: config.retry_policy(),
            heartbeat_config: config.heartbeat_config(),
            heartbeat: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    /// Retry policy used by [`execute`](Self::execute).
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Status of every configured node.
    pub fn nodes(&self) -> Vec<ControllerNodeStatus> {
        self.registry.snapshot()
    }

    /// Runs `tokens` with default options and the client retry policy.
    pub fn execute<S: AsRef<str>>(&self, tokens: &[S]) -> Result<RawCommandResult> {
        self.execute_with(tokens, &ExecuteOptions::default(), &self.retry)
    }

    /// Runs `tokens` on an alive storage processor, failing over on
    /// node-down answers as `policy` allows.
    ///
    /// # Errors
    ///
    /// - [`NaviError::BothControllersDown`] if no storage processor can take
    ///   the command; no process is started in that case
    /// - [`NaviError::NodeDown`] once the policy stops retrying
    /// - [`NaviError::CommandFailed`] when `options` asks for exit code checks
    /// - [`NaviError::Timeout`] and [`NaviError::Spawn`] from the runner
    pub fn execute_with<S: AsRef<str>>(
        &self,
        tokens: &[S],
        options: &ExecuteOptions,
        policy: &RetryPolicy,
    ) -> Result<RawCommandResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let target = self.registry.pick_alive_node()?;

            match self.run_on(target.role, &target.address, tokens, options) {
                Ok(result) => return Ok(result),
                Err(e) if policy.should_retry(&e, attempt) => {
                    let delay = policy.backoff.delay(attempt);
                    warn!(
                        "Attempt {} on {} ({}) failed: {}. Retrying{}",
                        attempt,
                        target.role,
                        target.address,
                        e,
                        if delay.is_zero() {
                            String::new()
                        } else {
                            format!(" in {:?}", delay)
                        }
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs `tokens` on the storage processor at `address`, without failover.
    pub fn execute_on<S: AsRef<str>>(
        &self,
        address: &str,
        tokens: &[S],
        options: &ExecuteOptions,
    ) -> Result<RawCommandResult> {
        let role = self
            .registry
            .role_of(address)
            .ok_or_else(|| NaviError::UnknownNode(address.to_string()))?;
        self.run_on(role, address, tokens, options)
    }

    fn run_on<S: AsRef<str>>(
        &self,
        role: ControllerRole,
        address: &str,
        tokens: &[S],
        options: &ExecuteOptions,
    ) -> Result<RawCommandResult> {
        let invocation = self.builder.build(address, tokens, options);
        debug!("Running on {}: {}", role, invocation);

        let result = {
            let _busy = self.registry.mark_busy(role);
            self.runner.run(address, &invocation)?
        };
        debug!(
            "{} answered in {:?} with exit code {:?}",
            role, result.elapsed, result.exit_code
        );

        if is_node_down(&result.text, &self.signatures) {
            self.registry.update(role, false, None);
            return Err(NaviError::NodeDown {
                address: address.to_string(),
                command: result.command,
                output: result.text,
            });
        }
        self.registry.update(role, true, Some(result.elapsed));

        let failed = match (options.raise_on_code, result.exit_code) {
            (Some(code), exit_code) => exit_code == Some(code),
            (None, _) => options.check_exit_code && !result.success(),
        };
        if failed {
            return Err(NaviError::CommandFailed {
                address: result.address,
                command: result.command,
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }

    fn monitor(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.builder),
            Arc::clone(&self.runner),
            Arc::clone(&self.signatures),
            self.heartbeat_config.clone(),
        )
    }

    /// Probes every idle storage processor once and records the results.
    pub fn probe_now(&self) -> Vec<ProbeOutcome> {
        self.monitor().run_once()
    }

    /// Starts the background heartbeat.
    ///
    /// Returns `false` when the heartbeat is disabled by a zero interval or
    /// already running.
    pub fn start_heartbeat(&self) -> bool {
        if self.heartbeat_config.interval.is_zero() {
            debug!("Heartbeat disabled");
            return false;
        }
        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.as_ref().map(|h| h.is_running()).unwrap_or(false) {
            return false;
        }
        *heartbeat = Some(self.monitor().spawn());
        true
    }

    /// Stops the background heartbeat and waits for it to finish.
    pub fn stop_heartbeat(&self) {
        let handle = self.heartbeat.lock().take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    /// Changes the interval of a running heartbeat.
    pub fn set_heartbeat_interval(&self, interval: Duration) {
        if let Some(handle) = self.heartbeat.lock().as_ref() {
            handle.set_interval(interval);
        }
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .map(|h| h.is_running())
            .unwrap_or(false)
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
