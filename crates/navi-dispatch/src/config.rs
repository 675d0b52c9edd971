use navi_common::{ConfigError, NaviError, Result, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{BinaryLocator, Credentials, BINARY_CANDIDATES, NODE_DOWN_SIGNATURES};
use crate::heartbeat::HeartbeatConfig;
use crate::node::ControllerRole;

/// Client configuration for one storage array.
///
/// Every field has a default, so a YAML file only needs the addresses:
///
/// ```yaml
/// spa_address: 10.0.0.1
/// spb_address: 10.0.0.2
/// credentials:
///   user_password:
///     user: admin
///     password: secret
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub spa_address: Option<String>,
    pub spb_address: Option<String>,
    /// Management station, tracked but never used for block commands
    pub cs_address: Option<String>,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub credentials: Credentials,
    /// Default `-t` value for every command, in seconds
    pub timeout_secs: Option<u64>,
    /// Hard limit after which a running process is killed, in seconds
    pub process_timeout_secs: Option<u64>,
    /// Explicit CLI binary; skips the install location lookup
    pub binary: Option<PathBuf>,
    pub binary_candidates: Vec<PathBuf>,
    pub latency_window: usize,
    /// Zero disables the heartbeat loop
    pub heartbeat_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub node_down_signatures: Vec<String>,
    /// Attempts per command, including the first one
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            spa_address: None,
            spb_address: None,
            cs_address: None,
            credentials: Credentials::None,
            timeout_secs: None,
            process_timeout_secs: None,
            binary: None,
            binary_candidates: BINARY_CANDIDATES.iter().map(PathBuf::from).collect(),
            latency_window: 5,
            heartbeat_interval_secs: 30,
            probe_timeout_secs: 10,
            node_down_signatures: NODE_DOWN_SIGNATURES.iter().map(|s| s.to_string()).collect(),
            max_attempts: 3,
        }
    }
}

impl ClientConfig {
    /// Configuration for a dual-SP array with default settings.
    pub fn new(spa_address: impl Into<String>, spb_address: impl Into<String>) -> Self {
        Self {
            spa_address: Some(spa_address.into()),
            spb_address: Some(spb_address.into()),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_spa(mut self, address: impl Into<String>) -> Self {
        self.spa_address = Some(address.into());
        self
    }

    pub fn with_spb(mut self, address: impl Into<String>) -> Self {
        self.spb_address = Some(address.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn with_process_timeout(mut self, secs: u64) -> Self {
        self.process_timeout_secs = Some(secs);
        self
    }

    /// Checks the settings that would otherwise fail at the first command.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(NaviError::from(ConfigError::Invalid(msg.to_string())));

        if self.spa_address.is_none() && self.spb_address.is_none() {
            return invalid("at least one of spa_address or spb_address is required");
        }
        for address in [&self.spa_address, &self.spb_address, &self.cs_address]
            .into_iter()
            .flatten()
        {
            if address.trim().is_empty() {
                return invalid("storage processor addresses must not be empty");
            }
        }
        if let (Some(a), Some(b)) = (&self.spa_address, &self.spb_address) {
            if a == b {
                return invalid("spa_address and spb_address must differ");
            }
        }
        if self.latency_window == 0 {
            return invalid("latency_window must be at least 1");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if self.process_timeout_secs == Some(0) {
            return invalid("process_timeout_secs must be positive");
        }
        if let Credentials::UserPassword { user, .. } = &self.credentials {
            if user.is_empty() {
                return invalid("credentials user must not be empty");
            }
        }
        Ok(())
    }

    /// Configured nodes as `(role, address)` pairs.
    pub fn nodes(&self) -> Vec<(ControllerRole, String)> {
        [
            (ControllerRole::ControllerA, &self.spa_address),
            (ControllerRole::ControllerB, &self.spb_address),
            (ControllerRole::ManagementStation, &self.cs_address),
        ]
        .into_iter()
        .filter_map(|(role, address)| address.clone().map(|a| (role, a)))
        .collect()
    }

    pub fn locator(&self) -> BinaryLocator {
        match &self.binary {
            Some(binary) => BinaryLocator::fixed(binary.clone()),
            None => BinaryLocator::new(self.binary_candidates.clone()),
        }
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat_interval_secs),
            probe_timeout_secs: self.probe_timeout_secs,
            ..HeartbeatConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_attempts)
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }
}
