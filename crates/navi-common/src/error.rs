use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// These are programmer or deployment mistakes: they are never retried and
/// surface at the first use of the offending configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown converter '{name}' for field '{key}'")]
    UnknownConverter { key: String, name: String },

    #[error("No parser configured for record type '{0}'")]
    UnknownParser(String),

    #[error("Invalid pattern for field '{key}': {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("Field '{0}' declares both an end marker and a pattern match")]
    EndMarkerWithPattern(String),

    #[error("Field '{0}' needs exactly one of 'label' or 'pattern'")]
    MissingMatchSpec(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid client configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum NaviError {
    #[error("Storage processor {address} is not available (command: {command})")]
    NodeDown {
        address: String,
        command: String,
        output: String,
    },

    #[error("Both storage processors are down: {0}")]
    BothControllersDown(String),

    #[error("Command '{command}' on {address} failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        address: String,
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Command '{command}' on {address} timed out after {after_ms}ms")]
    Timeout {
        address: String,
        command: String,
        after_ms: u64,
    },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown storage processor address: {0}")]
    UnknownNode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NaviError {
    /// Whether the failure is transient and worth retrying against the other
    /// storage processor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NaviError::NodeDown { .. })
    }

    /// Address of the storage processor involved, if the error has one.
    pub fn address(&self) -> Option<&str> {
        match self {
            NaviError::NodeDown { address, .. }
            | NaviError::CommandFailed { address, .. }
            | NaviError::Timeout { address, .. } => Some(address),
            NaviError::UnknownNode(address) => Some(address),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for NaviError {
    fn from(err: serde_yaml::Error) -> Self {
        NaviError::Config(ConfigError::Yaml(err))
    }
}

pub type Result<T> = std::result::Result<T, NaviError>;
