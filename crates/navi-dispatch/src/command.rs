//! Construction of `naviseccli` invocations.
//!
//! The argument layout is fixed by the array's command tool:
//!
//! ```text
//! <binary> -h <address> [-user <u> -password <p> -scope <s> | -secfilepath <path>] [-t <timeout>] [-np] <tokens...>
//! ```

use navi_common::MemoCache;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MIN_TIMEOUT_SECS: u64 = 3;
pub const MAX_TIMEOUT_SECS: u64 = 1800;

/// Executable name used when none of the install locations exist.
pub const DEFAULT_BINARY: &str = "naviseccli";

/// Known install locations, checked in order.
pub const BINARY_CANDIDATES: &[&str] = &[
    "/opt/Navisphere/bin/naviseccli",
    r"C:\Program Files\EMC\Navisphere CLI\NaviSECCli.exe",
    r"C:\Program Files (x86)\EMC\Navisphere CLI\NaviSECCli.exe",
];

/// Output fragments meaning the targeted storage processor could not serve
/// the command. Matched case-insensitively.
pub const NODE_DOWN_SIGNATURES: &[&str] = &[
    "A network error occurred while trying to connect",
    "Cannot access SP",
    "SP is not available",
    "Storage processor not available",
    "Unable to validate the identity of the server",
];

/// Lightweight command used by the heartbeat.
pub const PROBE_COMMAND: &[&str] = &["getagent"];

const PASSWORD_MASK: &str = "******";

/// Authentication passed to every invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Rely on the security file in the invoking user's home directory
    #[default]
    None,
    UserPassword {
        user: String,
        password: String,
        #[serde(default)]
        scope: u32,
    },
    SecurityFile(PathBuf),
}

impl Credentials {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Credentials::None => {}
            Credentials::UserPassword {
                user,
                password,
                scope,
            } => {
                args.extend([
                    "-user".to_string(),
                    user.clone(),
                    "-password".to_string(),
                    password.clone(),
                    "-scope".to_string(),
                    scope.to_string(),
                ]);
            }
            Credentials::SecurityFile(path) => {
                args.push("-secfilepath".to_string());
                args.push(path.display().to_string());
            }
        }
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// When false, `-np` asks the array not to poll for task completion.
    pub poll: bool,
    /// Overrides the client-wide timeout, in seconds.
    pub timeout_secs: Option<u64>,
    /// Fail with `CommandFailed` on any non-zero exit code.
    pub check_exit_code: bool,
    /// Fail with `CommandFailed` only on this exit code.
    pub raise_on_code: Option<i32>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            poll: true,
            timeout_secs: None,
            check_exit_code: false,
            raise_on_code: None,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_poll(mut self) -> Self {
        self.poll = false;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn check_exit_code(mut self) -> Self {
        self.check_exit_code = true;
        self
    }

    pub fn raise_on_code(mut self, code: i32) -> Self {
        self.raise_on_code = Some(code);
        self
    }
}

/// Clamps a timeout into `[MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS]`.
pub fn clamp_timeout(secs: u64) -> u64 {
    let clamped = secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    if clamped != secs {
        warn!(
            "Timeout {}s is outside [{}, {}], using {}s",
            secs, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, clamped
        );
    }
    clamped
}

/// Whether `output` carries one of the node-down signatures.
pub fn is_node_down<S: AsRef<str>>(output: &str, signatures: &[S]) -> bool {
    let output = output.to_lowercase();
    signatures
        .iter()
        .any(|sig| output.contains(&sig.as_ref().to_lowercase()))
}

/// Finds the CLI executable, caching the result per candidate list.
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    candidates: Vec<PathBuf>,
    fallback: PathBuf,
    cache: Arc<MemoCache<Vec<PathBuf>, PathBuf>>,
}

impl Default for BinaryLocator {
    fn default() -> Self {
        Self::new(BINARY_CANDIDATES.iter().map(PathBuf::from).collect())
    }
}

impl BinaryLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            fallback: PathBuf::from(DEFAULT_BINARY),
            cache: Arc::new(MemoCache::new()),
        }
    }

    /// Always resolves to `binary`, skipping the filesystem lookup.
    pub fn fixed(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        Self {
            candidates: Vec::new(),
            fallback: binary,
            cache: Arc::new(MemoCache::new()),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        self.cache
            .get_or_insert_with(self.candidates.clone(), || self.lookup())
    }

    /// Forgets the cached location, e.g. after the CLI was installed.
    pub fn refresh(&self) {
        self.cache.invalidate(&self.candidates);
    }

    fn lookup(&self) -> PathBuf {
        match self.candidates.iter().find(|p| Path::new(p).is_file()) {
            Some(found) => {
                debug!("Using CLI binary {}", found.display());
                found.clone()
            }
            None => {
                debug!(
                    "No CLI binary in known locations, relying on PATH for {}",
                    self.fallback.display()
                );
                self.fallback.clone()
            }
        }
    }
}

/// A fully built command line.
///
/// `Display` masks the password so invocations can be logged safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                write!(f, " {}", PASSWORD_MASK)?;
            } else {
                write!(f, " {}", arg)?;
            }
            mask_next = arg == "-password";
        }
        Ok(())
    }
}

/// Builds invocations for a configured client.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    locator: BinaryLocator,
    credentials: Credentials,
    timeout_secs: Option<u64>,
}

impl CommandBuilder {
    pub fn new(locator: BinaryLocator, credentials: Credentials) -> Self {
        Self {
            locator,
            credentials,
            timeout_secs: None,
        }
    }

    /// Default timeout for every invocation, in seconds.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn locator(&self) -> &BinaryLocator {
        &self.locator
    }

    pub fn build<S: AsRef<str>>(
        &self,
        address: &str,
        tokens: &[S],
        options: &ExecuteOptions,
    ) -> Invocation {
        let mut args = vec!["-h".to_string(), address.to_string()];
        self.credentials.push_args(&mut args);

        if let Some(timeout) = options.timeout_secs.or(self.timeout_secs) {
            args.push("-t".to_string());
            args.push(clamp_timeout(timeout).to_string());
        }
        if !options.poll {
            args.push("-np".to_string());
        }
        args.extend(tokens.iter().map(|t| t.as_ref().to_string()));

        Invocation {
            program: self.locator.resolve(),
            args,
        }
    }
}
