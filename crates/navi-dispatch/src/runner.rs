use navi_common::{NaviError, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::command::Invocation;

/// Captured outcome of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommandResult {
    /// Storage processor the command was sent to
    pub address: String,
    /// Command line with the password masked
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// `stdout` followed by `stderr`
    pub text: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl RawCommandResult {
    pub fn new(
        address: impl Into<String>,
        command: impl Into<String>,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        elapsed: Duration,
    ) -> Self {
        let text = if stderr.is_empty() {
            stdout.clone()
        } else if stdout.is_empty() {
            stderr.clone()
        } else {
            format!("{}\n{}", stdout, stderr)
        };
        Self {
            address: address.into(),
            command: command.into(),
            stdout,
            stderr,
            text,
            exit_code,
            elapsed,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes an invocation against a storage processor.
///
/// The dispatcher and heartbeat go through this trait so tests can script
/// storage processor behaviour without spawning processes.
pub trait CommandRunner: Send + Sync {
    fn run(&self, address: &str, invocation: &Invocation) -> Result<RawCommandResult>;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Hard limit after which the child is killed. The CLI's own `-t` option
    /// normally ends the command first.
    deadline: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, address: &str, invocation: &Invocation) -> Result<RawCommandResult> {
        let program = invocation.program.display().to_string();
        let start = Instant::now();

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| NaviError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait for it.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.deadline {
            None => child.wait()?,
            Some(deadline) => loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(NaviError::Timeout {
                        address: address.to_string(),
                        command: invocation.to_string(),
                        after_ms: deadline.as_millis() as u64,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            },
        };

        Ok(RawCommandResult::new(
            address,
            invocation.to_string(),
            collect(stdout),
            collect(stderr),
            status.code(),
            start.elapsed(),
        ))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
