use navi_common::WeightedAverage;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Logical role of a management endpoint.
///
/// Node state is keyed by role, not by address, so re-addressing a storage
/// processor keeps its health history. The derived ordering is also the
/// tie-break order used when picking a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ControllerRole {
    ControllerA,
    ControllerB,
    /// The management station never serves block commands and is never
    /// picked by node selection.
    ManagementStation,
}

impl ControllerRole {
    pub fn is_controller(&self) -> bool {
        !matches!(self, ControllerRole::ManagementStation)
    }
}

impl fmt::Display for ControllerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerRole::ControllerA => "SPA",
            ControllerRole::ControllerB => "SPB",
            ControllerRole::ManagementStation => "CS",
        };
        f.write_str(name)
    }
}

/// Tri-state reachability of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Availability {
    /// No probe or command has completed yet
    Unknown,
    Available,
    Unavailable,
}

/// Health state of one storage processor.
#[derive(Debug, Clone)]
pub struct ControllerNode {
    pub role: ControllerRole,
    pub address: String,
    available: Availability,
    last_checked_at: Option<SystemTime>,
    in_flight: u32,
    latency: WeightedAverage,
}

impl ControllerNode {
    pub fn new(role: ControllerRole, address: impl Into<String>, latency_window: usize) -> Self {
        Self {
            role,
            address: address.into(),
            available: Availability::Unknown,
            last_checked_at: None,
            in_flight: 0,
            latency: WeightedAverage::new(latency_window),
        }
    }

    pub fn available(&self) -> Availability {
        self.available
    }

    pub fn last_checked_at(&self) -> Option<SystemTime> {
        self.last_checked_at
    }

    /// True while at least one command is running against this node.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Latency estimate in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.latency.value()
    }

    /// Records the outcome of a probe or command.
    ///
    /// Returns the previous availability when the state changed.
    pub fn record(&mut self, success: bool, latency: Option<Duration>) -> Option<Availability> {
        let next = if success {
            Availability::Available
        } else {
            Availability::Unavailable
        };
        if let Some(latency) = latency.filter(|_| success) {
            self.latency.push(latency.as_micros() as f64 / 1000.0);
        }
        self.last_checked_at = Some(SystemTime::now());

        let previous = self.available;
        self.available = next;
        (previous != next).then_some(previous)
    }

    pub(crate) fn begin_command(&mut self) {
        self.in_flight += 1;
    }

    pub(crate) fn end_command(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub(crate) fn set_latency_window(&mut self, window: usize) {
        self.latency.set_capacity(window);
    }

    /// Point-in-time copy for selection and display.
    pub fn status(&self) -> ControllerNodeStatus {
        ControllerNodeStatus {
            role: self.role,
            address: self.address.clone(),
            available: self.available,
            busy: self.is_busy(),
            latency_ms: self.latency_ms(),
            last_checked_at: self.last_checked_at,
        }
    }
}

/// Snapshot of a node, detached from the registry lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerNodeStatus {
    pub role: ControllerRole,
    pub address: String,
    pub available: Availability,
    pub busy: bool,
    pub latency_ms: f64,
    pub last_checked_at: Option<SystemTime>,
}
