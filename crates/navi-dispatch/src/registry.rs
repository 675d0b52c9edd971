use navi_common::{NaviError, Result};
use std::collections::{BTreeMap, HashMap};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::node::{Availability, ControllerNode, ControllerNodeStatus, ControllerRole};

/// Health state of every storage processor known to one dispatcher.
///
/// The set of roles is fixed at construction. Each node sits behind its own
/// mutex so that updates for SPA never wait on SPB and vice versa. The
/// address index is derived once from the role map and never mutated on its
/// own.
#[derive(Debug)]
pub struct ControllerRegistry {
    nodes: BTreeMap<ControllerRole, Mutex<ControllerNode>>,
    by_address: HashMap<String, ControllerRole>,
}

/// Marks a node busy for as long as it is alive.
#[must_use = "the node is only marked busy while the guard is held"]
pub struct BusyGuard<'a> {
    node: &'a Mutex<ControllerNode>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.node.lock().end_command();
    }
}

impl ControllerRegistry {
    /// Creates a registry from `(role, address)` pairs.
    ///
    /// A role listed twice keeps the last address.
    pub fn new<I, S>(nodes: I, latency_window: usize) -> Self
    where
        I: IntoIterator<Item = (ControllerRole, S)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (role, address) in nodes {
            let node = ControllerNode::new(role, address, latency_window);
            if let Some(previous) = map.insert(role, node) {
                warn!("Duplicate address for {}, replacing {}", role, previous.address);
            }
        }

        let by_address = map
            .values()
            .map(|node| (node.address.clone(), node.role))
            .collect();
        let nodes = map
            .into_iter()
            .map(|(role, node)| (role, Mutex::new(node)))
            .collect();

        Self { nodes, by_address }
    }

    /// Roles in tie-break order.
    pub fn roles(&self) -> Vec<ControllerRole> {
        self.nodes.keys().copied().collect()
    }

    /// Controller roles only, excluding the management station.
    pub fn controller_roles(&self) -> Vec<ControllerRole> {
        self.nodes
            .keys()
            .copied()
            .filter(ControllerRole::is_controller)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn address(&self, role: ControllerRole) -> Option<String> {
        self.nodes
            .get(&role)
            .map(|node| node.lock().address.clone())
    }

    pub fn role_of(&self, address: &str) -> Option<ControllerRole> {
        self.by_address.get(address).copied()
    }

    pub fn status(&self, role: ControllerRole) -> Option<ControllerNodeStatus> {
        self.nodes.get(&role).map(|node| node.lock().status())
    }

    /// Snapshot of every node in role order.
    pub fn snapshot(&self) -> Vec<ControllerNodeStatus> {
        self.nodes
            .values()
            .map(|node| node.lock().status())
            .collect()
    }

    pub fn is_available(&self, role: ControllerRole) -> bool {
        self.status(role)
            .map(|s| s.available == Availability::Available)
            .unwrap_or(false)
    }

    pub fn is_busy(&self, role: ControllerRole) -> bool {
        self.status(role).map(|s| s.busy).unwrap_or(false)
    }

    /// Records a probe or command outcome for `role`.
    ///
    /// Returns `false` when the role is not registered.
    pub fn update(&self, role: ControllerRole, available: bool, latency: Option<Duration>) -> bool {
        let Some(node) = self.nodes.get(&role) else {
            return false;
        };
        let mut node = node.lock();
        if let Some(previous) = node.record(available, latency) {
            if available {
                info!(
                    "{} ({}) is now available (was {:?})",
                    role, node.address, previous
                );
            } else {
                warn!(
                    "{} ({}) is now unavailable (was {:?})",
                    role, node.address, previous
                );
            }
        }
        true
    }

    pub fn update_by_address(
        &self,
        address: &str,
        available: bool,
        latency: Option<Duration>,
    ) -> Result<()> {
        let role = self
            .role_of(address)
            .ok_or_else(|| NaviError::UnknownNode(address.to_string()))?;
        self.update(role, available, latency);
        Ok(())
    }

    /// Marks `role` busy until the returned guard is dropped.
    pub fn mark_busy(&self, role: ControllerRole) -> Option<BusyGuard<'_>> {
        let node = self.nodes.get(&role)?;
        node.lock().begin_command();
        Some(BusyGuard { node })
    }

    /// Resizes the latency window of every node.
    pub fn set_latency_window(&self, window: usize) {
        for node in self.nodes.values() {
            node.lock().set_latency_window(window);
        }
    }

    /// Picks the storage processor the next command should go to.
    ///
    /// Available nodes are preferred over nodes in unknown state, and idle
    /// nodes over busy ones. Ties go to the lower role (SPA before SPB).
    ///
    /// # Errors
    ///
    /// [`NaviError::BothControllersDown`] when both controllers are
    /// unavailable, or when no controller is available or unknown.
    pub fn pick_alive_node(&self) -> Result<ControllerNodeStatus> {
        let mut available = Vec::new();
        let mut unavailable = Vec::new();
        let mut unknown = Vec::new();

        for node in self.nodes.values() {
            let status = node.lock().status();
            if !status.role.is_controller() {
                continue;
            }
            match status.available {
                Availability::Available => available.push(status),
                Availability::Unavailable => unavailable.push(status),
                Availability::Unknown => unknown.push(status),
            }
        }

        if unavailable.len() >= 2 || (available.is_empty() && unknown.is_empty()) {
            let down: Vec<String> = unavailable
                .iter()
                .map(|s| format!("{} ({})", s.role, s.address))
                .collect();
            let detail = if down.is_empty() {
                "no storage processor configured".to_string()
            } else {
                format!("unavailable: {}", down.join(", "))
            };
            return Err(NaviError::BothControllersDown(detail));
        }

        let mut bucket = if available.is_empty() {
            unknown
        } else {
            available
        };
        let idle = bucket.iter().position(|s| !s.busy).unwrap_or(0);
        Ok(bucket.swap_remove(idle))
    }
}
