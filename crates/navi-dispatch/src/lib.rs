//! Failover-aware command dispatch to a dual storage processor array.
//!
//! A [`CommandDispatcher`] keeps the health of both storage processors in a
//! [`ControllerRegistry`], sends each command to the node picked by
//! [`ControllerRegistry::pick_alive_node`] and fails over to the other
//! processor when the answer carries a node-down signature. A
//! [`HeartbeatMonitor`] probes idle processors in the background.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod heartbeat;
pub mod node;
pub mod registry;
pub mod runner;

pub use command::{BinaryLocator, CommandBuilder, Credentials, ExecuteOptions, Invocation};
pub use config::ClientConfig;
pub use dispatcher::CommandDispatcher;
pub use heartbeat::{HeartbeatConfig, HeartbeatHandle, HeartbeatMonitor, ProbeOutcome};
pub use node::{Availability, ControllerNode, ControllerNodeStatus, ControllerRole};
pub use registry::{BusyGuard, ControllerRegistry};
pub use runner::{CommandRunner, ProcessRunner, RawCommandResult};
