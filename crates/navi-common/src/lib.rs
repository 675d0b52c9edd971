//! Navi Common Types
//!
//! Shared building blocks for the navi storage-processor client:
//!
//! - [`NaviError`] / [`ConfigError`] - the error taxonomy used by every crate
//! - [`WeightedAverage`] - latency estimator for storage processor nodes
//! - [`MemoCache`] - memoization cache with per-key locking and TTL eviction
//! - [`RetryPolicy`] - explicit retry behaviour passed to each dispatch call
//!
//! None of these types keep process-wide state. Each dispatcher owns its own
//! instances, so two clients in the same process never share node health or
//! cached lookups.

pub mod cache;
pub mod error;
pub mod retry;
pub mod weighted_average;

pub use cache::MemoCache;
pub use error::{ConfigError, NaviError, Result};
pub use retry::{Backoff, RetryPolicy};
pub use weighted_average::WeightedAverage;
