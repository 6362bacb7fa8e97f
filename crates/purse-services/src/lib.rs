//! Long-running services for purse.
//!
//! - [`health`] -- periodic health monitor, process sampler and the
//!   status/stats text surface
//! - [`store`] -- append-only JSONL store for confirmed transactions

pub mod error;
pub mod health;
pub mod store;

pub use error::{Result, ServiceError};
pub use health::{HealthMonitor, format_stats, format_status};
pub use store::{JsonlStore, TransactionStore};
