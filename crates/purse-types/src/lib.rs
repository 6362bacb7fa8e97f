//! # purse-types
//!
//! Core type definitions for the purse finance assistant.
//!
//! Every other purse crate depends on this one. It contains:
//!
//! - **[`error`]** -- [`PurseError`], [`ParseError`] and [`PersistenceError`]
//! - **[`transaction`]** -- transaction candidates and confirmed rows
//! - **[`category`]** -- the category catalog used by both AI and fallback paths
//! - **[`health`]** -- read-only health and statistics snapshots
//! - **[`config`]** -- configuration schema

pub mod category;
pub mod config;
pub mod error;
pub mod health;
pub mod transaction;

pub use category::{Category, CategoryCatalog, OTHER_CATEGORY};
pub use config::Config;
pub use error::{ParseError, PersistenceError, PurseError, Result};
pub use transaction::{CategorySource, ConfirmedTransaction, TransactionCandidate, TransactionKind};
