//! Multisig Treasury Governor
//!
//! Record-keeper for a community-governed multisig treasury: draft and
//! activated wallets, funding proposals, and quorum-gated payment
//! transactions, cross-checked against an external chain indexing API.

pub mod address;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod model;
pub mod oracle;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
