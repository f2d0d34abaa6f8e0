//! Core types and utilities for hg-sync
//!
//! # Modules
//!
//! - `config`: Environment loading and layered run settings
//! - `error`: Error types and Result alias
//! - `types`: Hostgroup records, parameters and payloads shared across crates

pub mod config;
pub mod error;
pub mod types;

// Re-exports
pub use config::{Settings, SettingsOverrides};
pub use error::{Error, Result};
pub use types::*;
