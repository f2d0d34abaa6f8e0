//! hg-api: Remote access to Foreman/Satellite hostgroups
//!
//! This crate provides:
//! - The `ForemanApi` trait: a generic resource-oriented request interface
//! - A native REST client (`ForemanClient`) built on reqwest
//! - `HostgroupRepository`: pagination-free access to hostgroups and their parameters
//! - An in-memory backend behind the `test-util` feature

pub mod api;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod repository;

pub use api::{ApiSurface, ForemanApi, IndexQuery, Page};
pub use client::ForemanClient;
pub use error::{ApiError, ApiResult};
pub use repository::{ConflictKind, CreateOutcome, HostgroupRepository};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::api::{ApiSurface, ForemanApi, IndexQuery, Page};
    pub use super::client::ForemanClient;
    pub use super::repository::{CreateOutcome, HostgroupRepository};
}
