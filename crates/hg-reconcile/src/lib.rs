//! hg-reconcile: Declarative hostgroup tree reconciliation
//!
//! This crate provides:
//! - `model`: the YAML config (categories, tree, combos)
//! - `resolver`: symbolic property references to remote IDs
//! - `assembler`: create/update payloads
//! - `upsert`: create-or-update of single hostgroups
//! - `materializer`: the recursive tree walk
//! - `matcher`: combo expansion and title matching
//! - `driver`: the full run (teardown, tree, combos)

pub mod assembler;
pub mod driver;
pub mod matcher;
pub mod materializer;
pub mod model;
pub mod resolver;
pub mod upsert;

pub use driver::{ComboReport, MatchedHostgroup, ReconcileReport, Reconciler};
pub use matcher::{Combination, CombinatorialMatcher};
pub use materializer::{MaterializedNode, TreeMaterializer};
pub use model::{CategoryMap, Combo, DeclaredConfig, Member, PropertyMap, PropertyValue, Selector, TreeNode};
pub use upsert::{UpsertAction, UpsertOutcome, UpsertResolver};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::driver::{ReconcileReport, Reconciler};
    pub use super::model::DeclaredConfig;
}
