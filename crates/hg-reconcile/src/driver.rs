//! Reconciliation driver
//!
//! Runs one pass over a declared config: optional teardown, tree
//! materialization, then combo parameter application. Every step awaits
//! its remote calls one at a time and the first error ends the run.

use hg_api::{ForemanApi, HostgroupRepository};
use hg_core::{EntityId, Result, Settings};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::assembler::HostgroupAssembler;
use crate::matcher::{Combination, CombinatorialMatcher};
use crate::materializer::{MaterializedNode, TreeMaterializer};
use crate::model::{CategoryMap, Combo, DeclaredConfig};
use crate::resolver::PropertyResolver;
use crate::upsert::UpsertResolver;

/// A hostgroup selected by a combo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedHostgroup {
    pub id: EntityId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComboReport {
    pub name: String,
    pub combinations: Vec<Combination>,
    pub matched: Vec<MatchedHostgroup>,
}

/// What a run did, or would have done with `noop`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub noop: bool,
    /// IDs in deletion order
    pub deleted: Vec<EntityId>,
    pub materialized: Vec<MaterializedNode>,
    pub combos: Vec<ComboReport>,
}

/// Drives a reconciliation run against one remote
pub struct Reconciler<'a> {
    settings: &'a Settings,
    repo: HostgroupRepository,
    upsert: UpsertResolver,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: Arc<dyn ForemanApi>, settings: &'a Settings) -> Self {
        let repo = HostgroupRepository::new(api.clone(), settings.per_page);
        let assembler = HostgroupAssembler::new(PropertyResolver::new(api));
        let upsert = UpsertResolver::new(repo.clone(), assembler, settings.update);
        Self {
            settings,
            repo,
            upsert,
        }
    }

    /// Run every enabled step over `config`
    pub async fn run(&self, config: &DeclaredConfig) -> Result<ReconcileReport> {
        self.settings.require_credentials(!config.combos.is_empty())?;

        let mut report = ReconcileReport {
            noop: self.settings.noop,
            ..Default::default()
        };
        log_categories(&config.categories);

        if self.settings.teardown {
            report.deleted = self.teardown().await?;
        }

        if self.settings.skip_creation {
            info!("Skipping hostgroup creation");
        } else if let Some(tree) = &config.tree {
            info!(
                "Materializing tree of depth {}{}",
                tree.depth(),
                if self.settings.noop { " (noop)" } else { "" }
            );
            let materializer =
                TreeMaterializer::new(&self.upsert, &config.categories, self.settings.noop);
            report.materialized = materializer.materialize(tree).await?;
        } else {
            debug!("No tree declared");
        }

        if self.settings.skip_combos {
            info!("Skipping combos");
        } else {
            for combo in &config.combos {
                report.combos.push(self.apply_combo(combo).await?);
            }
        }
        Ok(report)
    }

    /// Delete every hostgroup, newest first so children go before parents
    pub async fn teardown(&self) -> Result<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = self.repo.list_all().await?.iter().map(|hg| hg.id).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        info!("Tearing down {} hostgroups", ids.len());

        for &id in &ids {
            if self.settings.noop {
                info!("Would delete HG: {}", id);
            } else {
                self.repo.delete(id).await?;
            }
        }
        Ok(ids)
    }

    /// Apply one combo's parameters to every hostgroup it selects
    pub async fn apply_combo(&self, combo: &Combo) -> Result<ComboReport> {
        info!("Combo: {}", combo.name);
        let matcher = CombinatorialMatcher::new(self.repo.clone());
        let (combinations, matched) = matcher.find(&combo.categories).await?;

        for hostgroup in &matched {
            if self.settings.noop {
                info!("Would update {} ({})", hostgroup.title, hostgroup.id);
            } else {
                self.upsert
                    .update_properties(hostgroup, &combo.parameters)
                    .await?;
            }
        }

        Ok(ComboReport {
            name: combo.name.clone(),
            combinations,
            matched: matched
                .into_iter()
                .map(|hg| MatchedHostgroup {
                    id: hg.id,
                    title: hg.title,
                })
                .collect(),
        })
    }
}

fn log_categories(categories: &CategoryMap) {
    info!("Categories:");
    for (name, members) in categories {
        let names: Vec<&str> = members.iter().map(|m| m.name()).collect();
        info!("  {}: {}", name, names.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hg_api::memory::InMemoryForeman;
    use hg_core::Error;

    fn settings() -> Settings {
        Settings {
            pass: Some("secret".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_teardown_descending() {
        let api = Arc::new(InMemoryForeman::new());
        let root = api.insert_hostgroup("CB", None).await;
        let child = api.insert_hostgroup("web", Some(root)).await;
        let other = api.insert_hostgroup("HH", None).await;

        let settings = Settings {
            teardown: true,
            ..settings()
        };
        let reconciler = Reconciler::new(api.clone(), &settings);
        let deleted = reconciler.teardown().await.unwrap();

        assert_eq!(deleted, vec![other, child, root]);
        assert_eq!(api.destroyed("hostgroups").await, deleted);
        assert!(api.hostgroups().await.is_empty());
    }

    #[tokio::test]
    async fn test_noop_teardown_only_lists() {
        let api = Arc::new(InMemoryForeman::new());
        api.insert_hostgroup("CB", None).await;

        let settings = Settings {
            noop: true,
            ..settings()
        };
        let deleted = Reconciler::new(api.clone(), &settings).teardown().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(api.write_count().await, 0);
        assert_eq!(api.hostgroups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_listing_without_password_fails_early() {
        let api = Arc::new(InMemoryForeman::new());
        api.insert_hostgroup("CB", None).await;
        let config = DeclaredConfig::from_yaml_str("categories:\n  site: [CB]\n").unwrap();

        let settings = Settings {
            noop: true,
            teardown: true,
            ..Default::default()
        };
        let err = Reconciler::new(api.clone(), &settings).run(&config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_noop_tree_only_runs_without_password() {
        let api = Arc::new(InMemoryForeman::new());
        let config =
            DeclaredConfig::from_yaml_str("categories:\n  site: [CB, HH]\ntree:\n  site:\n")
                .unwrap();

        let settings = Settings {
            noop: true,
            ..Default::default()
        };
        let report = Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();
        assert_eq!(report.materialized.len(), 2);
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_skip_flags() {
        let api = Arc::new(InMemoryForeman::new());
        let config = DeclaredConfig::from_yaml_str(
            "categories:\n  site: [CB]\ntree:\n  site:\ncombos:\n  - name: all\n    categories: [[CB]]\n",
        )
        .unwrap();

        let settings = Settings {
            skip_creation: true,
            skip_combos: true,
            ..settings()
        };
        let report = Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();
        assert!(report.materialized.is_empty());
        assert!(report.combos.is_empty());
        assert!(api.calls().await.is_empty());
    }
}
