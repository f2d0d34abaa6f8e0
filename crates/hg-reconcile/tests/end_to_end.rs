//! End-to-end reconciliation runs against the in-memory Foreman backend

#[cfg(test)]
mod tests {
    use hg_api::memory::InMemoryForeman;
    use hg_core::{Error, Settings, ACTIVATION_KEY_PARAMETER};
    use hg_reconcile::prelude::*;
    use hg_reconcile::UpsertAction;
    use serde_json::Value;
    use std::sync::Arc;

    const CONFIG: &str = r#"
categories:
  base:
    - Root
  site:
    - CB:
        location: CB
    - HH
  role:
    - web:
        activation_key: ak-web
    - db
tree:
  base:
    site:
      role:
combos:
  - name: cb-web
    categories: [[CB], [web, db]]
    parameters:
      domain: cb.example.com
      activation_key: [ak-base, ak-cb]
"#;

    fn settings() -> Settings {
        Settings {
            pass: Some("changeme".to_string()),
            ..Default::default()
        }
    }

    async fn seeded() -> Arc<InMemoryForeman> {
        let api = Arc::new(InMemoryForeman::new());
        api.seed("locations", "CB").await;
        api.seed("domains", "cb.example.com").await;
        api
    }

    fn titles(hostgroups: &[hg_core::Hostgroup]) -> Vec<String> {
        let mut titles: Vec<String> = hostgroups.iter().map(|h| h.title.clone()).collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_terminal_category_creates_roots() {
        let api = Arc::new(InMemoryForeman::new());
        let config =
            DeclaredConfig::from_yaml_str("categories:\n  site: [CB, HH]\ntree:\n  site: null\n")
                .unwrap();

        let settings = settings();
        let report = Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();

        assert_eq!(report.materialized.len(), 2);
        let hostgroups = api.hostgroups().await;
        assert_eq!(titles(&hostgroups), vec!["CB", "HH"]);
        assert!(hostgroups.iter().all(|h| h.parent_id.is_none()));
    }

    #[tokio::test]
    async fn test_full_run_builds_tree_and_applies_combo() {
        let api = seeded().await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();

        let settings = settings();
        let report = Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();

        let hostgroups = api.hostgroups().await;
        assert_eq!(
            titles(&hostgroups),
            vec![
                "Root",
                "Root/CB",
                "Root/CB/db",
                "Root/CB/web",
                "Root/HH",
                "Root/HH/db",
                "Root/HH/web"
            ]
        );

        let cb = hostgroups.iter().find(|h| h.title == "Root/CB").unwrap();
        assert!(cb.extra["location_ids"].is_array());

        let combo = &report.combos[0];
        assert_eq!(combo.combinations.len(), 2);
        let matched: Vec<&str> = combo.matched.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(matched, vec!["Root/CB/web", "Root/CB/db"]);

        let cb_web = hostgroups.iter().find(|h| h.title == "Root/CB/web").unwrap();
        assert!(cb_web.extra["domain_id"].is_u64());
        assert_eq!(
            cb_web.parameter(ACTIVATION_KEY_PARAMETER).unwrap().value,
            Value::from("ak-base,ak-cb")
        );
        let hh_web = hostgroups.iter().find(|h| h.title == "Root/HH/web").unwrap();
        assert_eq!(
            hh_web.parameter(ACTIVATION_KEY_PARAMETER).unwrap().value,
            Value::from("ak-web")
        );
        assert!(!hh_web.extra.contains_key("domain_id"));
    }

    #[tokio::test]
    async fn test_second_run_with_update_is_idempotent() {
        let api = seeded().await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();

        let first_settings = settings();
        let first = Reconciler::new(api.clone(), &first_settings).run(&config).await.unwrap();
        let before = api.hostgroups().await;

        let update = Settings {
            update: true,
            ..settings()
        };
        let second = Reconciler::new(api.clone(), &update).run(&config).await.unwrap();
        let after = api.hostgroups().await;

        assert_eq!(titles(&before), titles(&after));
        let ids = |r: &ReconcileReport| r.materialized.iter().map(|n| n.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert!(second
            .materialized
            .iter()
            .all(|n| n.action == Some(UpsertAction::Updated)));
    }

    #[tokio::test]
    async fn test_second_run_without_update_fails() {
        let api = seeded().await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();

        let settings = settings();
        Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();
        let err = Reconciler::new(api.clone(), &settings)
            .run(&config)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyExists { ref name } if name == "Root"));
        assert!(err.suggestion().contains("--update"));
    }

    #[tokio::test]
    async fn test_teardown_ignores_listing_order() {
        let api = seeded().await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();
        let settings = settings();
        Reconciler::new(api.clone(), &settings).run(&config).await.unwrap();

        let teardown = Settings {
            teardown: true,
            skip_creation: true,
            skip_combos: true,
            ..settings
        };
        // children cannot be deleted after their parent, so order matters
        api.reverse_listing(true).await;
        let report = Reconciler::new(api.clone(), &teardown).run(&config).await.unwrap();

        assert_eq!(report.deleted.len(), 7);
        assert!(report.deleted.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(api.destroyed("hostgroups").await, report.deleted);
        assert!(api.hostgroups().await.is_empty());
    }

    #[tokio::test]
    async fn test_noop_writes_nothing() {
        let api = seeded().await;
        let existing = api.insert_hostgroup("Old", None).await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();

        let noop = Settings {
            noop: true,
            teardown: true,
            ..settings()
        };
        let report = Reconciler::new(api.clone(), &noop).run(&config).await.unwrap();

        assert!(report.noop);
        assert_eq!(report.deleted, vec![existing]);
        assert_eq!(report.materialized.len(), 7);
        assert!(report.materialized.iter().all(|n| n.id.is_none()));
        assert_eq!(api.write_count().await, 0);
        assert_eq!(api.hostgroups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_with_combos_needs_password() {
        let api = seeded().await;
        let config = DeclaredConfig::from_yaml_str(CONFIG).unwrap();

        let noop = Settings {
            noop: true,
            ..Default::default()
        };
        noop.validate().unwrap();
        let err = Reconciler::new(api.clone(), &noop).run(&config).await.unwrap_err();

        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(api.calls().await.is_empty());

        let skip_combos = Settings {
            skip_combos: true,
            ..noop
        };
        let report = Reconciler::new(api.clone(), &skip_combos).run(&config).await.unwrap();
        assert_eq!(report.materialized.len(), 7);
        assert!(report.combos.is_empty());
    }
}
