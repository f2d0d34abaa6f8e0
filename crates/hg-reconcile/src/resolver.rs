//! Symbolic property resolution
//!
//! Turns `(property_type, value)` pairs from the config into remote IDs by
//! searching the matching collection. Any ambiguity is a hard error.

use hg_api::{ApiError, ApiSurface, ForemanApi, IndexQuery, Page};
use hg_core::{EntityId, Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Map a property label to the remote collection it references
pub fn normalize_resource(property_type: &str) -> String {
    let base = property_type
        .strip_suffix("_ids")
        .or_else(|| property_type.strip_suffix("_id"))
        .unwrap_or(property_type);
    let base = if base == "content_source" { "capsule" } else { base };
    let plural = if base.ends_with('s') {
        base.to_string()
    } else {
        format!("{}s", base)
    };
    match plural.as_str() {
        "installation_medias" | "medias" => "media".to_string(),
        _ => plural,
    }
}

/// Build the scoped-search expression for a lookup
pub fn search_expression(value: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("{}=\"{}\"", column, value),
        None => format!("=={}", value),
    }
}

/// Resolves property references through search
#[derive(Clone)]
pub struct PropertyResolver {
    api: Arc<dyn ForemanApi>,
}

impl PropertyResolver {
    pub fn new(api: Arc<dyn ForemanApi>) -> Self {
        Self { api }
    }

    /// Resolve `value` of `property_type` to the ID of exactly one remote record
    pub async fn resolve(
        &self,
        property_type: &str,
        value: &str,
        column: Option<&str>,
    ) -> Result<EntityId> {
        let resource = normalize_resource(property_type);
        let search = search_expression(value, column);
        debug!("fetching id for property {} ({} {})", property_type, resource, search);

        let page = self.search(&resource, &search).await?;
        match page.match_count() {
            0 => Err(Error::NotFound { resource, query: search }),
            1 => page
                .results
                .first()
                .and_then(|r| r.get("id"))
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::Decode(format!("{} result carries no id", resource))),
            count => Err(Error::AmbiguousResult {
                resource,
                query: search,
                count,
            }),
        }
    }

    /// Search the primary API surface, retrying once on the fallback after a server error
    async fn search(&self, resource: &str, search: &str) -> Result<Page> {
        let query = IndexQuery::search(search);
        match self.api.index(ApiSurface::Primary, resource, &query).await {
            Ok(page) => Ok(page),
            Err(e) if e.is_server_error() => {
                warn!(
                    "Server error searching {} ({}), retrying on the fallback API",
                    resource, e
                );
                self.api
                    .index(ApiSurface::Fallback, resource, &query)
                    .await
                    .map_err(|e| match e {
                        ApiError::Server { status, body } => {
                            Error::TransientUpstream(format!("{} {}: {}", resource, status, body))
                        }
                        other => classify(resource, other),
                    })
            }
            Err(e) => Err(classify(resource, e)),
        }
    }
}

fn classify(resource: &str, err: ApiError) -> Error {
    match err {
        ApiError::NotFound(_) => Error::ResourceNotFound {
            resource: resource.to_string(),
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hg_api::memory::InMemoryForeman;

    #[test]
    fn test_normalize_resource() {
        assert_eq!(normalize_resource("location"), "locations");
        assert_eq!(normalize_resource("domain"), "domains");
        assert_eq!(normalize_resource("domain_id"), "domains");
        assert_eq!(normalize_resource("domain_ids"), "domains");
        assert_eq!(normalize_resource("puppetclass"), "puppetclass");
        assert_eq!(normalize_resource("puppetclass_ids"), "puppetclass");
        assert_eq!(normalize_resource("content_source"), "capsules");
        assert_eq!(normalize_resource("installation_media"), "media");
        assert_eq!(normalize_resource("media"), "media");
        assert_eq!(normalize_resource("hostgroups"), "hostgroups");
        assert_eq!(normalize_resource("lifecycle_environment"), "lifecycle_environments");
    }

    #[test]
    fn test_search_expression() {
        assert_eq!(search_expression("CB", None), "==CB");
        assert_eq!(search_expression("Root/CB", Some("title")), "title=\"Root/CB\"");
    }

    #[tokio::test]
    async fn test_single_match() {
        let api = Arc::new(InMemoryForeman::new());
        let id = api.seed("domains", "cb.example.com").await;
        api.seed("domains", "hh.example.com").await;

        let resolver = PropertyResolver::new(api);
        assert_eq!(resolver.resolve("domain", "cb.example.com", None).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_no_match() {
        let api = Arc::new(InMemoryForeman::new());
        api.add_collection("domains").await;

        let resolver = PropertyResolver::new(api);
        let err = resolver.resolve("domain", "nope", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "domains"));
    }

    #[tokio::test]
    async fn test_two_matches_is_ambiguous() {
        let api = Arc::new(InMemoryForeman::new());
        api.seed("locations", "CB").await;
        api.seed("locations", "CB").await;

        let resolver = PropertyResolver::new(api);
        let err = resolver.resolve("location", "CB", None).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousResult { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let api = Arc::new(InMemoryForeman::new());
        let resolver = PropertyResolver::new(api);
        let err = resolver.resolve("flux_capacitor", "x", None).await.unwrap_err();
        assert!(
            matches!(err, Error::ResourceNotFound { ref resource } if resource == "flux_capacitors")
        );
    }

    #[tokio::test]
    async fn test_server_error_falls_back() {
        let api = Arc::new(InMemoryForeman::new());
        let id = api.seed("media", "CentOS mirror").await;
        api.fail_index(ApiSurface::Primary, "media").await;

        let resolver = PropertyResolver::new(api.clone());
        let resolved = resolver
            .resolve("installation_media", "CentOS mirror", None)
            .await
            .unwrap();
        assert_eq!(resolved, id);
        assert_eq!(api.count_calls("index media").await, 1);
        assert_eq!(api.count_calls("index@fallback media").await, 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_escalates() {
        let api = Arc::new(InMemoryForeman::new());
        api.seed("media", "CentOS mirror").await;
        api.fail_index(ApiSurface::Primary, "media").await;
        api.fail_index(ApiSurface::Fallback, "media").await;

        let resolver = PropertyResolver::new(api);
        let err = resolver.resolve("media", "CentOS mirror", None).await.unwrap_err();
        assert!(matches!(err, Error::TransientUpstream(_)));
    }

    #[tokio::test]
    async fn test_title_column() {
        let api = Arc::new(InMemoryForeman::new());
        let root = api.insert_hostgroup("CB", None).await;
        let child = api.insert_hostgroup("web", Some(root)).await;
        api.insert_hostgroup("web", None).await;

        let resolver = PropertyResolver::new(api);
        let id = resolver.resolve("hostgroup", "CB/web", Some("title")).await.unwrap();
        assert_eq!(id, child);
    }
}
