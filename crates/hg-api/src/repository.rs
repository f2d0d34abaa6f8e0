//! Hostgroup repository
//!
//! Thin request/response wrappers over the hostgroup collection. Listing
//! hides pagination; `create` reports a uniqueness conflict as a value so
//! callers can branch on it without matching error strings.

use hg_core::{EntityId, Error, Hostgroup, HostgroupPayload, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{ApiSurface, ForemanApi, IndexQuery};
use crate::error::ApiError;

/// Collection name of hostgroups
pub const HOSTGROUPS: &str = "hostgroups";

/// Why a create was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A hostgroup with the same title already exists
    AlreadyExists { message: String },
}

/// Result of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(EntityId),
    Conflict(ConflictKind),
}

/// What `set_parameter` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterChange {
    Created,
    Updated,
    Unchanged,
}

/// Access to remote hostgroups
#[derive(Clone)]
pub struct HostgroupRepository {
    api: Arc<dyn ForemanApi>,
    per_page: u32,
}

impl HostgroupRepository {
    pub fn new(api: Arc<dyn ForemanApi>, per_page: u32) -> Self {
        Self {
            api,
            per_page: per_page.max(1),
        }
    }

    /// List every hostgroup matching `search`, following pages until a short one
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<Hostgroup>> {
        let mut hostgroups = Vec::new();
        let mut page_no = 1;
        loop {
            let query = IndexQuery {
                search: search.map(str::to_string),
                ..Default::default()
            }
            .page(page_no, self.per_page);
            let page = self
                .api
                .index(ApiSurface::Primary, HOSTGROUPS, &query)
                .await?;
            let fetched = page.results.len();
            debug!("Fetched {} hostgroups from page {}", fetched, page_no);
            for result in page.results {
                hostgroups.push(serde_json::from_value::<Hostgroup>(result)?);
            }
            if fetched != self.per_page as usize {
                break;
            }
            page_no += 1;
        }
        Ok(hostgroups)
    }

    /// List every hostgroup of the organization
    pub async fn list_all(&self) -> Result<Vec<Hostgroup>> {
        self.list(None).await
    }

    /// Fetch a hostgroup by ID
    pub async fn get(&self, id: EntityId) -> Result<Hostgroup> {
        let value = self.api.show(HOSTGROUPS, id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create a hostgroup
    pub async fn create(&self, payload: &HostgroupPayload) -> Result<CreateOutcome> {
        let body = json!({ "hostgroup": payload.to_value() });
        match self.api.create(HOSTGROUPS, body).await {
            Ok(created) => {
                let id = created
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::Decode("create response carries no id".to_string()))?;
                Ok(CreateOutcome::Created(id))
            }
            Err(ApiError::Conflict(message)) => {
                Ok(CreateOutcome::Conflict(ConflictKind::AlreadyExists { message }))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Update a hostgroup
    pub async fn update(&self, id: EntityId, payload: &HostgroupPayload) -> Result<Hostgroup> {
        let body = json!({ "hostgroup": payload.to_value() });
        let value = self.api.update(HOSTGROUPS, id, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Delete a hostgroup
    pub async fn delete(&self, id: EntityId) -> Result<()> {
        info!("Delete HG: {}", id);
        self.api.destroy(HOSTGROUPS, id).await?;
        Ok(())
    }

    /// Create the host parameter `name` on a hostgroup, or update it if present
    pub async fn set_parameter(
        &self,
        hostgroup_id: EntityId,
        name: &str,
        value: &str,
    ) -> Result<ParameterChange> {
        let existing = self
            .api
            .list_parameters(hostgroup_id)
            .await?
            .into_iter()
            .find(|p| p.name == name);

        match existing {
            Some(param) if param.value.as_str() == Some(value) => {
                debug!("Parameter {} on {} already set", name, hostgroup_id);
                Ok(ParameterChange::Unchanged)
            }
            Some(param) => {
                self.api
                    .update_parameter(hostgroup_id, param.id, value)
                    .await?;
                Ok(ParameterChange::Updated)
            }
            None => {
                self.api
                    .create_parameter(hostgroup_id, name, value)
                    .await?;
                Ok(ParameterChange::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryForeman;

    fn repo_with(api: &Arc<InMemoryForeman>, per_page: u32) -> HostgroupRepository {
        HostgroupRepository::new(api.clone(), per_page)
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let api = Arc::new(InMemoryForeman::new());
        for name in ["a", "b", "c", "d", "e"] {
            api.insert_hostgroup(name, None).await;
        }

        let repo = repo_with(&api, 2);
        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 5);
        // 2 + 2 + 1: the short third page ends the loop
        assert_eq!(api.count_calls("index hostgroups").await, 3);
    }

    #[tokio::test]
    async fn test_list_exact_multiple_requests_trailing_empty_page() {
        let api = Arc::new(InMemoryForeman::new());
        for name in ["a", "b", "c", "d"] {
            api.insert_hostgroup(name, None).await;
        }

        let repo = repo_with(&api, 2);
        assert_eq!(repo.list_all().await.unwrap().len(), 4);
        assert_eq!(api.count_calls("index hostgroups").await, 3);
    }

    #[tokio::test]
    async fn test_create_conflict_is_a_value() {
        let api = Arc::new(InMemoryForeman::new());
        let repo = repo_with(&api, 50);

        let payload = HostgroupPayload::new("CB");
        let first = repo.create(&payload).await.unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));

        let second = repo.create(&payload).await.unwrap();
        assert!(matches!(
            second,
            CreateOutcome::Conflict(ConflictKind::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_child() {
        let api = Arc::new(InMemoryForeman::new());
        let root = api.insert_hostgroup("CB", None).await;
        let child = api.insert_hostgroup("web", Some(root)).await;
        let repo = repo_with(&api, 50);

        let hg = repo.get(child).await.unwrap();
        assert_eq!(hg.title, "CB/web");
        assert_eq!(hg.parent_id, Some(root));
    }

    #[tokio::test]
    async fn test_list_with_search_filter() {
        let api = Arc::new(InMemoryForeman::new());
        let cb = api.insert_hostgroup("CB", None).await;
        let hh = api.insert_hostgroup("HH", None).await;
        let cb_web = api.insert_hostgroup("web", Some(cb)).await;
        let hh_web = api.insert_hostgroup("web", Some(hh)).await;
        let repo = repo_with(&api, 1);

        let found = repo.list(Some("name=\"web\"")).await.unwrap();
        assert_eq!(found.iter().map(|hg| hg.id).collect::<Vec<_>>(), vec![cb_web, hh_web]);

        let by_title = repo.list(Some("title=\"HH/web\"")).await.unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, hh_web);
    }

    #[tokio::test]
    async fn test_set_parameter_create_then_update() {
        let api = Arc::new(InMemoryForeman::new());
        let id = api.insert_hostgroup("CB", None).await;
        let repo = repo_with(&api, 50);

        let change = repo.set_parameter(id, "kt_activation_keys", "ak-1").await.unwrap();
        assert_eq!(change, ParameterChange::Created);
        let change = repo.set_parameter(id, "kt_activation_keys", "ak-1").await.unwrap();
        assert_eq!(change, ParameterChange::Unchanged);
        let change = repo.set_parameter(id, "kt_activation_keys", "ak-2").await.unwrap();
        assert_eq!(change, ParameterChange::Updated);

        let hg = repo.get(id).await.unwrap();
        assert_eq!(hg.parameters.len(), 1);
        assert_eq!(hg.parameters[0].value, "ak-2");
    }

    #[tokio::test]
    async fn test_delete_missing_propagates_status() {
        let api = Arc::new(InMemoryForeman::new());
        let repo = repo_with(&api, 50);
        let err = repo.delete(42).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
    }
}
