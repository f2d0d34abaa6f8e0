//! In-process `ForemanApi` backend
//!
//! Behaves like a small Foreman server: titles are computed from the parent
//! chain, titles are unique, a hostgroup with children cannot be deleted,
//! and the scoped-search subset hg-sync emits (`==value`, `field="value"`)
//! is understood. Every call is journaled so tests can assert on traffic.

use async_trait::async_trait;
use hg_core::{EntityId, Hostgroup, Parameter};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::api::{ApiSurface, ForemanApi, IndexQuery, Page};
use crate::error::{ApiError, ApiResult};
use crate::repository::HOSTGROUPS;

const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Vec<Map<String, Value>>>,
    parameters: HashMap<EntityId, Vec<Parameter>>,
    next_id: EntityId,
    failing: HashSet<(ApiSurface, String)>,
    journal: Vec<String>,
    reverse_listing: bool,
    forced_conflicts: HashSet<String>,
}

/// In-memory Foreman server
pub struct InMemoryForeman {
    inner: Mutex<Inner>,
}

impl Default for InMemoryForeman {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryForeman {
    /// Create a server that only knows the hostgroup collection
    pub fn new() -> Self {
        let mut inner = Inner {
            next_id: 1,
            ..Default::default()
        };
        inner.collections.insert(HOSTGROUPS.to_string(), Vec::new());
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Register an empty collection
    pub async fn add_collection(&self, resource: &str) {
        self.inner
            .lock()
            .await
            .collections
            .entry(resource.to_string())
            .or_default();
    }

    /// Seed a named record into a collection, registering the collection if needed
    pub async fn seed(&self, resource: &str, name: &str) -> EntityId {
        let mut record = Map::new();
        record.insert("name".to_string(), Value::String(name.to_string()));
        self.seed_record(resource, record).await
    }

    /// Seed an arbitrary record; its `id` is assigned here
    pub async fn seed_record(&self, resource: &str, mut record: Map<String, Value>) -> EntityId {
        let mut inner = self.inner.lock().await;
        let id = inner.allocate_id();
        record.insert("id".to_string(), Value::from(id));
        inner
            .collections
            .entry(resource.to_string())
            .or_default()
            .push(record);
        id
    }

    /// Seed a hostgroup directly, bypassing conflict checks and the journal
    pub async fn insert_hostgroup(&self, name: &str, parent_id: Option<EntityId>) -> EntityId {
        let mut inner = self.inner.lock().await;
        let title = inner.title_for(name, parent_id).unwrap_or_else(|| name.to_string());
        let id = inner.allocate_id();
        let mut record = Map::new();
        record.insert("id".to_string(), Value::from(id));
        record.insert("name".to_string(), Value::String(name.to_string()));
        record.insert("title".to_string(), Value::String(title));
        record.insert(
            "parent_id".to_string(),
            parent_id.map(Value::from).unwrap_or(Value::Null),
        );
        inner
            .collections
            .entry(HOSTGROUPS.to_string())
            .or_default()
            .push(record);
        id
    }

    /// Make `index` on `resource` fail with a 500 on the given surface
    pub async fn fail_index(&self, surface: ApiSurface, resource: &str) {
        self.inner
            .lock()
            .await
            .failing
            .insert((surface, resource.to_string()));
    }

    /// Refuse every create of a hostgroup named `name` as a duplicate
    pub async fn force_conflict(&self, name: &str) {
        self.inner
            .lock()
            .await
            .forced_conflicts
            .insert(name.to_string());
    }

    /// Return listings newest-first instead of in creation order
    pub async fn reverse_listing(&self, reverse: bool) {
        self.inner.lock().await.reverse_listing = reverse;
    }

    /// Snapshot of every hostgroup, in creation order
    pub async fn hostgroups(&self) -> Vec<Hostgroup> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(HOSTGROUPS)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| inner.render_hostgroup(r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every call made so far, e.g. `index hostgroups`, `destroy hostgroups 4`
    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.journal.clone()
    }

    /// Number of journal entries equal to `entry`
    pub async fn count_calls(&self, entry: &str) -> usize {
        self.inner
            .lock()
            .await
            .journal
            .iter()
            .filter(|e| e.as_str() == entry)
            .count()
    }

    /// IDs passed to `destroy` on `resource`, in call order
    pub async fn destroyed(&self, resource: &str) -> Vec<EntityId> {
        let prefix = format!("destroy {} ", resource);
        self.inner
            .lock()
            .await
            .journal
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix))
            .filter_map(|id| id.parse().ok())
            .collect()
    }

    /// Number of write calls (create, update, destroy, parameter writes)
    pub async fn write_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .journal
            .iter()
            .filter(|e| {
                e.starts_with("create")
                    || e.starts_with("update")
                    || e.starts_with("destroy")
                    || e.starts_with("parameter create")
                    || e.starts_with("parameter update")
            })
            .count()
    }
}

impl Inner {
    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn collection(&self, resource: &str) -> ApiResult<&Vec<Map<String, Value>>> {
        self.collections
            .get(resource)
            .ok_or_else(|| ApiError::NotFound(format!("Resource {} not found", resource)))
    }

    fn collection_mut(&mut self, resource: &str) -> ApiResult<&mut Vec<Map<String, Value>>> {
        self.collections
            .get_mut(resource)
            .ok_or_else(|| ApiError::NotFound(format!("Resource {} not found", resource)))
    }

    fn hostgroup(&self, id: EntityId) -> Option<&Map<String, Value>> {
        self.collections
            .get(HOSTGROUPS)?
            .iter()
            .find(|r| record_id(r) == Some(id))
    }

    /// Title a hostgroup named `name` gets under `parent_id`
    fn title_for(&self, name: &str, parent_id: Option<EntityId>) -> Option<String> {
        match parent_id {
            None => Some(name.to_string()),
            Some(pid) => {
                let parent = self.hostgroup(pid)?;
                let parent_title = parent.get("title").and_then(Value::as_str)?;
                Some(format!("{}/{}", parent_title, name))
            }
        }
    }

    fn render(&self, resource: &str, record: &Map<String, Value>) -> Value {
        let mut value = record.clone();
        if resource == HOSTGROUPS {
            let params = record_id(record)
                .and_then(|id| self.parameters.get(&id))
                .cloned()
                .unwrap_or_default();
            value.insert(
                "parameters".to_string(),
                serde_json::to_value(params).unwrap_or(Value::Array(Vec::new())),
            );
        }
        Value::Object(value)
    }

    fn render_hostgroup(&self, record: &Map<String, Value>) -> Option<Hostgroup> {
        serde_json::from_value(self.render(HOSTGROUPS, record)).ok()
    }

    fn create_hostgroup(&mut self, fields: Map<String, Value>) -> ApiResult<Value> {
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::Status {
                status: 422,
                body: "Name can't be blank".to_string(),
            })?
            .to_string();
        let parent_id = fields.get("parent_id").and_then(Value::as_u64);
        let title = self.title_for(&name, parent_id).ok_or_else(|| ApiError::Status {
            status: 422,
            body: "Parent hostgroup not found".to_string(),
        })?;

        let taken = self.collection(HOSTGROUPS)?.iter().any(|r| {
            r.get("title").and_then(Value::as_str) == Some(title.as_str())
        });
        if taken || self.forced_conflicts.contains(&name) {
            return Err(ApiError::Conflict(
                r#"{"error":{"full_messages":["Name has already been taken"]}}"#.to_string(),
            ));
        }

        let id = self.allocate_id();
        let mut record = fields;
        record.insert("id".to_string(), Value::from(id));
        record.insert("title".to_string(), Value::String(title));
        record
            .entry("parent_id".to_string())
            .or_insert(Value::Null);
        self.collection_mut(HOSTGROUPS)?.push(record.clone());
        Ok(self.render(HOSTGROUPS, &record))
    }
}

fn record_id(record: &Map<String, Value>) -> Option<EntityId> {
    record.get("id").and_then(Value::as_u64)
}

fn field_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Evaluate the scoped-search subset hg-sync emits
fn matches_search(record: &Map<String, Value>, search: &str) -> bool {
    let (field, expected) = match search.strip_prefix("==") {
        Some(value) => ("name", value),
        None => match search.split_once('=') {
            Some((field, value)) => (field.trim(), value.trim()),
            None => return false,
        },
    };
    let expected = expected.trim().trim_matches('"');
    record
        .get(field)
        .and_then(field_as_string)
        .is_some_and(|actual| actual == expected)
}

/// Unwrap `{"hostgroup": {...}}` style bodies
fn unwrap_body(resource: &str, body: Value) -> Map<String, Value> {
    let singular = resource.strip_suffix('s').unwrap_or(resource);
    match body {
        Value::Object(mut map) => match map.remove(singular) {
            Some(Value::Object(inner)) => inner,
            _ => map,
        },
        _ => Map::new(),
    }
}

#[async_trait]
impl ForemanApi for InMemoryForeman {
    async fn index(
        &self,
        surface: ApiSurface,
        resource: &str,
        query: &IndexQuery,
    ) -> ApiResult<Page> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(match surface {
            ApiSurface::Primary => format!("index {}", resource),
            ApiSurface::Fallback => format!("index@fallback {}", resource),
        });

        if inner.failing.contains(&(surface, resource.to_string())) {
            return Err(ApiError::Server {
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }

        let records = inner.collection(resource)?;
        let total = records.len() as u64;
        let mut matching: Vec<&Map<String, Value>> = records
            .iter()
            .filter(|r| query.search.as_deref().map_or(true, |s| matches_search(r, s)))
            .collect();
        if inner.reverse_listing {
            matching.reverse();
        }

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let results = matching
            .iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .map(|r| inner.render(resource, r))
            .collect();

        Ok(Page {
            total: Some(total),
            subtotal: Some(matching.len() as u64),
            page: Some(page),
            per_page: Some(per_page),
            results,
        })
    }

    async fn show(&self, resource: &str, id: EntityId) -> ApiResult<Value> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(format!("show {} {}", resource, id));
        let record = inner
            .collection(resource)?
            .iter()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))?;
        Ok(inner.render(resource, record))
    }

    async fn create(&self, resource: &str, body: Value) -> ApiResult<Value> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(format!("create {}", resource));
        let fields = unwrap_body(resource, body);
        if resource == HOSTGROUPS {
            return inner.create_hostgroup(fields);
        }

        inner.collection(resource)?;
        let id = inner.allocate_id();
        let mut record = fields;
        record.insert("id".to_string(), Value::from(id));
        inner.collection_mut(resource)?.push(record.clone());
        Ok(Value::Object(record))
    }

    async fn update(&self, resource: &str, id: EntityId, body: Value) -> ApiResult<Value> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(format!("update {} {}", resource, id));
        let fields = unwrap_body(resource, body);

        let index = inner
            .collection(resource)?
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))?;

        let mut record = inner.collection(resource)?[index].clone();
        for (key, value) in fields {
            if key != "id" && key != "title" {
                record.insert(key, value);
            }
        }
        if resource == HOSTGROUPS {
            let name = record
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let parent_id = record.get("parent_id").and_then(Value::as_u64);
            if let Some(title) = inner.title_for(&name, parent_id) {
                record.insert("title".to_string(), Value::String(title));
            }
        }
        inner.collection_mut(resource)?[index] = record.clone();
        Ok(inner.render(resource, &record))
    }

    async fn destroy(&self, resource: &str, id: EntityId) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(format!("destroy {} {}", resource, id));

        let records = inner.collection(resource)?;
        let index = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))?;
        if resource == HOSTGROUPS
            && records
                .iter()
                .any(|r| r.get("parent_id").and_then(Value::as_u64) == Some(id))
        {
            return Err(ApiError::Status {
                status: 422,
                body: "Cannot delete record because of dependent children".to_string(),
            });
        }

        inner.collection_mut(resource)?.remove(index);
        inner.parameters.remove(&id);
        Ok(())
    }

    async fn list_parameters(&self, hostgroup_id: EntityId) -> ApiResult<Vec<Parameter>> {
        let mut inner = self.inner.lock().await;
        inner
            .journal
            .push(format!("parameter index {}", hostgroup_id));
        if inner.hostgroup(hostgroup_id).is_none() {
            return Err(ApiError::NotFound(format!("hostgroup {} not found", hostgroup_id)));
        }
        Ok(inner
            .parameters
            .get(&hostgroup_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_parameter(
        &self,
        hostgroup_id: EntityId,
        name: &str,
        value: &str,
    ) -> ApiResult<Parameter> {
        let mut inner = self.inner.lock().await;
        inner
            .journal
            .push(format!("parameter create {} {}", hostgroup_id, name));
        if inner.hostgroup(hostgroup_id).is_none() {
            return Err(ApiError::NotFound(format!("hostgroup {} not found", hostgroup_id)));
        }
        let exists = inner
            .parameters
            .get(&hostgroup_id)
            .is_some_and(|params| params.iter().any(|p| p.name == name));
        if exists {
            return Err(ApiError::Conflict(
                "Name has already been taken".to_string(),
            ));
        }

        let param = Parameter {
            id: inner.allocate_id(),
            name: name.to_string(),
            value: Value::String(value.to_string()),
        };
        inner
            .parameters
            .entry(hostgroup_id)
            .or_default()
            .push(param.clone());
        Ok(param)
    }

    async fn update_parameter(
        &self,
        hostgroup_id: EntityId,
        parameter_id: EntityId,
        value: &str,
    ) -> ApiResult<Parameter> {
        let mut inner = self.inner.lock().await;
        inner
            .journal
            .push(format!("parameter update {} {}", hostgroup_id, parameter_id));
        let param = inner
            .parameters
            .get_mut(&hostgroup_id)
            .and_then(|params| params.iter_mut().find(|p| p.id == parameter_id))
            .ok_or_else(|| {
                ApiError::NotFound(format!("parameter {} not found", parameter_id))
            })?;
        param.value = Value::String(value.to_string());
        Ok(param.clone())
    }
}
