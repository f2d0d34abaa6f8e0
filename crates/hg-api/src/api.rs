//! Generic resource-oriented request interface

use async_trait::async_trait;
use hg_core::{EntityId, Parameter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;

/// Which API surface a request goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiSurface {
    /// Current API version
    Primary,
    /// Older API version, for resources the primary surface chokes on
    Fallback,
}

/// Parameters of an `index` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexQuery {
    /// Scoped search expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl IndexQuery {
    pub fn search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Default::default()
        }
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }
}

/// One page of an `index` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub total: Option<u64>,
    /// Number of records matching the search, across all pages
    #[serde(default)]
    pub subtotal: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl Page {
    /// Matching record count: `subtotal` when reported, else the page length
    pub fn match_count(&self) -> u64 {
        self.subtotal.unwrap_or(self.results.len() as u64)
    }
}

/// Foreman reports `page`/`per_page` as numbers or numeric strings
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Remote management API.
///
/// `resource` is the plural collection name (`hostgroups`, `domains`, ...).
/// Implementations scope every call to their configured organization.
#[async_trait]
pub trait ForemanApi: Send + Sync {
    /// List one page of a collection
    async fn index(&self, surface: ApiSurface, resource: &str, query: &IndexQuery)
        -> ApiResult<Page>;

    /// Fetch a single record
    async fn show(&self, resource: &str, id: EntityId) -> ApiResult<Value>;

    /// Create a record; `body` is the full request body including the wrapper key
    async fn create(&self, resource: &str, body: Value) -> ApiResult<Value>;

    /// Update a record; `body` is the full request body including the wrapper key
    async fn update(&self, resource: &str, id: EntityId, body: Value) -> ApiResult<Value>;

    /// Delete a record
    async fn destroy(&self, resource: &str, id: EntityId) -> ApiResult<()>;

    /// List the host parameters of a hostgroup
    async fn list_parameters(&self, hostgroup_id: EntityId) -> ApiResult<Vec<Parameter>>;

    /// Add a host parameter to a hostgroup
    async fn create_parameter(
        &self,
        hostgroup_id: EntityId,
        name: &str,
        value: &str,
    ) -> ApiResult<Parameter>;

    /// Change the value of an existing host parameter
    async fn update_parameter(
        &self,
        hostgroup_id: EntityId,
        parameter_id: EntityId,
        value: &str,
    ) -> ApiResult<Parameter>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_parsing() {
        let json = r#"
        {
            "total": 12,
            "subtotal": 2,
            "page": "1",
            "per_page": 20,
            "search": "==CB",
            "results": [{"id": 1}, {"id": 2}]
        }
        "#;

        let page: Page = serde_json::from_str(json).unwrap();
        assert_eq!(page.page, Some(1));
        assert_eq!(page.per_page, Some(20));
        assert_eq!(page.match_count(), 2);
    }

    #[test]
    fn test_match_count_without_subtotal() {
        let page: Page = serde_json::from_str(r#"{"results": [{"id": 1}]}"#).unwrap();
        assert_eq!(page.match_count(), 1);
    }

    #[test]
    fn test_query_serialization() {
        let query = IndexQuery::search("title=\"CB\"").page(2, 50);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["search"], "title=\"CB\"");
        assert_eq!(json["page"], 2);

        let json = serde_json::to_value(IndexQuery::default()).unwrap();
        assert!(json.get("search").is_none());
    }
}
