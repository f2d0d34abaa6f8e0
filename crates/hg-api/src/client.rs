//! Native Foreman/Satellite API client
//!
//! Provides REST access to the resource collections hg-sync touches
//! (hostgroups, their parameters, and every collection a property can
//! reference). Requests use HTTP basic authentication and are scoped to a
//! single organization.

use async_trait::async_trait;
use hg_core::{EntityId, Error, Parameter, Settings};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::api::{ApiSurface, ForemanApi, IndexQuery, Page};
use crate::error::{ApiError, ApiResult};

/// Foreman API client
pub struct ForemanClient {
    client: Client,
    base_url: String,
    primary_api: String,
    fallback_api: String,
    organization_id: String,
    user: String,
    pass: Option<String>,
    per_page: u32,
}

impl ForemanClient {
    /// Create a client from run settings
    pub fn from_settings(settings: &Settings) -> hg_core::Result<Self> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.uri.trim_end_matches('/').to_string(),
            primary_api: normalize_prefix(&settings.primary_api),
            fallback_api: normalize_prefix(&settings.fallback_api),
            organization_id: settings.organization_id.clone(),
            user: settings.user.clone(),
            pass: settings.pass.clone(),
            per_page: settings.per_page,
        })
    }

    fn prefix(&self, surface: ApiSurface) -> &str {
        match surface {
            ApiSurface::Primary => &self.primary_api,
            ApiSurface::Fallback => &self.fallback_api,
        }
    }

    fn url(&self, surface: ApiSurface, path: &str) -> String {
        format!("{}{}/{}", self.base_url, self.prefix(surface), path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.user, self.pass.as_deref())
            .header("Accept", "application/json")
    }

    /// Send a request and decode the JSON body of a successful response
    async fn send<R: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<R> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }

        resp.json::<R>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Merge the organization scope into a create body
    fn scoped_body(&self, body: Value) -> Value {
        match body {
            Value::Object(mut map) => {
                map.entry("organization_id")
                    .or_insert_with(|| Value::String(self.organization_id.clone()));
                Value::Object(map)
            }
            other => other,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn normalize_prefix(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

#[async_trait]
impl ForemanApi for ForemanClient {
    async fn index(
        &self,
        surface: ApiSurface,
        resource: &str,
        query: &IndexQuery,
    ) -> ApiResult<Page> {
        let url = self.url(surface, resource);
        debug!("GET {} {:?}", url, query);
        let req = self
            .client
            .get(&url)
            .query(&[("organization_id", self.organization_id.as_str())])
            .query(query);
        self.send(req).await
    }

    async fn show(&self, resource: &str, id: EntityId) -> ApiResult<Value> {
        let url = self.url(ApiSurface::Primary, &format!("{}/{}", resource, id));
        debug!("GET {}", url);
        self.send(self.client.get(&url)).await
    }

    async fn create(&self, resource: &str, body: Value) -> ApiResult<Value> {
        let url = self.url(ApiSurface::Primary, resource);
        debug!("POST {}", url);
        let req = self.client.post(&url).json(&self.scoped_body(body));
        self.send(req).await
    }

    async fn update(&self, resource: &str, id: EntityId, body: Value) -> ApiResult<Value> {
        let url = self.url(ApiSurface::Primary, &format!("{}/{}", resource, id));
        debug!("PUT {}", url);
        self.send(self.client.put(&url).json(&body)).await
    }

    async fn destroy(&self, resource: &str, id: EntityId) -> ApiResult<()> {
        let url = self.url(ApiSurface::Primary, &format!("{}/{}", resource, id));
        debug!("DELETE {}", url);
        let _: Value = self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn list_parameters(&self, hostgroup_id: EntityId) -> ApiResult<Vec<Parameter>> {
        let url = self.url(
            ApiSurface::Primary,
            &format!("hostgroups/{}/parameters", hostgroup_id),
        );
        let mut parameters = Vec::new();
        let mut page_no = 1;
        loop {
            debug!("GET {} (page {})", url, page_no);
            let query = IndexQuery::default().page(page_no, self.per_page);
            let page: Page = self.send(self.client.get(&url).query(&query)).await?;
            let fetched = page.results.len();
            for result in page.results {
                parameters.push(
                    serde_json::from_value(result).map_err(|e| ApiError::Decode(e.to_string()))?,
                );
            }
            if fetched == 0 || fetched < self.per_page as usize {
                break;
            }
            page_no += 1;
        }
        Ok(parameters)
    }

    async fn create_parameter(
        &self,
        hostgroup_id: EntityId,
        name: &str,
        value: &str,
    ) -> ApiResult<Parameter> {
        let url = self.url(
            ApiSurface::Primary,
            &format!("hostgroups/{}/parameters", hostgroup_id),
        );
        debug!("POST {}", url);
        let body = json!({ "parameter": { "name": name, "value": value } });
        self.send(self.client.post(&url).json(&body)).await
    }

    async fn update_parameter(
        &self,
        hostgroup_id: EntityId,
        parameter_id: EntityId,
        value: &str,
    ) -> ApiResult<Parameter> {
        let url = self.url(
            ApiSurface::Primary,
            &format!("hostgroups/{}/parameters/{}", hostgroup_id, parameter_id),
        );
        debug!("PUT {}", url);
        let body = json!({ "parameter": { "value": value } });
        self.send(self.client.put(&url).json(&body)).await
    }
}
