//! Hostgroup records and payloads shared across hg-sync crates

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Server-assigned identifier of any remote record
pub type EntityId = u64;

/// Name of the host parameter that carries activation keys
pub const ACTIVATION_KEY_PARAMETER: &str = "kt_activation_keys";

/// Hostgroup as returned by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hostgroup {
    /// Hostgroup ID (monotonic in creation order)
    pub id: EntityId,
    /// Leaf label
    pub name: String,
    /// Full slash-delimited path, computed server-side
    #[serde(default)]
    pub title: String,
    /// Parent hostgroup, if any
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    /// Attached host parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Additional fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Hostgroup {
    /// Title a child named `name` would get under this hostgroup
    pub fn child_title(&self, name: &str) -> String {
        format!("{}/{}", self.title, name)
    }

    /// Look up an attached parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Host parameter attached to a hostgroup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Create/update body for a hostgroup.
///
/// Fields are kept sorted so the same inputs always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostgroupPayload {
    fields: BTreeMap<String, Value>,
}

impl HostgroupPayload {
    /// Start a payload with the mandatory `name` field
    pub fn new(name: impl Into<String>) -> Self {
        let mut payload = Self::default();
        payload.set("name", Value::String(name.into()));
        payload
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.get("parent_id").and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hostgroup() {
        let json = r#"
        {
            "id": 7,
            "name": "HH",
            "title": "CB/HH",
            "parent_id": 3,
            "domain_id": 1,
            "parameters": [
                {"id": 1, "name": "kt_activation_keys", "value": "ak-prod"}
            ]
        }
        "#;

        let hg: Hostgroup = serde_json::from_str(json).unwrap();
        assert_eq!(hg.id, 7);
        assert_eq!(hg.parent_id, Some(3));
        assert_eq!(hg.child_title("web"), "CB/HH/web");
        assert_eq!(hg.extra["domain_id"], 1);
        assert_eq!(
            hg.parameter(ACTIVATION_KEY_PARAMETER).map(|p| &p.value),
            Some(&Value::String("ak-prod".into()))
        );
    }

    #[test]
    fn test_root_hostgroup_defaults() {
        let hg: Hostgroup = serde_json::from_str(r#"{"id": 1, "name": "CB"}"#).unwrap();
        assert!(hg.parent_id.is_none());
        assert!(hg.parameters.is_empty());
    }

    #[test]
    fn test_payload_serialization() {
        let mut payload = HostgroupPayload::new("CB");
        payload.set("parent_id", Value::from(4u64));
        payload.set("domain_id", Value::from(2u64));

        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"domain_id":2,"name":"CB","parent_id":4}"#);
        assert_eq!(payload.name(), Some("CB"));
        assert_eq!(payload.parent_id(), Some(4));
    }
}
