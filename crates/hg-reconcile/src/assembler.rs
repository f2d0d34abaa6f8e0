//! Hostgroup payload assembly

use hg_core::{EntityId, HostgroupPayload, Result};
use serde_json::Value;
use tracing::debug;

use crate::model::{PropertyMap, PropertyValue};
use crate::resolver::PropertyResolver;

/// Property handled as a host parameter instead of a payload field
pub const ACTIVATION_KEY: &str = "activation_key";

/// Payload field a property is written to
///
/// Besides the `<key>_id` rule, a list value on a plain key is written to
/// the plural `<key>_ids` field as an array of IDs.
pub fn field_name(key: &str, value: &PropertyValue) -> String {
    match key {
        // the only scalar reference the API expects as a list
        "location" => "location_ids".to_string(),
        "installation_media" | "media" => "medium_id".to_string(),
        _ if key.ends_with("_id") || key.ends_with("_ids") => key.to_string(),
        _ => match value {
            PropertyValue::One(_) => format!("{}_id", key),
            PropertyValue::Many(_) => format!("{}_ids", key),
        },
    }
}

/// Builds create/update payloads, resolving property references on the way
#[derive(Clone)]
pub struct HostgroupAssembler {
    resolver: PropertyResolver,
}

impl HostgroupAssembler {
    pub fn new(resolver: PropertyResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PropertyResolver {
        &self.resolver
    }

    /// Build the payload for `name` with its resolved properties and parent
    pub async fn assemble(
        &self,
        name: &str,
        properties: Option<&PropertyMap>,
        parent_id: Option<EntityId>,
    ) -> Result<HostgroupPayload> {
        let mut payload = HostgroupPayload::new(name);

        for (key, value) in properties.into_iter().flatten() {
            if key == ACTIVATION_KEY {
                continue;
            }
            let field = field_name(key, value);
            let mut ids = Vec::new();
            for item in value.values() {
                ids.push(self.resolver.resolve(key, item, None).await?);
            }
            let resolved = if field.ends_with("_ids") {
                Value::from(ids)
            } else {
                ids.first().copied().map(Value::from).unwrap_or(Value::Null)
            };
            debug!("{}: {} -> {} = {}", name, key, field, resolved);
            payload.set(field, resolved);
        }

        if let Some(parent_id) = parent_id {
            payload.set("parent_id", Value::from(parent_id));
        }
        Ok(payload)
    }
}
