//! Create-or-update of single hostgroups
//!
//! A create that hits a uniqueness conflict is turned into an update of the
//! existing record when update mode is on. The existing record is found by
//! rebuilding the title it must have from the parent's title.

use hg_api::{ConflictKind, CreateOutcome, HostgroupRepository};
use hg_core::{EntityId, Error, Hostgroup, Result, ACTIVATION_KEY_PARAMETER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assembler::{HostgroupAssembler, ACTIVATION_KEY};
use crate::model::{PropertyMap, PropertyValue};

/// What an upsert did to the remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub id: EntityId,
    pub action: UpsertAction,
}

/// Separate the activation key side channel from the payload properties.
///
/// A list of keys is joined with commas, the format the host parameter expects.
pub fn split_activation_key(
    properties: Option<&PropertyMap>,
) -> (Option<PropertyMap>, Option<String>) {
    let Some(properties) = properties else {
        return (None, None);
    };
    let mut rest = properties.clone();
    let key = rest.remove(ACTIVATION_KEY).map(|value| match value {
        PropertyValue::One(v) => v,
        PropertyValue::Many(vs) => vs.join(","),
    });
    (Some(rest), key)
}

/// Creates hostgroups, updating existing ones in update mode
#[derive(Clone)]
pub struct UpsertResolver {
    repo: HostgroupRepository,
    assembler: HostgroupAssembler,
    update_mode: bool,
}

impl UpsertResolver {
    pub fn new(repo: HostgroupRepository, assembler: HostgroupAssembler, update_mode: bool) -> Self {
        Self {
            repo,
            assembler,
            update_mode,
        }
    }

    pub fn repository(&self) -> &HostgroupRepository {
        &self.repo
    }

    /// Create `name` under `parent_id`, or update it if it exists and update mode is on
    pub async fn upsert(
        &self,
        name: &str,
        properties: Option<&PropertyMap>,
        parent_id: Option<EntityId>,
    ) -> Result<UpsertOutcome> {
        let (properties, activation_key) = split_activation_key(properties);
        let payload = self
            .assembler
            .assemble(name, properties.as_ref(), parent_id)
            .await?;

        let outcome = match self.repo.create(&payload).await? {
            CreateOutcome::Created(id) => {
                debug!("Created hostgroup {} ({})", name, id);
                UpsertOutcome {
                    id,
                    action: UpsertAction::Created,
                }
            }
            CreateOutcome::Conflict(ConflictKind::AlreadyExists { message }) => {
                if !self.update_mode {
                    debug!("Create of {} refused: {}", name, message);
                    return Err(Error::AlreadyExists {
                        name: name.to_string(),
                    });
                }

                let title = self.expected_title(name, parent_id).await?;
                let id = self.existing_id(&title).await?;
                info!("Hostgroup {} exists as {}, updating", title, id);
                self.repo.update(id, &payload).await?;
                UpsertOutcome {
                    id,
                    action: UpsertAction::Updated,
                }
            }
        };

        if let Some(key) = activation_key {
            self.apply_activation_key(outcome.id, &key).await?;
        }
        Ok(outcome)
    }

    /// Re-apply `properties` to an existing hostgroup, keeping its name and parent
    pub async fn update_properties(
        &self,
        hostgroup: &Hostgroup,
        properties: &PropertyMap,
    ) -> Result<()> {
        let (properties, activation_key) = split_activation_key(Some(properties));
        let payload = self
            .assembler
            .assemble(&hostgroup.name, properties.as_ref(), None)
            .await?;
        info!("Updating hostgroup {} ({})", hostgroup.title, hostgroup.id);
        self.repo.update(hostgroup.id, &payload).await?;

        if let Some(key) = activation_key {
            self.apply_activation_key(hostgroup.id, &key).await?;
        }
        Ok(())
    }

    /// Title the server gives `name` under `parent_id`
    async fn expected_title(&self, name: &str, parent_id: Option<EntityId>) -> Result<String> {
        match parent_id {
            Some(parent_id) => {
                let parent = self.repo.get(parent_id).await?;
                Ok(parent.child_title(name))
            }
            None => Ok(name.to_string()),
        }
    }

    async fn existing_id(&self, title: &str) -> Result<EntityId> {
        match self
            .assembler
            .resolver()
            .resolve("hostgroup", title, Some("title"))
            .await
        {
            Ok(id) => Ok(id),
            Err(Error::NotFound { .. }) => Err(Error::UpdateTargetNotFound {
                title: title.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn apply_activation_key(&self, hostgroup_id: EntityId, key: &str) -> Result<()> {
        let change = self
            .repo
            .set_parameter(hostgroup_id, ACTIVATION_KEY_PARAMETER, key)
            .await?;
        debug!(
            "{} on {}: {:?}",
            ACTIVATION_KEY_PARAMETER, hostgroup_id, change
        );
        Ok(())
    }
}
