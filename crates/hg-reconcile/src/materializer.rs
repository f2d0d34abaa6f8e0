//! Tree materialization
//!
//! Walks the declared tree depth-first in declaration order and upserts
//! every member of every referenced category under its parent.

use async_recursion::async_recursion;
use hg_core::{EntityId, Error, Result};
use serde::Serialize;
use tracing::info;

use crate::model::{CategoryMap, TreeNode};
use crate::upsert::{UpsertAction, UpsertResolver};

/// A hostgroup the walk created, updated or (in dry mode) would create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedNode {
    pub depth: usize,
    pub category: String,
    pub name: String,
    /// `None` in dry mode
    pub id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub action: Option<UpsertAction>,
}

fn indent(depth: usize) -> String {
    "|__".repeat(depth)
}

/// Materializes a declared tree through an [`UpsertResolver`]
pub struct TreeMaterializer<'a> {
    upsert: &'a UpsertResolver,
    categories: &'a CategoryMap,
    dry_run: bool,
}

impl<'a> TreeMaterializer<'a> {
    pub fn new(upsert: &'a UpsertResolver, categories: &'a CategoryMap, dry_run: bool) -> Self {
        Self {
            upsert,
            categories,
            dry_run,
        }
    }

    /// Materialize `tree` at the root
    pub async fn materialize(&self, tree: &TreeNode) -> Result<Vec<MaterializedNode>> {
        let mut nodes = Vec::new();
        self.walk(tree, 0, None, &mut nodes).await?;
        Ok(nodes)
    }

    #[async_recursion]
    async fn walk(
        &self,
        node: &TreeNode,
        depth: usize,
        parent_id: Option<EntityId>,
        out: &mut Vec<MaterializedNode>,
    ) -> Result<()> {
        match node {
            TreeNode::Siblings(nodes) => {
                for sibling in nodes {
                    self.walk(sibling, depth, parent_id, out).await?;
                }
            }
            TreeNode::Category { name, child } => {
                let members = self
                    .categories
                    .get(name)
                    .ok_or_else(|| Error::UnknownCategory(name.clone()))?;
                info!("{}# Category: {}", indent(depth), name);

                for member in members {
                    let (id, action) = if self.dry_run {
                        (None, None)
                    } else {
                        let outcome = self
                            .upsert
                            .upsert(member.name(), member.properties(), parent_id)
                            .await?;
                        (Some(outcome.id), Some(outcome.action))
                    };
                    info!(
                        "{}{}({}), parent-id: {}",
                        indent(depth),
                        member.name(),
                        id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                        parent_id.map_or_else(|| "None".to_string(), |id| id.to_string()),
                    );
                    out.push(MaterializedNode {
                        depth,
                        category: name.clone(),
                        name: member.name().to_string(),
                        id,
                        parent_id,
                        action,
                    });

                    if let Some(child) = child {
                        self.walk(child, depth + 1, id, out).await?;
                    }
                }
            }
        }
        Ok(())
    }
}
