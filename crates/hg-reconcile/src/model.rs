//! Declarative hostgroup configuration
//!
//! ```yaml
//! settings:
//!   uri: https://satellite.example.com
//!   update: true
//! categories:
//!   site:
//!     - CB:
//!         location: CB
//!     - HH
//!   role:
//!     - web:
//!         activation_key: ak-web
//! tree:
//!   site:
//!     role:
//! combos:
//!   - name: cb-web
//!     categories: [[CB], [web]]
//!     parameters:
//!       domain: cb.example.com
//! ```

use hg_core::{Error, Result, SettingsOverrides};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Render a YAML scalar as the string the remote search expects
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

/// Value of a property: a single reference or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum PropertyValue {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<Value> for PropertyValue {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        if let Some(s) = scalar_to_string(&value) {
            return Ok(PropertyValue::One(s));
        }
        match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| format!("property list items must be scalars, got {}", describe(item)))
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(PropertyValue::Many),
            other => Err(format!("unsupported property value {}", describe(&other))),
        }
    }
}

impl PropertyValue {
    /// Every referenced value, in order
    pub fn values(&self) -> Vec<&str> {
        match self {
            PropertyValue::One(v) => vec![v.as_str()],
            PropertyValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::One(value.to_string())
    }
}

/// Property type label -> value
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// One entry of a category: a bare name or a name with properties
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Member {
    Bare(String),
    WithProperties {
        name: String,
        properties: Option<PropertyMap>,
    },
}

impl TryFrom<Value> for Member {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        if let Some(name) = scalar_to_string(&value) {
            return Ok(Member::Bare(name));
        }
        match value {
            Value::Mapping(map) if map.len() == 1 => {
                let Some((key, props)) = map.into_iter().next() else {
                    return Err("empty member mapping".to_string());
                };
                let name = scalar_to_string(&key)
                    .ok_or_else(|| format!("member name must be a scalar, got {}", describe(&key)))?;
                let properties = if props.is_null() {
                    None
                } else {
                    Some(serde_yaml::from_value(props).map_err(|e| e.to_string())?)
                };
                Ok(Member::WithProperties { name, properties })
            }
            other => Err(format!(
                "a category member must be a name or a single-key mapping, got {}",
                describe(&other)
            )),
        }
    }
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Bare(name) | Member::WithProperties { name, .. } => name,
        }
    }

    pub fn properties(&self) -> Option<&PropertyMap> {
        match self {
            Member::Bare(_) => None,
            Member::WithProperties { properties, .. } => properties.as_ref(),
        }
    }
}

/// Category name -> ordered members
pub type CategoryMap = BTreeMap<String, Vec<Member>>;

/// Declared hostgroup tree
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum TreeNode {
    /// Every member of `name` gets `child` materialized beneath it
    Category {
        name: String,
        child: Option<Box<TreeNode>>,
    },
    /// Nodes at the same depth, sharing the same parent
    Siblings(Vec<TreeNode>),
}

impl TryFrom<Value> for TreeNode {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        if let Some(name) = scalar_to_string(&value) {
            return Ok(TreeNode::Category { name, child: None });
        }
        match value {
            Value::Mapping(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "a tree mapping must have exactly one category key, got {}",
                        map.len()
                    ));
                }
                let Some((key, sub)) = map.into_iter().next() else {
                    return Err("empty tree mapping".to_string());
                };
                let name = scalar_to_string(&key)
                    .ok_or_else(|| format!("category name must be a scalar, got {}", describe(&key)))?;
                let child = if sub.is_null() {
                    None
                } else {
                    Some(Box::new(TreeNode::try_from(sub)?))
                };
                Ok(TreeNode::Category { name, child })
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(TreeNode::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(TreeNode::Siblings),
            other => Err(format!("unsupported tree node {}", describe(&other))),
        }
    }
}

impl TreeNode {
    /// Leaf category reference
    pub fn leaf(name: impl Into<String>) -> Self {
        TreeNode::Category {
            name: name.into(),
            child: None,
        }
    }

    /// Category reference with a sub-tree
    pub fn branch(name: impl Into<String>, child: TreeNode) -> Self {
        TreeNode::Category {
            name: name.into(),
            child: Some(Box::new(child)),
        }
    }

    /// Number of category levels on the deepest path
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Category { child, .. } => 1 + child.as_deref().map_or(0, TreeNode::depth),
            TreeNode::Siblings(nodes) => nodes.iter().map(TreeNode::depth).max().unwrap_or(0),
        }
    }

    /// Every category referenced anywhere in the tree, in walk order
    pub fn category_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            TreeNode::Category { name, child } => {
                names.push(name);
                if let Some(child) = child {
                    child.collect_names(names);
                }
            }
            TreeNode::Siblings(nodes) => nodes.iter().for_each(|n| n.collect_names(names)),
        }
    }
}

/// One dimension of a combo, possibly nested
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Selector {
    One(String),
    Many(Vec<Selector>),
}

impl TryFrom<Value> for Selector {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        if let Some(s) = scalar_to_string(&value) {
            return Ok(Selector::One(s));
        }
        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(Selector::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Selector::Many),
            other => Err(format!("unsupported combo selector {}", describe(&other))),
        }
    }
}

impl Selector {
    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Many(values.into_iter().map(|v| Selector::One(v.into())).collect())
    }
}

/// Bulk parameter rule applied to every hostgroup matching a combination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Combo {
    pub name: String,
    /// Dimensions whose cartesian product selects hostgroups
    #[serde(default)]
    pub categories: Vec<Selector>,
    #[serde(default)]
    pub parameters: PropertyMap,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeclaredConfig {
    #[serde(default)]
    pub settings: Option<SettingsOverrides>,
    #[serde(default)]
    pub categories: CategoryMap,
    #[serde(default)]
    pub tree: Option<TreeNode>,
    #[serde(default)]
    pub combos: Vec<Combo>,
}

impl DeclaredConfig {
    /// Parse a YAML document and check category references
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: DeclaredConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading hostgroup config from {}", path.display());
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Every category referenced by the tree must be declared
    pub fn validate(&self) -> Result<()> {
        if let Some(tree) = &self.tree {
            if let Some(missing) = tree
                .category_names()
                .into_iter()
                .find(|name| !self.categories.contains_key(*name))
            {
                return Err(Error::UnknownCategory(missing.to_string()));
            }
        }
        Ok(())
    }
}
