//! Combo matching
//!
//! A combo names one or more dimensions. Their cartesian product gives the
//! combinations; a hostgroup matches a combination when each element shows
//! up as a path segment prefix in its title. `/CB` therefore also matches
//! `/CBX`, which callers have to keep in mind when naming members.

use hg_api::HostgroupRepository;
use hg_core::{Hostgroup, Result};
use tracing::{debug, warn};

use crate::model::Selector;

/// One element per dimension, in dimension order
pub type Combination = Vec<String>;

/// Flatten a possibly nested selector into its values, in order
pub fn flatten(selector: &Selector) -> Vec<String> {
    match selector {
        Selector::One(value) => vec![value.clone()],
        Selector::Many(items) => items.iter().flat_map(flatten).collect(),
    }
}

/// Cartesian product of `dimensions`, first dimension varying slowest
pub fn expand(dimensions: &[Selector]) -> Vec<Combination> {
    if dimensions.is_empty() {
        return Vec::new();
    }
    dimensions
        .iter()
        .map(flatten)
        .fold(vec![Vec::new()], |acc, values| {
            acc.iter()
                .flat_map(|prefix| {
                    values.iter().map(move |value| {
                        let mut combination = prefix.clone();
                        combination.push(value.clone());
                        combination
                    })
                })
                .collect()
        })
}

/// Whether `title` carries every element of `combination` as a path segment
pub fn matches(title: &str, combination: &[String]) -> bool {
    combination
        .iter()
        .all(|element| title.contains(&format!("/{}", element)))
}

/// Every (entity, combination) hit, entities outermost; duplicates are kept
pub fn match_entities(entities: &[Hostgroup], combinations: &[Combination]) -> Vec<Hostgroup> {
    let mut matched = Vec::new();
    for entity in entities {
        let hits = combinations
            .iter()
            .filter(|combination| matches(&entity.title, combination))
            .count();
        if hits > 1 {
            warn!(
                "Hostgroup {} matches {} combinations and will be updated {} times",
                entity.title, hits, hits
            );
        }
        matched.extend(std::iter::repeat(entity.clone()).take(hits));
    }
    matched
}

/// Finds the remote hostgroups a set of dimensions selects
pub struct CombinatorialMatcher {
    repo: HostgroupRepository,
}

impl CombinatorialMatcher {
    pub fn new(repo: HostgroupRepository) -> Self {
        Self { repo }
    }

    /// Expand `dimensions` and match them against a fresh listing
    pub async fn find(&self, dimensions: &[Selector]) -> Result<(Vec<Combination>, Vec<Hostgroup>)> {
        let combinations = expand(dimensions);
        if combinations.is_empty() {
            debug!("No combinations to match");
            return Ok((combinations, Vec::new()));
        }
        let entities = self.repo.list_all().await?;
        let matched = match_entities(&entities, &combinations);
        debug!(
            "{} combinations matched {} of {} hostgroups",
            combinations.len(),
            matched.len(),
            entities.len()
        );
        Ok((combinations, matched))
    }
}
