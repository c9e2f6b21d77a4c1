//! Convergence plan - the ordered list of entities for one run

use crate::resource::{BoxedEntity, Entity};

/// Entities in the order they are converged
///
/// There is no dependency sorting: callers push entities in the order the
/// daemon needs them (pools and networks before the profiles using them).
pub struct ConvergencePlan<C: ?Sized> {
    pub entities: Vec<BoxedEntity<C>>,
}

impl<C: ?Sized> ConvergencePlan<C> {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
        }
    }

    pub fn push(&mut self, entity: BoxedEntity<C>) {
        self.entities.push(entity);
    }

    /// Filter plan to only include entities matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Entity<C>) -> bool,
    {
        Self {
            entities: self
                .entities
                .into_iter()
                .filter(|e| predicate(e.as_ref()))
                .collect(),
        }
    }

    /// Filter plan to only include entities matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (entity_type, name) = parse_target(t);
                self.filter(|e| matches_filter(e, entity_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of entities in the plan
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedEntity<C>> {
        self.entities.iter()
    }
}

impl<C: ?Sized> Default for ConvergencePlan<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a target string like "type.name" into (type, name)
///
/// Only the first dot separates; entity names may contain dots.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some(("", name)) => (None, Some(name.to_string())),
        Some((kind, name)) => (Some(kind.to_string()), Some(name.to_string())),
    }
}

/// Check if an entity matches the filter criteria
fn matches_filter<C: ?Sized>(
    entity: &dyn Entity<C>,
    entity_type: Option<&str>,
    name: Option<&str>,
) -> bool {
    if let Some(et) = entity_type {
        // Allow plural and short aliases
        let wanted = match et {
            "storage" | "pools" | "storage_pools" => "storage_pool",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        if entity.entity_type() != wanted && entity.entity_type() != et {
            return false;
        }
    }

    if let Some(n) = name
        && !entity.id().contains(n)
    {
        return false;
    }

    true
}
