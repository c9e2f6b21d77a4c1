//! Entity trait for declarative convergence
//!
//! An entity is one configurable object on the managed system. It knows how
//! to validate its desired state, compare it with the live system and apply
//! a single change. Everything it needs from the outside world comes in
//! through the run context `C`.

use crate::error::Result;
use crate::types::Change;
use std::fmt;

/// Core trait for converged entities
///
/// `C` is the per-run context (gateway, capabilities, caches) owned by the
/// caller and threaded through every call.
///
/// # Example
///
/// ```ignore
/// use declarative::{Change, Entity, Result};
///
/// #[derive(Debug)]
/// struct Marker { path: String }
///
/// impl Entity<()> for Marker {
///     fn id(&self) -> String { self.path.clone() }
///     fn entity_type(&self) -> &'static str { "marker" }
///     fn description(&self) -> String { format!("Marker file {}", self.path) }
///
///     fn plan(&self, _ctx: &()) -> Result<Vec<Change>> {
///         if std::path::Path::new(&self.path).exists() {
///             Ok(vec![])
///         } else {
///             Ok(vec![Change::Create { initial: vec![] }])
///         }
///     }
///
///     fn apply(&self, _change: &Change, _ctx: &()) -> Result<()> {
///         std::fs::write(&self.path, "")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Entity<C: ?Sized>: fmt::Debug {
    /// Unique identifier for this entity within its type
    ///
    /// Examples:
    /// - "lxdbr0" for a network
    /// - "profile/default/eth0" for a device
    fn id(&self) -> String;

    /// Entity type category, used for grouping and target filtering
    fn entity_type(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> String;

    /// Check the desired state before anything is queried or mutated
    fn validate(&self, _ctx: &C) -> Result<()> {
        Ok(())
    }

    /// Load the current state and compute the ordered changes
    fn plan(&self, ctx: &C) -> Result<Vec<Change>>;

    /// Apply one change through the context's gateway
    fn apply(&self, change: &Change, ctx: &C) -> Result<()>;
}

/// A boxed entity for type-erased storage
pub type BoxedEntity<C> = Box<dyn Entity<C>>;
