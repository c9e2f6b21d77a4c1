//! # Declarative
//!
//! A property-table convergence engine.
//!
//! Entities declare their configurable properties in static tables. The
//! engine coerces configured values, loads the current values reported by
//! the managed system, and emits the minimal ordered list of changes that
//! reconciles the two.
//!
//! ## Core Concepts
//!
//! - **PropertyDef**: static descriptor (kind, class, default, constraint, wire key)
//! - **PropertySet / Snapshot**: desired and current values, both normalized
//! - **Change**: one mutating step (create, set, unset, delete, replace)
//! - **Entity**: something that validates, plans and applies its changes
//! - **Executor**: converges a plan of entities sequentially
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{plan_changes, PropertyDef, PropertySet, RawValue, Snapshot};
//!
//! const TABLE: &[PropertyDef] = &[
//!     PropertyDef::bool("boot_autostart"),
//!     PropertyDef::map("environment"),
//! ];
//!
//! let desired = PropertySet::from_raw(TABLE, [("boot_autostart", RawValue::from(true))])?;
//! let current = Snapshot::from_wire(TABLE, [("boot.autostart", RawValue::from("false"))])?;
//!
//! // [Set boot.autostart=true]
//! let changes = plan_changes(TABLE, &desired, Some(&current));
//! ```
//!
//! ## Provider Traits
//!
//! - [`Gateway`]: runs commands against the managed system
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod property;
pub mod resource;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, Gateway, NoProgress, ProgressCallback};
pub use diff::{creation_arguments, diff_namespace, diff_scalar, plan_changes, property_changes};
pub use error::{Error, Result};
pub use executor::{execute, execute_simple};
pub use planner::ConvergencePlan;
pub use property::{Class, Constraint, DefaultValue, Kind, PropertyDef, PropertySet, Snapshot};
pub use resource::{BoxedEntity, Entity};
pub use types::{
    ApplyResult, Assignment, Change, Command, CommandOutput, ExecuteOptions, ExecuteSummary,
    RawValue, Value,
};
pub use validate::{RuleSet, validate};
