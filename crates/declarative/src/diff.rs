//! Property-level diff between desired and current state
//!
//! The entry point is [`plan_changes`]. It walks a property table in
//! declaration order and emits the smallest list of [`Change`]s that turns
//! `current` into `desired`:
//!
//! - no current snapshot: a single `Create` carrying every explicitly set,
//!   non-nil property
//! - scalars take part when explicitly set or defaulted
//! - namespaces take part only when explicitly set, and are diffed key by key

use crate::property::{Class, PropertyDef, PropertySet, Snapshot};
use crate::types::{Assignment, Change, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the ordered changes for one entity
pub fn plan_changes(
    table: &[PropertyDef],
    desired: &PropertySet,
    current: Option<&Snapshot>,
) -> Vec<Change> {
    match current {
        None => vec![Change::Create {
            initial: creation_arguments(table, desired),
        }],
        Some(current) => property_changes(table, desired, current),
    }
}

/// Initial arguments for creating an entity.
///
/// Defaults are left to the daemon; only what the caller set is sent.
pub fn creation_arguments(table: &[PropertyDef], desired: &PropertySet) -> Vec<Assignment> {
    let mut args = Vec::new();
    for def in table.iter().filter(|d| d.class == Class::Desired) {
        match desired.get(def.name) {
            Some(Value::Map(map)) => {
                let prefix = def.wire_key();
                args.extend(map.iter().filter_map(|(key, value)| {
                    value
                        .as_ref()
                        .map(|v| Assignment::new(format!("{}.{}", prefix, key), v.clone()))
                }));
            }
            Some(value) => args.push(Assignment::new(def.wire_key(), value.to_wire())),
            None => {}
        }
    }
    args
}

/// Set/unset changes against an existing entity
pub fn property_changes(
    table: &[PropertyDef],
    desired: &PropertySet,
    current: &Snapshot,
) -> Vec<Change> {
    let mut changes = Vec::new();
    for def in table.iter().filter(|d| d.class == Class::Desired) {
        if def.is_namespace() {
            if !desired.is_set(def.name) {
                continue;
            }
            let empty = BTreeMap::new();
            let want = desired.get(def.name).and_then(Value::as_map).unwrap_or(&empty);
            let have = current.get(def.name).and_then(Value::as_map);
            changes.extend(diff_namespace(def, want, have));
        } else {
            let explicit = desired.is_set(def.name);
            if !explicit && def.default.is_none() {
                continue;
            }
            if let Some(change) =
                diff_scalar(def, desired.effective(def), current.get(def.name), explicit)
            {
                changes.push(change);
            }
        }
    }
    changes
}

/// Compare one scalar property.
///
/// A value that only comes from the default is not pushed to an entity
/// that has nothing set for it.
pub fn diff_scalar(
    def: &PropertyDef,
    desired: Option<Value>,
    current: Option<&Value>,
    explicit: bool,
) -> Option<Change> {
    match (desired, current) {
        (None, None) => None,
        (None, Some(_)) => Some(Change::unset(def.wire_key())),
        (Some(_), None) if !explicit => None,
        (Some(want), have) if have == Some(&want) => None,
        (Some(want), _) => Some(Change::set(def.wire_key(), want.to_wire())),
    }
}

/// Key-level symmetric diff of a namespace property
pub fn diff_namespace(
    def: &PropertyDef,
    desired: &BTreeMap<String, Option<String>>,
    current: Option<&BTreeMap<String, Option<String>>>,
) -> Vec<Change> {
    let empty = BTreeMap::new();
    let current = current.unwrap_or(&empty);
    let prefix = def.wire_key();

    let keys: BTreeSet<&String> = desired.keys().chain(current.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let want = desired.get(key).and_then(Option::as_ref);
            let have = current.get(key).and_then(Option::as_ref);
            let wire_key = format!("{}.{}", prefix, key);
            match (want, have) {
                (Some(w), Some(h)) if w == h => None,
                (Some(w), _) => Some(Change::set(wire_key, w.clone())),
                (None, Some(_)) => Some(Change::unset(wire_key)),
                (None, None) => None,
            }
        })
        .collect()
}
