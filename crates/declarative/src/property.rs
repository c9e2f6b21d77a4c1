//! Property tables, coercion and snapshots
//!
//! Every entity type declares its configurable properties once, as a
//! `&'static [PropertyDef]`. The table drives everything else: coercion of
//! configuration input, reverse translation of daemon output, and the diff.

use crate::error::{Error, Result};
use crate::types::{RawValue, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Shape of a property's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Str,
    /// Lowercase symbol from a closed set
    Sym(&'static [&'static str]),
    /// Sub-namespace whose keys live under the property's wire key as a prefix
    Map,
}

/// How a property takes part in convergence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    /// Locates the entity; compared only to detect illegal transitions
    Identity,
    /// Participates in the diff
    Desired,
    /// Read from snapshots for information, never diffed or configured
    Transient,
}

/// Static default for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Inclusive integer range
    Range(i64, i64),
}

/// Static descriptor for one configurable property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: &'static str,
    pub kind: Kind,
    pub class: Class,
    pub default: Option<DefaultValue>,
    pub constraint: Option<Constraint>,
    /// Wire key override; `None` means `name` with `_` replaced by `.`
    pub wire: Option<&'static str>,
}

impl PropertyDef {
    const fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            class: Class::Desired,
            default: None,
            constraint: None,
            wire: None,
        }
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, Kind::Bool)
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, Kind::Int)
    }

    pub const fn str(name: &'static str) -> Self {
        Self::new(name, Kind::Str)
    }

    pub const fn sym(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::new(name, Kind::Sym(allowed))
    }

    pub const fn map(name: &'static str) -> Self {
        Self::new(name, Kind::Map)
    }

    pub const fn default_bool(mut self, value: bool) -> Self {
        self.default = Some(DefaultValue::Bool(value));
        self
    }

    pub const fn default_int(mut self, value: i64) -> Self {
        self.default = Some(DefaultValue::Int(value));
        self
    }

    pub const fn default_str(mut self, value: &'static str) -> Self {
        self.default = Some(DefaultValue::Str(value));
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.constraint = Some(Constraint::Range(min, max));
        self
    }

    pub const fn wire(mut self, key: &'static str) -> Self {
        self.wire = Some(key);
        self
    }

    pub const fn identity(mut self) -> Self {
        self.class = Class::Identity;
        self
    }

    pub const fn transient(mut self) -> Self {
        self.class = Class::Transient;
        self
    }

    /// Key used by the daemon for this property (or namespace prefix for maps)
    pub fn wire_key(&self) -> Cow<'static, str> {
        match self.wire {
            Some(key) => Cow::Borrowed(key),
            None => Cow::Owned(self.name.replace('_', ".")),
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, Kind::Map)
    }

    /// Coerced default, if the property declares one
    pub fn default_value(&self) -> Option<Value> {
        let raw = match self.default? {
            DefaultValue::Bool(b) => RawValue::Bool(b),
            DefaultValue::Int(i) => RawValue::Int(i),
            DefaultValue::Str(s) => RawValue::Str(s.to_string()),
        };
        self.coerce(&raw).ok().flatten()
    }

    /// Normalize raw input.
    ///
    /// An empty string means "unset" and yields `None`. Constraint
    /// violations fail here, long before anything is sent to the daemon.
    pub fn coerce(&self, raw: &RawValue) -> Result<Option<Value>> {
        if matches!(raw, RawValue::Str(s) if s.is_empty()) {
            return Ok(None);
        }

        let value = match self.kind {
            Kind::Bool => match raw {
                RawValue::Bool(b) => Value::Bool(*b),
                RawValue::Str(_) | RawValue::Int(_) => {
                    Value::Bool(raw.to_text().eq_ignore_ascii_case("true"))
                }
                _ => return Err(self.invalid("expected a boolean")),
            },
            Kind::Int => match raw {
                RawValue::Int(i) => Value::Int(*i),
                RawValue::Str(s) => Value::Int(
                    s.trim()
                        .parse()
                        .map_err(|_| self.invalid(format!("'{}' is not an integer", s)))?,
                ),
                _ => return Err(self.invalid("expected an integer")),
            },
            Kind::Str => match raw {
                RawValue::Table(_) => return Err(self.invalid("expected a string")),
                _ => {
                    let text = raw.to_text();
                    if text.is_empty() {
                        return Ok(None);
                    }
                    Value::Str(text)
                }
            },
            Kind::Sym(allowed) => match raw {
                RawValue::Str(_) | RawValue::Bool(_) | RawValue::Int(_) => {
                    let sym = raw.to_text().to_lowercase();
                    if !allowed.contains(&sym.as_str()) {
                        return Err(self.invalid(format!(
                            "'{}' is not one of {}",
                            sym,
                            allowed.join(", ")
                        )));
                    }
                    Value::Sym(sym)
                }
                _ => return Err(self.invalid("expected a symbol")),
            },
            Kind::Map => match raw {
                RawValue::Table(table) => Value::Map(
                    table
                        .iter()
                        .map(|(k, v)| {
                            let text = v.to_text();
                            (k.clone(), (!text.is_empty()).then_some(text))
                        })
                        .collect(),
                ),
                _ => return Err(self.invalid("expected a table")),
            },
        };

        if let (Some(Constraint::Range(min, max)), Value::Int(i)) = (self.constraint, &value)
            && !(min..=max).contains(i)
        {
            return Err(self.invalid(format!("out of range ({}-{})", min, max)));
        }

        Ok(Some(value))
    }

    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::invalid(self.name, message)
    }
}

/// Look up a property by name
pub fn find<'t>(table: &'t [PropertyDef], name: &str) -> Option<&'t PropertyDef> {
    table.iter().find(|def| def.name == name)
}

/// Reverse-translate a wire key.
///
/// Exact scalar keys win; otherwise the key is matched against namespace
/// prefixes and the remainder is returned as the namespace key.
pub fn find_wire<'t, 'k>(
    table: &'t [PropertyDef],
    wire_key: &'k str,
) -> Option<(&'t PropertyDef, Option<&'k str>)> {
    if let Some(def) = table
        .iter()
        .find(|def| !def.is_namespace() && def.wire_key() == wire_key)
    {
        return Some((def, None));
    }

    table.iter().filter(|def| def.is_namespace()).find_map(|def| {
        let prefix = def.wire_key();
        wire_key
            .strip_prefix(prefix.as_ref())
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| (def, Some(rest)))
    })
}

/// Desired property values, as configured
///
/// Tracks which properties were explicitly set: an explicit `None` means
/// "make sure this is unset", while an absent entry falls back to the default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
    values: BTreeMap<&'static str, Option<Value>>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration entries, coercing each one
    pub fn from_raw<I, K>(table: &[PropertyDef], entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        let mut set = Self::new();
        for (name, raw) in entries {
            set.set(table, name.as_ref(), &raw)?;
        }
        Ok(set)
    }

    /// Coerce and record one configured value
    pub fn set(&mut self, table: &[PropertyDef], name: &str, raw: &RawValue) -> Result<()> {
        let def = find(table, name).ok_or_else(|| Error::invalid(name, "unknown property"))?;
        if def.class != Class::Desired {
            return Err(Error::invalid(name, "property cannot be configured"));
        }
        self.values.insert(def.name, def.coerce(raw)?);
        Ok(())
    }

    /// Record an already normalized value
    pub fn insert(&mut self, def: &PropertyDef, value: Option<Value>) {
        self.values.insert(def.name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<Value>> {
        self.values.remove(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Explicitly configured value; `None` when unset or configured as nil
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(Option::as_ref)
    }

    /// Configured value, falling back to the property default
    pub fn effective(&self, def: &PropertyDef) -> Option<Value> {
        match self.values.get(def.name) {
            Some(value) => value.clone(),
            None => def.default_value(),
        }
    }

    /// Names of every explicitly configured property, in name order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Current property values of one entity, as reported by the daemon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: BTreeMap<&'static str, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a wire `config` mapping; unknown keys are ignored
    pub fn from_wire<I, K>(table: &[PropertyDef], entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        let mut snapshot = Self::new();
        for (key, raw) in entries {
            snapshot.load(table, key.as_ref(), &raw)?;
        }
        Ok(snapshot)
    }

    /// Reverse-translate and coerce one wire entry.
    ///
    /// Returns false when the key is not part of the table. Values the table
    /// would reject (a symbol this tool does not know, say) are kept as text.
    pub fn load(&mut self, table: &[PropertyDef], wire_key: &str, raw: &RawValue) -> Result<bool> {
        let Some((def, sub_key)) = find_wire(table, wire_key) else {
            log::trace!("ignoring unknown key {}", wire_key);
            return Ok(false);
        };

        match sub_key {
            Some(key) => {
                let text = raw.to_text();
                if text.is_empty() {
                    return Ok(true);
                }
                let entry = self
                    .values
                    .entry(def.name)
                    .or_insert_with(|| Value::Map(BTreeMap::new()));
                if let Value::Map(map) = entry {
                    map.insert(key.to_string(), Some(text));
                }
            }
            None => match def.coerce(raw) {
                Ok(Some(value)) => {
                    self.values.insert(def.name, value);
                }
                Ok(None) => {
                    self.values.remove(def.name);
                }
                Err(e) => {
                    log::warn!("keeping {} as reported: {}", wire_key, e);
                    let text = raw.to_text();
                    if text.is_empty() {
                        self.values.remove(def.name);
                    } else {
                        self.values.insert(def.name, Value::Str(text));
                    }
                }
            },
        }
        Ok(true)
    }

    pub fn insert(&mut self, def: &PropertyDef, value: Value) {
        self.values.insert(def.name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[PropertyDef] = &[
        PropertyDef::bool("boot_autostart"),
        PropertyDef::int("boot_host_shutdown_timeout")
            .default_int(30)
            .wire("boot.host_shutdown_timeout"),
        PropertyDef::int("limits_cpu_priority").default_int(10).range(0, 10),
        PropertyDef::sym("security_syscalls_default_action", &["errno", "kill"]),
        PropertyDef::str("linux_kernel_modules").wire("linux.kernel_modules"),
        PropertyDef::map("limits_kernel"),
        PropertyDef::map("environment"),
        PropertyDef::str("volatile_initial_source").transient(),
    ];

    fn def(name: &str) -> &'static PropertyDef {
        find(TABLE, name).unwrap()
    }

    fn samples() -> Vec<RawValue> {
        let mut table = BTreeMap::new();
        table.insert("nofile".to_string(), RawValue::Int(1024));
        table.insert("cpu".to_string(), RawValue::Str(String::new()));
        vec![
            RawValue::from("TRUE"),
            RawValue::from("no"),
            RawValue::from(true),
            RawValue::Int(7),
            RawValue::from("5"),
            RawValue::from("Errno"),
            RawValue::from("kill"),
            RawValue::List(vec!["ip_tables".into(), "overlay".into()]),
            RawValue::Table(table),
            RawValue::from("some text"),
        ]
    }

    #[test]
    fn test_coercion_is_idempotent() {
        for def in TABLE {
            for raw in samples() {
                if let Ok(Some(once)) = def.coerce(&raw) {
                    let twice = def.coerce(&RawValue::from(once.clone())).unwrap();
                    assert_eq!(twice, Some(once), "{} not idempotent on {:?}", def.name, raw);
                }
            }
        }
    }

    #[test]
    fn test_empty_string_is_absent() {
        for def in TABLE {
            assert_eq!(def.coerce(&RawValue::from("")).unwrap(), None, "{}", def.name);
        }
    }

    #[test]
    fn test_bool_coercion() {
        let d = def("boot_autostart");
        assert_eq!(d.coerce(&"True".into()).unwrap(), Some(Value::Bool(true)));
        assert_eq!(d.coerce(&"yes".into()).unwrap(), Some(Value::Bool(false)));
        assert_eq!(d.coerce(&false.into()).unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn test_int_coercion_rejects_garbage() {
        let d = def("boot_host_shutdown_timeout");
        assert_eq!(d.coerce(&" 45 ".into()).unwrap(), Some(Value::Int(45)));
        let err = d.coerce(&"4x5".into()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_range_constraint() {
        let d = def("limits_cpu_priority");
        assert!(d.coerce(&RawValue::Int(10)).is_ok());
        let err = d.coerce(&RawValue::Int(11)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for limits_cpu_priority: out of range (0-10)"
        );
        assert!(d.coerce(&RawValue::Int(-1)).is_err());
    }

    #[test]
    fn test_symbol_coercion() {
        let d = def("security_syscalls_default_action");
        assert_eq!(
            d.coerce(&"ERRNO".into()).unwrap(),
            Some(Value::Sym("errno".into()))
        );
        assert!(d.coerce(&"allow".into()).is_err());
    }

    #[test]
    fn test_list_joins_with_comma() {
        let d = def("linux_kernel_modules");
        let raw = RawValue::List(vec!["ip_tables".into(), "overlay".into()]);
        assert_eq!(
            d.coerce(&raw).unwrap(),
            Some(Value::Str("ip_tables,overlay".into()))
        );
        assert_eq!(d.coerce(&RawValue::List(vec![])).unwrap(), None);
    }

    #[test]
    fn test_wire_key_translation() {
        assert_eq!(def("limits_cpu_priority").wire_key(), "limits.cpu.priority");
        assert_eq!(
            def("boot_host_shutdown_timeout").wire_key(),
            "boot.host_shutdown_timeout"
        );
        assert_eq!(def("limits_kernel").wire_key(), "limits.kernel");
    }

    #[test]
    fn test_reverse_translation() {
        let (d, key) = find_wire(TABLE, "linux.kernel_modules").unwrap();
        assert_eq!((d.name, key), ("linux_kernel_modules", None));

        let (d, key) = find_wire(TABLE, "limits.kernel.nofile").unwrap();
        assert_eq!((d.name, key), ("limits_kernel", Some("nofile")));

        assert!(find_wire(TABLE, "limits.kernel").is_none());
        assert!(find_wire(TABLE, "volatile.eth0.hwaddr").is_none());
    }

    #[test]
    fn test_snapshot_from_wire() {
        let snapshot = Snapshot::from_wire(
            TABLE,
            [
                ("boot.autostart", RawValue::from("true")),
                ("environment.http_proxy", RawValue::from("http://proxy:3128")),
                ("environment.LANG", RawValue::from("C.UTF-8")),
                ("limits.cpu.priority", RawValue::from("")),
                ("image.os", RawValue::from("ubuntu")),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.get("boot_autostart"), Some(&Value::Bool(true)));
        assert_eq!(snapshot.get("limits_cpu_priority"), None);
        let env = snapshot.get("environment").and_then(Value::as_map).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env["LANG"].as_deref(), Some("C.UTF-8"));
    }

    #[test]
    fn test_snapshot_keeps_values_outside_the_table() {
        let snapshot = Snapshot::from_wire(
            TABLE,
            [
                ("security.syscalls.default.action", RawValue::from("trap")),
                ("limits.cpu.priority", RawValue::from("42")),
            ],
        )
        .unwrap();

        assert_eq!(
            snapshot.get("security_syscalls_default_action"),
            Some(&Value::Str("trap".into()))
        );
        assert_eq!(
            snapshot.get("limits_cpu_priority"),
            Some(&Value::Str("42".into()))
        );
    }

    #[test]
    fn test_property_set_tracks_explicit_values() {
        let set = PropertySet::from_raw(
            TABLE,
            [
                ("boot_autostart", RawValue::from(true)),
                ("linux_kernel_modules", RawValue::from("")),
            ],
        )
        .unwrap();

        assert!(set.is_set("boot_autostart"));
        assert!(set.is_set("linux_kernel_modules"));
        assert_eq!(set.get("linux_kernel_modules"), None);
        assert!(!set.is_set("limits_cpu_priority"));
        assert_eq!(
            set.effective(def("limits_cpu_priority")),
            Some(Value::Int(10))
        );
    }

    #[test]
    fn test_property_set_rejects_unknown_and_transient() {
        let err = PropertySet::from_raw(TABLE, [("bogus", RawValue::from("x"))]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let err = PropertySet::from_raw(TABLE, [("volatile_initial_source", RawValue::from("x"))])
            .unwrap_err();
        assert!(err.to_string().contains("cannot be configured"));
    }
}
