//! Devices attached to a profile or a container
//!
//! A device's type decides which properties it accepts, so every device is
//! validated against the rules for its type before the daemon is asked
//! anything. The type itself cannot change once the device exists.

use declarative::validate::rules_for;
use declarative::{
    Change, Entity, Error, PropertyDef, PropertySet, RawValue, Result, RuleSet, Snapshot,
    plan_changes, validate,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use super::wire;
use super::{Ensure, RunContext};

pub const DEVICE_TYPES: &[&str] = &[
    "none",
    "nic",
    "disk",
    "unix_char",
    "unix_block",
    "usb",
    "gpu",
    "infiniband",
];

const NIC_TYPES: &[&str] = &["bridged", "macvlan", "p2p", "physical", "sriov"];

/// Device type, read back from the daemon but never set directly
pub const DEVICE_TYPE: PropertyDef = PropertyDef::sym("type", DEVICE_TYPES).identity();

pub const DEVICE_TABLE: &[PropertyDef] = &[
    DEVICE_TYPE,
    // nic, infiniband
    PropertyDef::sym("nictype", NIC_TYPES),
    PropertyDef::str("limits_ingress"),
    PropertyDef::str("limits_egress"),
    PropertyDef::str("limits_max"),
    PropertyDef::str("hostname"),
    PropertyDef::str("hwaddr"),
    PropertyDef::int("mtu"),
    PropertyDef::str("parent"),
    PropertyDef::int("vlan"),
    PropertyDef::str("ipv4_address"),
    PropertyDef::str("ipv6_address"),
    PropertyDef::bool("security_mac_filtering").wire("security.mac_filtering"),
    // disk
    PropertyDef::str("limits_read"),
    PropertyDef::str("limits_write"),
    PropertyDef::str("path"),
    PropertyDef::str("source"),
    PropertyDef::bool("optional"),
    PropertyDef::bool("readonly"),
    PropertyDef::str("size"),
    PropertyDef::bool("recursive"),
    PropertyDef::str("pool"),
    // unix-char, unix-block, usb, gpu
    PropertyDef::int("major"),
    PropertyDef::int("minor"),
    PropertyDef::int("uid"),
    PropertyDef::int("gid"),
    PropertyDef::int("mode"),
    PropertyDef::str("vendorid"),
    PropertyDef::str("productid"),
    PropertyDef::bool("required"),
    PropertyDef::str("id"),
    PropertyDef::str("pci"),
];

const UNIX_ALLOWED: &[&str] = &[
    "source", "path", "major", "minor", "uid", "gid", "mode", "required",
];

pub const DEVICE_RULES: &[RuleSet] = &[
    RuleSet::new("none", &[], &[]),
    RuleSet::new(
        "nic",
        &["nictype", "parent"],
        &[
            "nictype",
            "parent",
            "limits_egress",
            "limits_ingress",
            "limits_max",
            "hostname",
            "hwaddr",
            "mtu",
            "vlan",
            "ipv4_address",
            "ipv6_address",
            "security_mac_filtering",
        ],
    ),
    RuleSet::new(
        "infiniband",
        &["nictype", "parent"],
        &["nictype", "parent", "hwaddr", "mtu"],
    ),
    RuleSet::new(
        "disk",
        &["path"],
        &[
            "path",
            "source",
            "limits_read",
            "limits_write",
            "limits_max",
            "optional",
            "readonly",
            "size",
            "recursive",
            "pool",
        ],
    ),
    RuleSet::new("unix_char", &[], UNIX_ALLOWED),
    RuleSet::new("unix_block", &[], UNIX_ALLOWED),
    RuleSet::new(
        "usb",
        &["vendorid"],
        &["vendorid", "uid", "gid", "mode", "productid", "required"],
    ),
    RuleSet::new(
        "gpu",
        &[],
        &["uid", "gid", "mode", "vendorid", "productid", "id", "pci"],
    ),
];

/// What a device is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Profile,
    Container,
}

impl Location {
    /// `lxc` sub-command that manages devices at this location
    fn scope(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Container => "config",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => write!(f, "profile"),
            Self::Container => write!(f, "container"),
        }
    }
}

#[derive(Debug)]
pub struct Device {
    name: String,
    location: Location,
    location_name: String,
    device_type: String,
    ensure: Ensure,
    desired: PropertySet,
}

/// Current state of a device
#[derive(Debug)]
pub struct DeviceSnapshot {
    pub device_type: String,
    pub config: Snapshot,
}

impl Device {
    pub fn new<I, K>(
        name: impl Into<String>,
        location: Location,
        location_name: impl Into<String>,
        device_type: &str,
        ensure: Ensure,
        props: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        let device_type = match DEVICE_TYPE.coerce(&RawValue::from(device_type.replace('-', "_")))? {
            Some(t) => t.to_wire(),
            None => return Err(Error::invalid("type", "a device type is required")),
        };
        Ok(Self {
            name: name.into(),
            location,
            location_name: location_name.into(),
            device_type,
            ensure,
            desired: PropertySet::from_raw(DEVICE_TABLE, props)?,
        })
    }

    fn command(&self, action: &str) -> declarative::Command {
        wire::lxc([
            self.location.scope(),
            "device",
            action,
            self.location_name.as_str(),
        ])
    }

    /// Properties that take part in the diff for this device's type
    fn diff_table(&self) -> Vec<PropertyDef> {
        let rule = rules_for(DEVICE_RULES, &self.device_type);
        DEVICE_TABLE
            .iter()
            .filter(|def| rule.is_some_and(|r| r.allows(def.name)))
            .copied()
            .collect()
    }

    /// Current device, or `None` when it (or its location) does not exist
    pub fn load(&self, ctx: &RunContext) -> Result<Option<DeviceSnapshot>> {
        let Some(text) = ctx.query(&self.command("show"))? else {
            return Ok(None);
        };
        let mut devices: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
            wire::parse(&format!("devices of {} {}", self.location, self.location_name), &text)?;
        let Some(entries) = devices.remove(&self.name) else {
            return Ok(None);
        };

        let mut device_type = String::new();
        let mut config = Snapshot::new();
        for (key, value) in &entries {
            let raw = wire::raw_from_yaml(value);
            if key == "type" {
                device_type = raw.to_text().replace('-', "_");
            } else {
                config.load(DEVICE_TABLE, key, &raw)?;
            }
        }
        Ok(Some(DeviceSnapshot {
            device_type,
            config,
        }))
    }
}

impl Entity<RunContext> for Device {
    fn id(&self) -> String {
        format!("{}:{}/{}", self.location, self.location_name, self.name)
    }

    fn entity_type(&self) -> &'static str {
        "device"
    }

    fn description(&self) -> String {
        format!(
            "{} device {} in {} {}",
            self.device_type, self.name, self.location, self.location_name
        )
    }

    fn validate(&self, _ctx: &RunContext) -> Result<()> {
        if self.ensure == Ensure::Absent {
            return Ok(());
        }
        validate(&self.id(), &self.device_type, DEVICE_RULES, &self.desired)
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Change>> {
        let current = self.load(ctx)?;
        match (self.ensure, current) {
            (Ensure::Absent, Some(_)) => Ok(vec![Change::Delete]),
            (Ensure::Absent, None) => Ok(Vec::new()),
            (Ensure::Present, None) => Ok(plan_changes(&self.diff_table(), &self.desired, None)),
            (Ensure::Present, Some(current)) => {
                if current.device_type != self.device_type {
                    return Err(Error::unsupported(
                        self.id(),
                        format!(
                            "cannot change the type of an existing device ({} -> {}); remove it first",
                            current.device_type, self.device_type
                        ),
                    ));
                }
                Ok(plan_changes(
                    &self.diff_table(),
                    &self.desired,
                    Some(&current.config),
                ))
            }
        }
    }

    fn apply(&self, change: &Change, ctx: &RunContext) -> Result<()> {
        let name = self.name.as_str();
        match change {
            Change::Create { initial } => ctx.run(
                &self
                    .command("add")
                    .arg(name)
                    .arg(self.device_type.replace('_', "-"))
                    .args(initial.iter().map(|a| format!("{}={}", a.key, a.value))),
            ),
            Change::Set(a) => ctx.run(
                &self
                    .command("set")
                    .args([name, a.key.as_str(), a.value.as_str()]),
            ),
            Change::Unset { key } => ctx.run(&self.command("unset").args([name, key.as_str()])),
            Change::Delete => ctx.run(&self.command("remove").arg(name)),
            Change::Replace { .. } => Err(Error::unsupported(
                self.id(),
                "devices are converged key by key",
            )),
        }
    }
}
