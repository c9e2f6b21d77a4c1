//! Container profiles
//!
//! Profiles carry the container configuration keys. Their devices are
//! separate [`Device`](super::device::Device) entities located on the profile.

use declarative::{
    Change, Entity, Error, PropertyDef, PropertySet, RawValue, Result, Snapshot, plan_changes,
};

use super::wire::{self, ConfigDocument};
use super::{Ensure, RunContext};

const MEMORY_ENFORCE: &[&str] = &["hard", "soft"];

/// Container configuration keys accepted on a profile
pub const PROFILE_TABLE: &[PropertyDef] = &[
    PropertyDef::bool("boot_autostart"),
    PropertyDef::int("boot_autostart_delay").default_int(0),
    PropertyDef::int("boot_autostart_priority").default_int(0),
    PropertyDef::int("boot_host_shutdown_timeout")
        .default_int(30)
        .wire("boot.host_shutdown_timeout"),
    PropertyDef::int("boot_stop_priority").default_int(0),
    PropertyDef::map("environment"),
    PropertyDef::str("limits_cpu"),
    PropertyDef::str("limits_cpu_allowance"),
    PropertyDef::int("limits_cpu_priority")
        .default_int(10)
        .range(0, 10),
    PropertyDef::int("limits_disk_priority")
        .default_int(5)
        .range(0, 10),
    PropertyDef::map("limits_kernel"),
    PropertyDef::str("limits_memory"),
    PropertyDef::sym("limits_memory_enforce", MEMORY_ENFORCE).default_str("hard"),
    PropertyDef::bool("limits_memory_swap").default_bool(true),
    PropertyDef::int("limits_memory_swap_priority")
        .default_int(10)
        .range(0, 10),
    PropertyDef::int("limits_network_priority")
        .default_int(0)
        .range(0, 10),
    PropertyDef::int("limits_processes"),
    PropertyDef::str("linux_kernel_modules").wire("linux.kernel_modules"),
    PropertyDef::bool("migration_incremental_memory").default_bool(false),
    PropertyDef::int("migration_incremental_memory_goal")
        .default_int(70)
        .range(0, 100),
    PropertyDef::int("migration_incremental_memory_iterations").default_int(10),
    PropertyDef::str("raw_apparmor"),
    PropertyDef::str("raw_idmap"),
    PropertyDef::str("raw_lxc"),
    PropertyDef::str("raw_seccomp"),
    PropertyDef::bool("security_devlxd").default_bool(true),
    PropertyDef::int("security_idmap_base"),
    PropertyDef::bool("security_idmap_isolated").default_bool(false),
    PropertyDef::int("security_idmap_size"),
    PropertyDef::bool("security_nesting").default_bool(false),
    PropertyDef::bool("security_privileged").default_bool(false),
    PropertyDef::str("security_syscalls_blacklist"),
    PropertyDef::bool("security_syscalls_blacklist_compat")
        .default_bool(false)
        .wire("security.syscalls.blacklist_compat"),
    PropertyDef::bool("security_syscalls_blacklist_default")
        .default_bool(true)
        .wire("security.syscalls.blacklist_default"),
    PropertyDef::str("security_syscalls_whitelist"),
    PropertyDef::map("user"),
];

#[derive(Debug)]
pub struct Profile {
    name: String,
    ensure: Ensure,
    desired: PropertySet,
}

impl Profile {
    /// Build a profile from configured properties
    ///
    /// Values are coerced and range-checked here, before any command runs.
    pub fn new<I, K>(name: impl Into<String>, ensure: Ensure, props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        Ok(Self {
            name: name.into(),
            ensure,
            desired: PropertySet::from_raw(PROFILE_TABLE, props)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current configuration, or `None` when the profile does not exist
    pub fn load(&self, ctx: &RunContext) -> Result<Option<Snapshot>> {
        let Some(text) = ctx.query(&wire::lxc(["profile", "show", self.name.as_str()]))? else {
            return Ok(None);
        };
        let doc: ConfigDocument = wire::parse(&format!("profile {}", self.name), &text)?;
        Snapshot::from_wire(PROFILE_TABLE, doc.entries()).map(Some)
    }
}

impl Entity<RunContext> for Profile {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn entity_type(&self) -> &'static str {
        "profile"
    }

    fn description(&self) -> String {
        format!("profile {}", self.name)
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Change>> {
        let current = self.load(ctx)?;
        Ok(match (self.ensure, current) {
            (Ensure::Absent, Some(_)) => vec![Change::Delete],
            (Ensure::Absent, None) => Vec::new(),
            (Ensure::Present, current) => plan_changes(PROFILE_TABLE, &self.desired, current.as_ref()),
        })
    }

    fn apply(&self, change: &Change, ctx: &RunContext) -> Result<()> {
        let name = self.name.as_str();
        match change {
            Change::Create { initial } => {
                ctx.run(&wire::lxc(["profile", "create", name]))?;
                if !initial.is_empty() {
                    let doc = wire::edit_document(initial)?;
                    ctx.run(&wire::lxc(["profile", "edit", name]).stdin(doc))?;
                }
                Ok(())
            }
            Change::Set(a) => ctx.run(&wire::lxc(["profile", "set", name, a.key.as_str(), a.value.as_str()])),
            Change::Unset { key } => ctx.run(&wire::lxc(["profile", "unset", name, key.as_str()])),
            Change::Delete => ctx.run(&wire::lxc(["profile", "delete", name])),
            Change::Replace { .. } => Err(Error::unsupported(
                self.description(),
                "profiles are converged key by key",
            )),
        }
    }
}
