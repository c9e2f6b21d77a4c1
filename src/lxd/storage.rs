//! Storage pools
//!
//! The backend is fixed at creation. Each backend accepts its own subset of
//! keys, and ceph pools need a daemon built with the ceph driver.

use declarative::validate::rules_for;
use declarative::{
    Change, Entity, Error, PropertyDef, PropertySet, RawValue, Result, RuleSet, Snapshot,
    plan_changes, validate,
};

use super::wire::{self, StorageDocument};
use super::{Ensure, RunContext};

const BACKENDS: &[&str] = &["dir", "btrfs", "lvm", "zfs", "ceph"];

/// Pool driver; `driver` in `lxc storage show`
pub const BACKEND: PropertyDef = PropertyDef::sym("backend", BACKENDS)
    .default_str("dir")
    .wire("driver")
    .identity();

const SOURCE: PropertyDef = PropertyDef::str("source");

pub const STORAGE_TABLE: &[PropertyDef] = &[
    BACKEND,
    PropertyDef::str("size"),
    SOURCE,
    // Reported in place of `source` once the pool exists
    PropertyDef::str("volatile_initial_source")
        .wire("volatile.initial_source")
        .transient(),
    PropertyDef::str("lvm_vg_name").wire("lvm.vg_name"),
    PropertyDef::str("lvm_thinpool_name").wire("lvm.thinpool_name"),
    PropertyDef::str("zfs_pool_name").wire("zfs.pool_name"),
    PropertyDef::str("ceph_cluster_name")
        .default_str("ceph")
        .wire("ceph.cluster_name"),
    PropertyDef::bool("ceph_osd_force_reuse")
        .default_bool(false)
        .wire("ceph.osd.force_reuse"),
    PropertyDef::int("ceph_osd_pg_num")
        .default_int(32)
        .wire("ceph.osd.pg_num"),
    PropertyDef::str("ceph_osd_pool_name").wire("ceph.osd.pool_name"),
    PropertyDef::bool("ceph_rbd_clone_copy")
        .default_bool(true)
        .wire("ceph.rbd.clone_copy"),
    PropertyDef::str("ceph_user_name").wire("ceph.user.name"),
];

pub const STORAGE_RULES: &[RuleSet] = &[
    RuleSet::new("dir", &[], &["size", "source"]),
    RuleSet::new("btrfs", &[], &["size", "source"]),
    RuleSet::new(
        "lvm",
        &[],
        &["size", "source", "lvm_vg_name", "lvm_thinpool_name"],
    ),
    RuleSet::new("zfs", &[], &["size", "source", "zfs_pool_name"]),
    RuleSet::new(
        "ceph",
        &["ceph_osd_pool_name", "ceph_user_name"],
        &[
            "ceph_osd_pool_name",
            "ceph_user_name",
            "ceph_rbd_clone_copy",
            "ceph_osd_pg_num",
            "ceph_osd_force_reuse",
            "ceph_cluster_name",
        ],
    ),
];

#[derive(Debug)]
pub struct Storage {
    name: String,
    backend: String,
    ensure: Ensure,
    desired: PropertySet,
}

/// Current state of a pool
#[derive(Debug)]
pub struct StorageSnapshot {
    pub backend: String,
    pub config: Snapshot,
}

impl Storage {
    pub fn new<I, K>(
        name: impl Into<String>,
        backend: Option<&str>,
        ensure: Ensure,
        props: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        let backend = match backend {
            Some(b) => BACKEND.coerce(&RawValue::from(b))?,
            None => BACKEND.default_value(),
        }
        .map_or_else(|| "dir".to_string(), |b| b.to_wire());

        Ok(Self {
            name: name.into(),
            backend,
            ensure,
            desired: PropertySet::from_raw(STORAGE_TABLE, props)?,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Keys that may be set on a pool of this backend
    fn diff_table(&self) -> Vec<PropertyDef> {
        let rule = rules_for(STORAGE_RULES, &self.backend);
        STORAGE_TABLE
            .iter()
            .filter(|def| rule.is_some_and(|r| r.allows(def.name)))
            .copied()
            .collect()
    }

    /// Current pool, or `None` when it does not exist
    pub fn load(&self, ctx: &RunContext) -> Result<Option<StorageSnapshot>> {
        let Some(text) = ctx.query(&wire::lxc(["storage", "show", self.name.as_str()]))? else {
            return Ok(None);
        };
        let doc: StorageDocument = wire::parse(&format!("storage pool {}", self.name), &text)?;
        let mut config = Snapshot::from_wire(STORAGE_TABLE, doc.document.entries())?;
        if config.get("source").is_none()
            && let Some(initial) = config.remove("volatile_initial_source")
        {
            config.insert(&SOURCE, initial);
        }
        Ok(Some(StorageSnapshot {
            backend: doc.driver,
            config,
        }))
    }

    fn ensure_supported(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.has_extension("storage") {
            return Err(Error::unsupported(
                self.id(),
                "the installed LXD is too old to support storage pools",
            ));
        }
        if self.backend == "ceph"
            && self.ensure == Ensure::Present
            && !ctx.has_extension("storage_driver_ceph")
        {
            return Err(Error::unsupported(
                self.id(),
                "the installed LXD is too old to support a ceph storage pool",
            ));
        }
        Ok(())
    }
}

impl Entity<RunContext> for Storage {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn entity_type(&self) -> &'static str {
        "storage_pool"
    }

    fn description(&self) -> String {
        format!("{} storage pool {}", self.backend, self.name)
    }

    fn validate(&self, ctx: &RunContext) -> Result<()> {
        self.ensure_supported(ctx)?;
        if self.ensure == Ensure::Absent {
            return Ok(());
        }
        validate(&self.id(), &self.backend, STORAGE_RULES, &self.desired)
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Change>> {
        let current = self.load(ctx)?;
        match (self.ensure, current) {
            (Ensure::Absent, Some(_)) => Ok(vec![Change::Delete]),
            (Ensure::Absent, None) => Ok(Vec::new()),
            (Ensure::Present, None) => Ok(plan_changes(&self.diff_table(), &self.desired, None)),
            (Ensure::Present, Some(current)) => {
                if current.backend != self.backend {
                    return Err(Error::unsupported(
                        self.id(),
                        format!(
                            "cannot change the backend of an existing pool ({} -> {}); drop and recreate it",
                            current.backend, self.backend
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
                &wire::lxc(["storage", "create", name, self.backend.as_str()])
                    .args(initial.iter().map(|a| format!("{}={}", a.key, a.value))),
            ),
            Change::Set(a) => ctx.run(&wire::lxc([
                "storage",
                "set",
                name,
                a.key.as_str(),
                a.value.as_str(),
            ])),
            Change::Unset { key } => ctx.run(&wire::lxc(["storage", "unset", name, key.as_str()])),
            Change::Delete => ctx.run(&wire::lxc(["storage", "delete", name])),
            Change::Replace { .. } => Err(Error::unsupported(
                self.id(),
                "storage pools are converged key by key",
            )),
        }
    }
}
