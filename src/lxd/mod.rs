//! LXD entities and the per-run context they converge against
//!
//! Everything that talks to the daemon goes through [`RunContext`]: it owns
//! the gateway, caches what `lxc info` reported, and knows which bridge
//! generation the host runs. It is built once per run and passed by
//! reference to every entity.

pub mod device;
pub mod info;
pub mod network;
pub mod profile;
pub mod server;
pub mod storage;
pub mod wire;

#[cfg(test)]
pub mod testing;

use declarative::{Command, Error, Gateway, Result};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::state::SlingState;
pub use info::ServerInfo;

/// Default server path of a packaged daemon
pub const DEFAULT_SERVER_PATH: &str = "/var/lib/lxd";
/// Config file of the pre-2.3 `lxd-bridge` service
pub const DEFAULT_LEGACY_BRIDGE_FILE: &str = "/etc/default/lxd-bridge";
pub const DEFAULT_LEGACY_BRIDGE_SERVICE: &str = "lxd-bridge";

/// Where things live for the daemon being converged
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_path: String,
    pub state_file: PathBuf,
    pub legacy_bridge_file: PathBuf,
    pub legacy_bridge_service: String,
}

/// Whether an entity should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// How bridges are managed on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeGeneration {
    /// A single bridge configured through the `lxd-bridge` service file
    Legacy,
    /// Any number of bridges managed through `lxc network`
    Modern,
}

impl fmt::Display for BridgeGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy (lxd-bridge)"),
            Self::Modern => write!(f, "modern (lxc network)"),
        }
    }
}

/// Everything an entity needs during one run
pub struct RunContext {
    gateway: Box<dyn Gateway>,
    settings: Settings,
    info: Option<ServerInfo>,
    generation: BridgeGeneration,
    host_addrs: Vec<IpAddr>,
    rng: RefCell<StdRng>,
    state: RefCell<SlingState>,
    /// Addresses generated for `auto`, so a preview and the real run agree
    generated: RefCell<BTreeMap<String, Option<String>>>,
}

impl RunContext {
    /// Probe the daemon and build the context for a run
    ///
    /// When `lxc info` fails but the legacy bridge file exists, the run
    /// continues in legacy mode so a broken bridge can still be repaired.
    pub fn connect(
        gateway: Box<dyn Gateway>,
        settings: Settings,
        state: SlingState,
        rng: StdRng,
    ) -> Result<Self> {
        let (info, generation) = match gateway.capture(&wire::lxc(["info"])) {
            Ok(text) => {
                let info = ServerInfo::parse(&text)?;
                let generation = if info.has_extension("network") {
                    BridgeGeneration::Modern
                } else {
                    BridgeGeneration::Legacy
                };
                (Some(info), generation)
            }
            Err(e) if settings.legacy_bridge_file.exists() => {
                log::warn!(
                    "lxc info failed ({}), assuming the legacy bridge in {}",
                    e,
                    settings.legacy_bridge_file.display()
                );
                (None, BridgeGeneration::Legacy)
            }
            Err(e) => return Err(e),
        };
        log::debug!("bridge generation: {:?}", generation);

        let host_addrs = host_addresses(gateway.as_ref());

        Ok(Self {
            gateway,
            settings,
            info,
            generation,
            host_addrs,
            rng: RefCell::new(rng),
            state: RefCell::new(state),
            generated: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn info(&self) -> Option<&ServerInfo> {
        self.info.as_ref()
    }

    pub fn generation(&self) -> BridgeGeneration {
        self.generation
    }

    pub fn host_addrs(&self) -> &[IpAddr] {
        &self.host_addrs
    }

    /// Whether the daemon advertises an API extension
    pub fn has_extension(&self, name: &str) -> bool {
        self.info.as_ref().is_some_and(|info| info.has_extension(name))
    }

    /// Run a command, failing on a non-success exit
    pub fn run(&self, cmd: &Command) -> Result<()> {
        self.gateway.execute_checked(cmd).map(drop)
    }

    /// Run a read-only query; a non-success exit means "not found"
    pub fn query(&self, cmd: &Command) -> Result<Option<String>> {
        let output = self.gateway.execute(cmd)?;
        if output.success {
            Ok(Some(output.stdout_str()))
        } else {
            log::debug!("{} reported: {}", cmd, output.stderr_str().trim());
            Ok(None)
        }
    }

    /// Resolve a generated address once per run and key
    pub fn generated_address<F>(&self, key: &str, generate: F) -> Result<Option<String>>
    where
        F: FnOnce(&mut StdRng) -> Result<Option<String>>,
    {
        if let Some(addr) = self.generated.borrow().get(key) {
            return Ok(addr.clone());
        }
        let addr = generate(&mut *self.rng.borrow_mut())?;
        self.generated
            .borrow_mut()
            .insert(key.to_string(), addr.clone());
        Ok(addr)
    }

    pub fn state(&self) -> Ref<'_, SlingState> {
        self.state.borrow()
    }

    /// Remember a trust password that was just set, and persist it
    pub fn save_password(&self, password: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record_password(&self.settings.server_path, password);
        state
            .touch(&self.settings.state_file)
            .map_err(|e| Error::Io(std::io::Error::other(format!("{:#}", e))))
    }
}

/// Every address the host currently uses
fn host_addresses(gateway: &dyn Gateway) -> Vec<IpAddr> {
    match gateway.capture(&Command::new("hostname").arg("-I")) {
        Ok(text) => text
            .split_whitespace()
            .filter_map(|addr| addr.parse().ok())
            .collect(),
        Err(e) => {
            log::warn!("could not list host addresses ({}), skipping collision checks", e);
            Vec::new()
        }
    }
}
