//! Desired state file
//!
//! One TOML document describes a daemon: where it lives, its server
//! settings, and the pools, networks, profiles and devices it should have.
//! Entity tables take their properties flattened next to `name` and
//! `ensure`; values are coerced when the plan is built, so a typo fails
//! before anything runs.

use anyhow::{Context, Result};
use declarative::{ConvergencePlan, RawValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::lxd::device::{Device, Location};
use crate::lxd::network::Network;
use crate::lxd::profile::Profile;
use crate::lxd::server::Server;
use crate::lxd::storage::Storage;
use crate::lxd::{self, Ensure, RunContext, Settings};
use crate::paths;

/// Unparsed property values keyed by property name
pub type Props = BTreeMap<String, toml::Value>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlingConfig {
    pub server_path: String,
    /// Defaults to `state.toml` in the state directory
    pub state_file: Option<String>,
    pub legacy_bridge_file: String,
    pub legacy_bridge_service: String,
    pub server: Option<ServerConfig>,
    pub storage: Vec<StorageConfig>,
    pub networks: Vec<NetworkConfig>,
    pub profiles: Vec<ProfileConfig>,
    pub devices: Vec<DeviceConfig>,
}

impl Default for SlingConfig {
    fn default() -> Self {
        Self {
            server_path: lxd::DEFAULT_SERVER_PATH.to_string(),
            state_file: None,
            legacy_bridge_file: lxd::DEFAULT_LEGACY_BRIDGE_FILE.to_string(),
            legacy_bridge_service: lxd::DEFAULT_LEGACY_BRIDGE_SERVICE.to_string(),
            server: None,
            storage: Vec::new(),
            networks: Vec::new(),
            profiles: Vec::new(),
            devices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub network_address: Option<String>,
    pub network_port: Option<u16>,
    pub trust_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub name: String,
    pub backend: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: Props,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: Props,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Devices attached to this profile, keyed by device name
    #[serde(default)]
    pub devices: BTreeMap<String, ProfileDeviceConfig>,
    #[serde(flatten)]
    pub props: Props,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDeviceConfig {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: Props,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub location: Location,
    pub location_name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: Props,
}

impl SlingConfig {
    /// Load the desired state from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the file when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolved file locations for the run context
    pub fn settings(&self) -> Result<Settings> {
        let state_file = match &self.state_file {
            Some(path) => paths::expand(path),
            None => paths::state_dir()?.join("state.toml"),
        };
        Ok(Settings {
            server_path: self.server_path.clone(),
            state_file,
            legacy_bridge_file: paths::expand(&self.legacy_bridge_file),
            legacy_bridge_service: self.legacy_bridge_service.clone(),
        })
    }

    /// Build the convergence plan
    ///
    /// Order matters to the daemon: server settings first, then pools and
    /// networks, then the profiles that reference them (each followed by its
    /// own devices), then standalone devices.
    pub fn build_plan(&self) -> Result<ConvergencePlan<RunContext>> {
        let mut plan = ConvergencePlan::new();

        if let Some(server) = &self.server {
            let entity = Server::new(
                self.server_path.as_str(),
                server.network_address.as_deref(),
                server.network_port,
                server.trust_password.clone(),
            )
            .context("Invalid [server] settings")?;
            plan.push(Box::new(entity));
        }

        for pool in &self.storage {
            let entity = Storage::new(
                pool.name.as_str(),
                pool.backend.as_deref(),
                pool.ensure,
                raw_props(&pool.props),
            )
            .with_context(|| format!("Invalid storage pool '{}'", pool.name))?;
            plan.push(Box::new(entity));
        }

        for net in &self.networks {
            let entity = Network::new(net.name.as_str(), net.ensure, raw_props(&net.props))
                .with_context(|| format!("Invalid network '{}'", net.name))?;
            plan.push(Box::new(entity));
        }

        for profile in &self.profiles {
            let entity = Profile::new(profile.name.as_str(), profile.ensure, raw_props(&profile.props))
                .with_context(|| format!("Invalid profile '{}'", profile.name))?;
            plan.push(Box::new(entity));

            // Deleting the profile takes its devices with it
            if profile.ensure == Ensure::Absent {
                continue;
            }
            for (name, dev) in &profile.devices {
                let entity = Device::new(
                    name.as_str(),
                    Location::Profile,
                    profile.name.as_str(),
                    &dev.device_type,
                    dev.ensure,
                    raw_props(&dev.props),
                )
                .with_context(|| format!("Invalid device '{}' of profile '{}'", name, profile.name))?;
                plan.push(Box::new(entity));
            }
        }

        for dev in &self.devices {
            let entity = Device::new(
                dev.name.as_str(),
                dev.location,
                dev.location_name.as_str(),
                &dev.device_type,
                dev.ensure,
                raw_props(&dev.props),
            )
            .with_context(|| format!("Invalid device '{}/{}'", dev.location_name, dev.name))?;
            plan.push(Box::new(entity));
        }

        Ok(plan)
    }
}

fn raw_props(props: &Props) -> impl Iterator<Item = (&str, RawValue)> {
    props.iter().map(|(k, v)| (k.as_str(), raw_value(v)))
}

fn raw_value(value: &toml::Value) -> RawValue {
    match value {
        toml::Value::String(s) => RawValue::Str(s.clone()),
        toml::Value::Integer(i) => RawValue::Int(*i),
        toml::Value::Boolean(b) => RawValue::Bool(*b),
        toml::Value::Float(f) => RawValue::Str(f.to_string()),
        toml::Value::Datetime(d) => RawValue::Str(d.to_string()),
        toml::Value::Array(items) => RawValue::List(items.iter().map(raw_value).collect()),
        toml::Value::Table(table) => RawValue::Table(
            table
                .iter()
                .map(|(k, v)| (k.clone(), raw_value(v)))
                .collect(),
        ),
    }
}
