//! Daemon-wide settings
//!
//! The trust password cannot be read back from the daemon, so whether it
//! needs setting is decided against the verification hash kept in the
//! state file.

use declarative::{
    Assignment, Change, Entity, Error, PropertyDef, PropertySet, RawValue, Result, Snapshot,
    property_changes,
};

use super::wire::{self, ConfigDocument};
use super::RunContext;

pub const DEFAULT_NETWORK_PORT: u16 = 8443;
const TRUST_PASSWORD_KEY: &str = "core.trust_password";

pub const SERVER_TABLE: &[PropertyDef] =
    &[PropertyDef::str("core_https_address").wire("core.https_address")];

#[derive(Debug)]
pub struct Server {
    server_path: String,
    trust_password: Option<String>,
    desired: PropertySet,
}

impl Server {
    /// Address and port only take effect together; no address leaves the
    /// listener alone
    pub fn new(
        server_path: impl Into<String>,
        network_address: Option<&str>,
        network_port: Option<u16>,
        trust_password: Option<String>,
    ) -> Result<Self> {
        let mut desired = PropertySet::new();
        if let Some(address) = network_address {
            let listen = https_address(address, network_port.unwrap_or(DEFAULT_NETWORK_PORT));
            desired.set(SERVER_TABLE, "core_https_address", &RawValue::from(listen))?;
        }
        Ok(Self {
            server_path: server_path.into(),
            trust_password: trust_password.filter(|pw| !pw.is_empty()),
            desired,
        })
    }

    pub fn load(&self, ctx: &RunContext) -> Result<Snapshot> {
        let text = ctx.gateway().capture(&wire::lxc(["config", "show"]))?;
        let doc: ConfigDocument = wire::parse("server config", &text)?;
        Snapshot::from_wire(SERVER_TABLE, doc.entries())
    }
}

/// `host:port`, bracketing IPv6 literals
fn https_address(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, port)
    } else {
        format!("{}:{}", address, port)
    }
}

impl Entity<RunContext> for Server {
    fn id(&self) -> String {
        self.server_path.clone()
    }

    fn entity_type(&self) -> &'static str {
        "server"
    }

    fn description(&self) -> String {
        format!("LXD server at {}", self.server_path)
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Change>> {
        let current = self.load(ctx)?;
        let mut changes = property_changes(SERVER_TABLE, &self.desired, &current);

        if let Some(password) = &self.trust_password
            && !ctx.state().password_matches(&self.server_path, password)
        {
            changes.push(Change::Set(Assignment::secret(
                TRUST_PASSWORD_KEY,
                password.as_str(),
            )));
        }
        Ok(changes)
    }

    fn apply(&self, change: &Change, ctx: &RunContext) -> Result<()> {
        match change {
            Change::Set(a) if a.sensitive => {
                ctx.run(&wire::lxc(["config", "set", a.key.as_str()]).secret_arg(a.value.as_str()))?;
                if a.key == TRUST_PASSWORD_KEY {
                    ctx.save_password(&a.value)?;
                }
                Ok(())
            }
            Change::Set(a) => ctx.run(&wire::lxc([
                "config",
                "set",
                a.key.as_str(),
                a.value.as_str(),
            ])),
            Change::Unset { key } => ctx.run(&wire::lxc(["config", "unset", key.as_str()])),
            _ => Err(Error::unsupported(
                self.id(),
                format!("cannot {} the server", change.verb()),
            )),
        }
    }
}
