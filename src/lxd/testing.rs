//! Scripted gateway for entity tests

use declarative::{Command, CommandOutput, Gateway, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use super::{RunContext, Settings};
use crate::state::SlingState;

/// `lxc info` of a current daemon with every extension we care about
pub const MODERN_INFO: &str = "\
api_extensions:
- storage
- network
- storage_driver_ceph
environment:
  server_version: \"3.0.3\"
";

/// Answers commands by their printable command line and records every call
///
/// Clones share state, so a test keeps one handle while the context owns
/// another. Unscripted commands succeed with empty output.
#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    responses: HashMap<String, CommandOutput>,
    calls: Vec<Command>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway for a daemon with the `network` extension
    pub fn modern() -> Self {
        let gw = Self::new();
        gw.respond("lxc info", MODERN_INFO);
        gw
    }

    pub fn respond(&self, line: &str, stdout: &str) {
        self.inner
            .borrow_mut()
            .responses
            .insert(line.to_string(), CommandOutput::ok(stdout));
    }

    pub fn fail(&self, line: &str, stderr: &str) {
        self.inner
            .borrow_mut()
            .responses
            .insert(line.to_string(), CommandOutput::failed(stderr));
    }

    /// Script a `show` query for an entity that does not exist
    pub fn missing(&self, line: &str) {
        self.fail(line, "Error: not found");
    }

    /// Every command run so far, as printed
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .borrow()
            .calls
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Commands that would change something
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|line| {
                line != "lxc info" && !line.starts_with("hostname") && !line.contains(" show ")
            })
            .collect()
    }

    /// The last command run with the given printable prefix
    pub fn last_call(&self, prefix: &str) -> Option<Command> {
        self.inner
            .borrow()
            .calls
            .iter()
            .rev()
            .find(|cmd| cmd.to_string().starts_with(prefix))
            .cloned()
    }
}

impl Gateway for MockGateway {
    fn execute(&self, cmd: &Command) -> Result<CommandOutput> {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(cmd.clone());
        Ok(inner
            .responses
            .get(&cmd.to_string())
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// Settings rooted in a scratch directory
pub fn settings(dir: &Path, legacy_bridge_file: &Path) -> Settings {
    Settings {
        server_path: "/var/lib/lxd".into(),
        state_file: dir.join("state.toml"),
        legacy_bridge_file: legacy_bridge_file.to_path_buf(),
        legacy_bridge_service: "lxd-bridge".into(),
    }
}

pub fn connect_with(gw: &MockGateway, settings: Settings) -> Result<RunContext> {
    RunContext::connect(
        Box::new(gw.clone()),
        settings,
        SlingState::default(),
        StdRng::seed_from_u64(42),
    )
}

/// Context with settings that never touch the real filesystem
pub fn connect(gw: &MockGateway) -> RunContext {
    let nowhere = Path::new("/nonexistent/lxd-sling");
    connect_with(gw, settings(nowhere, &nowhere.join("lxd-bridge")))
        .unwrap_or_else(|e| panic!("connect failed: {}", e))
}
