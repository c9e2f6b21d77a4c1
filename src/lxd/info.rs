//! Daemon capabilities as reported by `lxc info`

use serde::{Deserialize, Serialize};

use super::wire;
use declarative::Result;

/// The parts of `lxc info` that drive convergence decisions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub api_extensions: Vec<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub environment: Option<ServerEnvironment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEnvironment {
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
}

impl ServerInfo {
    pub fn parse(text: &str) -> Result<Self> {
        wire::parse("lxc info", text)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.api_extensions.iter().any(|ext| ext == name)
    }

    pub fn server_version(&self) -> Option<&str> {
        self.environment.as_ref()?.server_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "\
config:
  core.https_address: '[::]:8443'
api_extensions:
- storage
- network
api_status: stable
api_version: \"1.0\"
auth: trusted
environment:
  kernel_version: 4.15.0-20-generic
  server_version: \"3.0.0\"
  storage: dir
";

    #[test]
    fn test_parse_info() {
        let info = ServerInfo::parse(INFO).unwrap();
        assert!(info.has_extension("network"));
        assert!(!info.has_extension("storage_driver_ceph"));
        assert_eq!(info.server_version(), Some("3.0.0"));
        assert_eq!(info.api_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_old_daemon_without_extensions() {
        let info = ServerInfo::parse("api_status: stable\nauth: trusted\n").unwrap();
        assert!(info.api_extensions.is_empty());
        assert_eq!(info.server_version(), None);
    }
}
