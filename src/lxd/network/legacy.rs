//! The single bridge of the `lxd-bridge` service
//!
//! Its configuration is one shell-style file. The file is read into the same
//! properties a managed network reports, diffed like any other entity, and
//! rewritten as a whole when anything drifted, followed by a restart of the
//! bridge service.

use declarative::{
    Change, Command, Error, PropertyDef, PropertySet, RawValue, Result, Snapshot, Value,
    plan_changes,
};
use ipnet::{Ipv4Net, Ipv6Net};
use regex::Regex;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::LazyLock;

use super::address::{self, AUTO};
use super::{NETWORK_TABLE, Network};
use crate::lxd::{Ensure, RunContext};

static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([A-Z0-9_]+)="(.*)"\s*$"#).expect("bridge file pattern should be valid")
});

/// Network properties the bridge file can express
const FILE_PROPERTIES: &[&str] = &[
    "raw_dnsmasq",
    "dns_domain",
    "ipv4_address",
    "ipv4_dhcp_ranges",
    "ipv4_nat",
    "ipv6_address",
    "ipv6_nat",
];

fn file_table() -> Vec<PropertyDef> {
    NETWORK_TABLE
        .iter()
        .filter(|def| FILE_PROPERTIES.contains(&def.name))
        .copied()
        .collect()
}

/// Contents of the bridge file
///
/// Settings live in `config` under their network property names, the way
/// `lxc network show` reports them. DHCP ranges are kept in `start-end`
/// form; the file itself uses `start,end`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyBridge {
    pub enabled: bool,
    pub name: String,
    pub config: Snapshot,
}

impl LegacyBridge {
    pub fn parse(text: &str) -> Result<Self> {
        let mut bridge = Self::default();
        let mut use_bridge = None;
        let mut entries = Vec::new();
        let (mut ipv4_addr, mut ipv4_prefix) = (None, None);
        let (mut ipv6_addr, mut ipv6_mask) = (None, None);

        for caps in text.lines().filter_map(|l| LINE.captures(l)) {
            let value = caps[2].to_string();
            if value.is_empty() {
                continue;
            }
            match &caps[1] {
                "USE_LXD_BRIDGE" => use_bridge = Some(value == "true"),
                "LXD_BRIDGE" => bridge.name = value,
                "LXD_CONFILE" => entries.push(("raw.dnsmasq", value)),
                "LXD_DOMAIN" => entries.push(("dns.domain", value)),
                "LXD_IPV4_ADDR" => ipv4_addr = Some(value),
                "LXD_IPV4_NETWORK" => {
                    ipv4_prefix = value.rsplit_once('/').map(|(_, p)| p.to_string());
                }
                "LXD_IPV4_DHCP_RANGE" => entries.push(("ipv4.dhcp.ranges", value.replace(',', "-"))),
                "LXD_IPV4_NAT" => entries.push(("ipv4.nat", value)),
                "LXD_IPV6_ADDR" => ipv6_addr = Some(value),
                "LXD_IPV6_MASK" => ipv6_mask = Some(value),
                "LXD_IPV6_NAT" => entries.push(("ipv6.nat", value)),
                _ => {}
            }
        }

        if let Some(cidr) = join_cidr(ipv4_addr, ipv4_prefix) {
            entries.push(("ipv4.address", cidr));
        }
        if let Some(cidr) = join_cidr(ipv6_addr, ipv6_mask) {
            entries.push(("ipv6.address", cidr));
        }
        bridge.config = Snapshot::from_wire(
            NETWORK_TABLE,
            entries.into_iter().map(|(key, value)| (key, RawValue::from(value))),
        )?;
        bridge.enabled = use_bridge.unwrap_or(true) && !bridge.name.is_empty();
        Ok(bridge)
    }

    /// An enabled bridge carrying the given properties
    fn with_properties(name: &str, table: &[PropertyDef], props: &PropertySet) -> Self {
        let mut config = Snapshot::new();
        for def in table {
            if let Some(value) = props.get(def.name) {
                config.insert(def, value.clone());
            }
        }
        Self {
            enabled: true,
            name: name.to_string(),
            config,
        }
    }

    fn text(&self, name: &str) -> Option<String> {
        self.config.get(name).map(Value::to_wire)
    }

    fn flag(&self, name: &str) -> bool {
        self.config.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// File contents for these settings
    pub fn render(&self) -> Result<String> {
        let (v4_addr, v4_netmask, v4_network) = match self.text("ipv4_address") {
            Some(cidr) => {
                let net: Ipv4Net = address::parse_ipv4(&cidr)?;
                (
                    net.addr().to_string(),
                    net.netmask().to_string(),
                    net.trunc().to_string(),
                )
            }
            None => Default::default(),
        };
        let (v6_addr, v6_mask, v6_network) = match self.text("ipv6_address") {
            Some(cidr) => {
                let net: Ipv6Net = address::parse_ipv6(&cidr)?;
                (
                    net.addr().to_string(),
                    net.prefix_len().to_string(),
                    net.trunc().to_string(),
                )
            }
            None => Default::default(),
        };
        let range = self.text("ipv4_dhcp_ranges").unwrap_or_default();
        let dhcp_max = dhcp_max(&range).map(|n| n.to_string()).unwrap_or_default();

        let mut out = String::new();
        let mut entry = |comment: &str, key: &str, value: &str| {
            out.push_str(&format!("# {}\n{}=\"{}\"\n\n", comment, key, value));
        };
        entry("Whether to set up the bridge", "USE_LXD_BRIDGE", bool_str(self.enabled));
        entry("Bridge name", "LXD_BRIDGE", &self.name);
        entry("Update the \"default\" LXD profile", "UPDATE_PROFILE", "true");
        entry(
            "Path to an extra dnsmasq configuration file",
            "LXD_CONFILE",
            &self.text("raw_dnsmasq").unwrap_or_default(),
        );
        entry(
            "DNS domain for the bridge",
            "LXD_DOMAIN",
            &self.text("dns_domain").unwrap_or_default(),
        );
        entry("IPv4 address (e.g. 10.0.8.1)", "LXD_IPV4_ADDR", &v4_addr);
        entry("IPv4 netmask (e.g. 255.255.255.0)", "LXD_IPV4_NETMASK", &v4_netmask);
        entry("IPv4 network (e.g. 10.0.8.0/24)", "LXD_IPV4_NETWORK", &v4_network);
        entry(
            "IPv4 DHCP range (e.g. 10.0.8.2,10.0.8.254)",
            "LXD_IPV4_DHCP_RANGE",
            &range.replace('-', ","),
        );
        entry("IPv4 DHCP number of hosts", "LXD_IPV4_DHCP_MAX", &dhcp_max);
        entry("NAT IPv4 traffic", "LXD_IPV4_NAT", bool_str(self.flag("ipv4_nat")));
        entry("IPv6 address", "LXD_IPV6_ADDR", &v6_addr);
        entry("IPv6 CIDR mask (e.g. 64)", "LXD_IPV6_MASK", &v6_mask);
        entry("IPv6 network", "LXD_IPV6_NETWORK", &v6_network);
        entry("NAT IPv6 traffic", "LXD_IPV6_NAT", bool_str(self.flag("ipv6_nat")));
        entry("Run a minimal HTTP proxy server", "LXD_IPV6_PROXY", "false");
        Ok(out)
    }

    /// A file that turns the bridge off
    pub fn disabled() -> Self {
        Self::default()
    }
}

fn join_cidr(addr: Option<String>, prefix: Option<String>) -> Option<String> {
    match (addr, prefix) {
        (Some(addr), Some(prefix)) => Some(format!("{}/{}", addr, prefix)),
        (addr, _) => addr,
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Hosts in a `start-end` range, when both ends are addresses
fn dhcp_max(range: &str) -> Option<u64> {
    let (start, end) = range.split_once('-')?;
    let start: Ipv4Addr = start.trim().parse().ok()?;
    let end: Ipv4Addr = end.trim().parse().ok()?;
    Some(address::range_size(start, end))
}

fn read(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Desired file properties for this network, with placeholders resolved
///
/// Every property in `table` is set explicitly so that anything the file
/// carries beyond them shows up as drift. NAT is always written as a
/// boolean, so it is always wanted as one.
fn desired(
    net: &Network,
    ctx: &RunContext,
    table: &[PropertyDef],
    current: &Snapshot,
) -> Result<PropertySet> {
    let ipv4_wanted = net.wanted("ipv4_address");
    let ipv6_wanted = net.wanted("ipv6_address");
    let current_text = |name: &str| current.get(name).map(Value::to_wire);

    let ipv4 = ctx.generated_address(&format!("{}/ipv4", net.name), |rng| {
        let resolved = address::resolve_ipv4(
            ipv4_wanted.as_deref(),
            current_text("ipv4_address").as_deref(),
            ctx.host_addrs(),
            rng,
        )?;
        Ok(resolved.map(|n| n.to_string()))
    })?;
    let ipv6 = ctx.generated_address(&format!("{}/ipv6", net.name), |rng| {
        let resolved = address::resolve_ipv6(
            ipv6_wanted.as_deref(),
            current_text("ipv6_address").as_deref(),
            ctx.host_addrs(),
            rng,
        )?;
        Ok(resolved.map(|n| n.to_string()))
    })?;

    let ipv4_dhcp_ranges = match net.wanted("ipv4_dhcp_ranges") {
        Some(range) if range != AUTO => Some(range),
        _ => match &ipv4 {
            Some(cidr) => {
                let (start, end) = address::derive_dhcp_range(address::parse_ipv4(cidr)?)?;
                Some(format!("{}-{}", start, end))
            }
            None => None,
        },
    };
    let nat = |name: &str, wanted: &Option<String>| {
        let on = address::resolve_nat(net.explicit_bool(name), wanted.as_deref() == Some(AUTO));
        Some(Value::Bool(on.unwrap_or(false)))
    };

    let mut props = PropertySet::new();
    for def in table {
        let value = match def.name {
            "ipv4_address" => ipv4.clone().map(Value::Str),
            "ipv4_dhcp_ranges" => ipv4_dhcp_ranges.clone().map(Value::Str),
            "ipv4_nat" => nat("ipv4_nat", &ipv4_wanted),
            "ipv6_address" => ipv6.clone().map(Value::Str),
            "ipv6_nat" => nat("ipv6_nat", &ipv6_wanted),
            _ => net.desired.effective(def),
        };
        props.insert(def, value);
    }
    Ok(props)
}

pub fn plan(net: &Network, ctx: &RunContext) -> Result<Vec<Change>> {
    let path = &ctx.settings().legacy_bridge_file;
    let previous = read(path)?;
    let current = LegacyBridge::parse(&previous)?;
    log::debug!("legacy bridge on disk: {:?}", current);

    match net.ensure {
        Ensure::Absent if current.enabled && current.name == net.name => Ok(vec![Change::Delete]),
        Ensure::Absent => Ok(Vec::new()),
        Ensure::Present => {
            if current.enabled && current.name != net.name {
                return Err(Error::unsupported(
                    net.name.as_str(),
                    format!(
                        "the current LXD bridge ({}) does not have the same name; the legacy bridge supports a single network",
                        current.name
                    ),
                ));
            }

            let table = file_table();
            let wanted = desired(net, ctx, &table, &current.config)?;
            let drift = plan_changes(&table, &wanted, Some(&current.config));
            if current.enabled && drift.is_empty() {
                return Ok(Vec::new());
            }
            for change in &drift {
                log::debug!("{}: {}", net.name, change);
            }

            let content = LegacyBridge::with_properties(&net.name, &table, &wanted).render()?;
            Ok(vec![Change::Replace {
                target: path.display().to_string(),
                previous,
                content,
            }])
        }
    }
}

pub fn apply(net: &Network, change: &Change, ctx: &RunContext) -> Result<()> {
    let content = match change {
        Change::Replace { content, .. } => content.clone(),
        Change::Delete => LegacyBridge::disabled().render()?,
        _ => {
            return Err(Error::unsupported(
                net.name.as_str(),
                format!("the legacy bridge cannot {} a single key", change.verb()),
            ));
        }
    };

    let settings = ctx.settings();
    fs::write(&settings.legacy_bridge_file, content)?;
    log::info!("wrote {}", settings.legacy_bridge_file.display());
    ctx.run(&Command::new("systemctl").args(["restart", settings.legacy_bridge_service.as_str()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lxd::testing::{self, MockGateway};
    use crate::lxd::network::modern;
    use declarative::{ConvergencePlan, ExecuteOptions, execute_simple};
    use std::path::PathBuf;

    const BRIDGE_FILE: &str = r#"# Whether to setup a new bridge or use an existing one
USE_LXD_BRIDGE="true"
LXD_BRIDGE="lxdbr0"
UPDATE_PROFILE="true"
LXD_CONFILE=""
LXD_DOMAIN="lxd"
LXD_IPV4_ADDR="10.0.8.1"
LXD_IPV4_NETMASK="255.255.255.0"
LXD_IPV4_NETWORK="10.0.8.0/24"
LXD_IPV4_DHCP_RANGE="10.0.8.2,10.0.8.254"
LXD_IPV4_DHCP_MAX="253"
LXD_IPV4_NAT="true"
LXD_IPV6_ADDR=""
LXD_IPV6_MASK=""
LXD_IPV6_NETWORK=""
LXD_IPV6_NAT="false"
LXD_IPV6_PROXY="false"
"#;

    struct Host {
        _dir: tempfile::TempDir,
        file: PathBuf,
        gw: MockGateway,
        ctx: RunContext,
    }

    fn legacy_host(contents: Option<&str>) -> Host {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lxd-bridge");
        if let Some(contents) = contents {
            fs::write(&file, contents).unwrap();
        }
        let gw = MockGateway::new();
        gw.respond("lxc info", "api_extensions: []\n");
        gw.respond("hostname -I", "192.168.1.20\n");
        let ctx = testing::connect_with(&gw, testing::settings(dir.path(), &file)).unwrap();
        Host {
            _dir: dir,
            file,
            gw,
            ctx,
        }
    }

    fn converge(host: &Host, net: Network) -> declarative::Result<()> {
        let mut plan = ConvergencePlan::new();
        plan.push(Box::new(net));
        execute_simple(&plan, &host.ctx, &ExecuteOptions::default()).map(drop)
    }

    fn network(ensure: Ensure, props: &[(&str, RawValue)]) -> Network {
        Network::new("lxdbr0", ensure, props.iter().cloned()).unwrap()
    }

    fn setting(text: &str, key: &str) -> String {
        let prefix = format!("{}=\"", key);
        text.lines()
            .find_map(|l| l.strip_prefix(prefix.as_str()))
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or_else(|| panic!("{} missing", key))
            .to_string()
    }

    #[test]
    fn test_parse_bridge_file() {
        let bridge = LegacyBridge::parse(BRIDGE_FILE).unwrap();
        assert!(bridge.enabled);
        assert_eq!(bridge.name, "lxdbr0");
        assert_eq!(bridge.text("dns_domain").as_deref(), Some("lxd"));
        assert_eq!(bridge.text("raw_dnsmasq"), None);
        assert_eq!(bridge.text("ipv4_address").as_deref(), Some("10.0.8.1/24"));
        assert_eq!(
            bridge.text("ipv4_dhcp_ranges").as_deref(),
            Some("10.0.8.2-10.0.8.254")
        );
        assert_eq!(bridge.config.get("ipv4_nat"), Some(&Value::Bool(true)));
        assert_eq!(bridge.text("ipv6_address"), None);
        assert_eq!(bridge.config.get("ipv6_nat"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_bridge_file_reads_like_network_show() {
        let gw = MockGateway::modern();
        gw.respond(
            "lxc network show lxdbr0",
            "\
config:
  dns.domain: lxd
  ipv4.address: 10.0.8.1/24
  ipv4.dhcp.ranges: 10.0.8.2-10.0.8.254
  ipv4.nat: \"true\"
  ipv6.nat: \"false\"
managed: true
name: lxdbr0
type: bridge
",
        );
        let ctx = testing::connect(&gw);
        let shown = modern::load(&network(Ensure::Present, &[]), &ctx)
            .unwrap()
            .unwrap();

        assert_eq!(LegacyBridge::parse(BRIDGE_FILE).unwrap().config, shown);
    }

    #[test]
    fn test_disabled_bridge() {
        let bridge = LegacyBridge::parse("USE_LXD_BRIDGE=\"false\"\nLXD_BRIDGE=\"lxdbr0\"\n").unwrap();
        assert!(!bridge.enabled);
        assert!(!LegacyBridge::parse("").unwrap().enabled);
    }

    #[test]
    fn test_render_round_trips_through_parse() {
        let table = file_table();
        let props = PropertySet::from_raw(
            &table,
            [
                ("dns_domain", RawValue::from("lxd")),
                ("ipv4_address", "10.0.8.1/24".into()),
                ("ipv4_dhcp_ranges", "10.0.8.2-10.0.8.254".into()),
                ("ipv4_nat", RawValue::Bool(true)),
                ("ipv6_address", "fd42:1:2:3::1/64".into()),
                ("ipv6_nat", RawValue::Bool(false)),
            ],
        )
        .unwrap();
        let bridge = LegacyBridge::with_properties("lxdbr0", &table, &props);

        let text = bridge.render().unwrap();
        assert_eq!(setting(&text, "LXD_IPV4_NETMASK"), "255.255.255.0");
        assert_eq!(setting(&text, "LXD_IPV4_NETWORK"), "10.0.8.0/24");
        assert_eq!(setting(&text, "LXD_IPV4_DHCP_RANGE"), "10.0.8.2,10.0.8.254");
        assert_eq!(setting(&text, "LXD_IPV4_DHCP_MAX"), "253");
        assert_eq!(setting(&text, "LXD_IPV6_NETWORK"), "fd42:1:2:3::/64");
        assert_eq!(LegacyBridge::parse(&text).unwrap(), bridge);
    }

    #[test]
    fn test_matching_file_is_not_rewritten() {
        let host = legacy_host(Some(BRIDGE_FILE));
        let props = [
            ("ipv4_address", RawValue::from("10.0.8.1/24")),
            ("ipv4_nat", RawValue::Bool(true)),
            ("ipv6_address", "none".into()),
        ];
        converge(&host, network(Ensure::Present, &props)).unwrap();

        assert_eq!(fs::read_to_string(&host.file).unwrap(), BRIDGE_FILE);
        assert!(host.gw.mutations().is_empty());
    }

    #[test]
    fn test_drifted_property_rewrites_file() {
        let host = legacy_host(Some(BRIDGE_FILE));
        let props = [
            ("ipv4_address", RawValue::from("10.0.8.1/24")),
            ("ipv4_nat", RawValue::Bool(true)),
            ("ipv6_address", "none".into()),
            ("dns_domain", "lab".into()),
        ];
        converge(&host, network(Ensure::Present, &props)).unwrap();

        let text = fs::read_to_string(&host.file).unwrap();
        assert_eq!(setting(&text, "LXD_DOMAIN"), "lab");
        assert_eq!(setting(&text, "LXD_IPV4_ADDR"), "10.0.8.1");
        assert_eq!(host.gw.mutations(), ["systemctl restart lxd-bridge"]);
    }

    #[test]
    fn test_auto_address_generates_subnet_with_nat() {
        let host = legacy_host(None);
        converge(&host, network(Ensure::Present, &[("ipv6_address", "none".into())])).unwrap();

        let text = fs::read_to_string(&host.file).unwrap();
        let addr: Ipv4Addr = setting(&text, "LXD_IPV4_ADDR").parse().unwrap();
        let [a, _, y, d] = addr.octets();
        assert_eq!((a, d), (10, 1));
        assert!(y >= 1);
        assert_eq!(setting(&text, "LXD_IPV4_NETMASK"), "255.255.255.0");
        assert_eq!(setting(&text, "LXD_IPV4_NAT"), "true");
        assert_eq!(setting(&text, "LXD_IPV6_ADDR"), "");

        let range = setting(&text, "LXD_IPV4_DHCP_RANGE");
        let (start, end) = range.split_once(',').unwrap();
        assert!(start.ends_with(".2") && end.ends_with(".254"), "{}", range);

        assert_eq!(host.gw.mutations(), ["systemctl restart lxd-bridge"]);
    }

    #[test]
    fn test_converged_file_is_left_alone() {
        let host = legacy_host(None);
        let net = || network(Ensure::Present, &[("ipv4_address", "10.0.8.1/24".into())]);
        converge(&host, net()).unwrap();
        let first = fs::read_to_string(&host.file).unwrap();

        converge(&host, net()).unwrap();
        assert_eq!(fs::read_to_string(&host.file).unwrap(), first);
        assert_eq!(host.gw.mutations().len(), 1);
    }

    #[test]
    fn test_existing_auto_address_is_kept() {
        let host = legacy_host(Some(BRIDGE_FILE));
        converge(&host, network(Ensure::Present, &[])).unwrap();
        let text = fs::read_to_string(&host.file).unwrap();
        assert_eq!(setting(&text, "LXD_IPV4_ADDR"), "10.0.8.1");
        assert_eq!(setting(&text, "LXD_IPV4_DHCP_RANGE"), "10.0.8.2,10.0.8.254");
    }

    #[test]
    fn test_other_bridge_name_is_unsupported() {
        let host = legacy_host(Some(&BRIDGE_FILE.replace("\"lxdbr0\"", "\"br-old\"")));
        let err = converge(&host, network(Ensure::Present, &[])).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        assert!(err.to_string().contains("br-old"));
        assert!(host.gw.mutations().is_empty());
    }

    #[test]
    fn test_absent_disables_the_bridge() {
        let host = legacy_host(Some(BRIDGE_FILE));
        converge(&host, network(Ensure::Absent, &[])).unwrap();

        let text = fs::read_to_string(&host.file).unwrap();
        assert_eq!(setting(&text, "USE_LXD_BRIDGE"), "false");
        assert_eq!(setting(&text, "LXD_BRIDGE"), "");
        assert_eq!(host.gw.mutations(), ["systemctl restart lxd-bridge"]);

        // Already disabled: nothing left to do
        converge(&host, network(Ensure::Absent, &[])).unwrap();
        assert_eq!(host.gw.mutations().len(), 1);
    }
}
