//! Bridges managed through `lxc network`

use declarative::{Change, Error, Result, Snapshot, plan_changes, property_changes};

use super::address::AUTO;
use super::{NETWORK_TABLE, Network};
use crate::lxd::wire::{self, ConfigDocument};
use crate::lxd::{Ensure, RunContext};

/// Current network config, or `None` when it does not exist
pub fn load(net: &Network, ctx: &RunContext) -> Result<Option<Snapshot>> {
    let Some(text) = ctx.query(&wire::lxc(["network", "show", net.name.as_str()]))? else {
        return Ok(None);
    };
    let doc: ConfigDocument = wire::parse(&format!("network {}", net.name), &text)?;
    Snapshot::from_wire(NETWORK_TABLE, doc.entries()).map(Some)
}

pub fn plan(net: &Network, ctx: &RunContext) -> Result<Vec<Change>> {
    let current = load(net, ctx)?;
    Ok(match (net.ensure, current) {
        (Ensure::Absent, Some(_)) => vec![Change::Delete],
        (Ensure::Absent, None) => Vec::new(),
        (Ensure::Present, None) => {
            let mut changes = plan_changes(NETWORK_TABLE, &net.desired, None);
            for change in &mut changes {
                if let Change::Create { initial } = change {
                    initial.retain(|a| !(a.key == "ipv4.dhcp.ranges" && a.value == AUTO));
                }
            }
            changes
        }
        (Ensure::Present, Some(current)) => property_changes(NETWORK_TABLE, &net.desired, &current)
            .into_iter()
            .filter(|change| keeps(change, &current))
            .collect(),
    })
}

/// `auto` is only meaningful while the daemon has nothing assigned; once it
/// has, sending `auto` again would pick a new subnet
fn keeps(change: &Change, current: &Snapshot) -> bool {
    let Change::Set(a) = change else {
        return true;
    };
    if a.value != AUTO {
        return true;
    }
    match a.key.as_str() {
        "ipv4.dhcp.ranges" => false,
        "ipv4.address" => current.get("ipv4_address").is_none(),
        "ipv6.address" => current.get("ipv6_address").is_none(),
        _ => true,
    }
}

pub fn apply(net: &Network, change: &Change, ctx: &RunContext) -> Result<()> {
    let name = net.name.as_str();
    match change {
        Change::Create { initial } => ctx.run(
            &wire::lxc(["network", "create", name])
                .args(initial.iter().map(|a| format!("{}={}", a.key, a.value))),
        ),
        Change::Set(a) => ctx.run(&wire::lxc([
            "network",
            "set",
            name,
            a.key.as_str(),
            a.value.as_str(),
        ])),
        Change::Unset { key } => ctx.run(&wire::lxc(["network", "unset", name, key.as_str()])),
        Change::Delete => ctx.run(&wire::lxc(["network", "delete", name])),
        Change::Replace { .. } => Err(Error::unsupported(
            name,
            "managed networks are converged key by key",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lxd::testing::{self, MockGateway};
    use declarative::{ConvergencePlan, ExecuteOptions, RawValue, execute_simple};

    const SHOW: &str = "\
config:
  ipv4.address: 10.44.1.1/24
  ipv4.nat: \"true\"
  ipv6.address: fd42:6b1a:c2e9:e6bc::1/64
  ipv6.nat: \"true\"
description: ''
managed: true
name: lxdbr0
type: bridge
used_by: []
";

    fn converge(gw: &MockGateway, net: Network) -> Vec<String> {
        let ctx = testing::connect(gw);
        let mut plan = ConvergencePlan::new();
        plan.push(Box::new(net));
        execute_simple(&plan, &ctx, &ExecuteOptions::default()).unwrap();
        gw.mutations()
    }

    #[test]
    fn test_create_skips_auto_dhcp_ranges() {
        let gw = MockGateway::modern();
        gw.missing("lxc network show lxdbr0");
        let net = Network::new(
            "lxdbr0",
            Ensure::Present,
            [
                ("ipv4_address", RawValue::from("10.0.3.1/24")),
                ("ipv4_dhcp_ranges", "auto".into()),
                ("ipv4_nat", RawValue::Bool(true)),
                ("ipv6_address", "none".into()),
            ],
        )
        .unwrap();

        assert_eq!(
            converge(&gw, net),
            ["lxc network create lxdbr0 ipv4.address=10.0.3.1/24 ipv4.nat=true ipv6.address=none"]
        );
    }

    #[test]
    fn test_assigned_auto_address_is_kept() {
        let gw = MockGateway::modern();
        gw.respond("lxc network show lxdbr0", SHOW);
        let net = Network::new(
            "lxdbr0",
            Ensure::Present,
            [
                ("ipv4_address", RawValue::from("auto")),
                ("ipv6_address", "auto".into()),
                ("ipv4_nat", RawValue::Bool(true)),
            ],
        )
        .unwrap();

        assert!(converge(&gw, net).is_empty());
    }

    #[test]
    fn test_changed_settings_are_set_and_cleared() {
        let gw = MockGateway::modern();
        gw.respond("lxc network show lxdbr0", SHOW);
        let net = Network::new(
            "lxdbr0",
            Ensure::Present,
            [
                ("ipv4_address", RawValue::from("10.50.0.1/24")),
                ("ipv6_nat", "".into()),
                ("raw_dnsmasq", "dhcp-option=6,1.1.1.1".into()),
            ],
        )
        .unwrap();

        assert_eq!(
            converge(&gw, net),
            [
                "lxc network set lxdbr0 raw.dnsmasq dhcp-option=6,1.1.1.1",
                "lxc network set lxdbr0 ipv4.address 10.50.0.1/24",
                "lxc network unset lxdbr0 ipv6.nat",
            ]
        );
    }

    #[test]
    fn test_absent_network_is_deleted() {
        let gw = MockGateway::modern();
        gw.respond("lxc network show lxdbr0", SHOW);
        let net = Network::new("lxdbr0", Ensure::Absent, Vec::<(&str, RawValue)>::new()).unwrap();
        assert_eq!(converge(&gw, net), ["lxc network delete lxdbr0"]);
    }
}
