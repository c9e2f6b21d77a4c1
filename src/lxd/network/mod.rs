//! Bridged networks
//!
//! Hosts come in two bridge generations. Current daemons manage any number
//! of bridges through `lxc network`; older ones run a single bridge
//! configured by a flat `KEY="value"` file and a service. The same
//! properties drive both, see [`modern`] and [`legacy`].

pub mod address;
pub mod legacy;
pub mod modern;

use declarative::property::find;
use declarative::{Change, Entity, PropertyDef, PropertySet, RawValue, Result, Value};

use super::{BridgeGeneration, Ensure, RunContext};

const BRIDGE_DRIVERS: &[&str] = &["native", "openvswitch"];
const BRIDGE_MODES: &[&str] = &["standard", "fan"];
const DNS_MODES: &[&str] = &["none", "managed", "dynamic"];
const FAN_TYPES: &[&str] = &["vxlan", "ipip"];

pub const NETWORK_TABLE: &[PropertyDef] = &[
    PropertyDef::sym("bridge_driver", BRIDGE_DRIVERS).default_str("native"),
    PropertyDef::str("bridge_external_interfaces").wire("bridge.external_interfaces"),
    PropertyDef::sym("bridge_mode", BRIDGE_MODES).default_str("standard"),
    PropertyDef::int("bridge_mtu").default_int(1500),
    PropertyDef::str("raw_dnsmasq"),
    PropertyDef::str("dns_domain").default_str("lxd"),
    PropertyDef::sym("dns_mode", DNS_MODES).default_str("managed"),
    PropertyDef::str("fan_overlay_subnet")
        .default_str("240.0.0.0/8")
        .wire("fan.overlay_subnet"),
    PropertyDef::sym("fan_type", FAN_TYPES).default_str("vxlan"),
    PropertyDef::str("fan_underlay_subnet").wire("fan.underlay_subnet"),
    PropertyDef::str("ipv4_address").default_str(address::AUTO),
    PropertyDef::bool("ipv4_dhcp").default_bool(true),
    PropertyDef::str("ipv4_dhcp_expiry"),
    PropertyDef::str("ipv4_dhcp_ranges").default_str(address::AUTO),
    PropertyDef::bool("ipv4_firewall").default_bool(true),
    PropertyDef::bool("ipv4_nat"),
    PropertyDef::str("ipv4_routes"),
    PropertyDef::bool("ipv4_routing").default_bool(true),
    PropertyDef::str("ipv6_address").default_str(address::AUTO),
    PropertyDef::bool("ipv6_dhcp").default_bool(true),
    PropertyDef::str("ipv6_dhcp_expiry"),
    PropertyDef::str("ipv6_dhcp_ranges"),
    PropertyDef::bool("ipv6_dhcp_stateful").default_bool(false),
    PropertyDef::bool("ipv6_firewall").default_bool(true),
    PropertyDef::bool("ipv6_nat"),
    PropertyDef::str("ipv6_routes"),
    PropertyDef::bool("ipv6_routing").default_bool(true),
];

#[derive(Debug)]
pub struct Network {
    name: String,
    ensure: Ensure,
    desired: PropertySet,
}

impl Network {
    pub fn new<I, K>(name: impl Into<String>, ensure: Ensure, props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: AsRef<str>,
    {
        Ok(Self {
            name: name.into(),
            ensure,
            desired: PropertySet::from_raw(NETWORK_TABLE, props)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Desired value of a property in wire form, defaults included
    fn wanted(&self, name: &str) -> Option<String> {
        let def = find(NETWORK_TABLE, name)?;
        self.desired.effective(def).map(|v| v.to_wire())
    }

    /// Explicitly configured boolean, ignoring defaults
    fn explicit_bool(&self, name: &str) -> Option<bool> {
        self.desired.get(name).and_then(Value::as_bool)
    }
}

impl Entity<RunContext> for Network {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn entity_type(&self) -> &'static str {
        "network"
    }

    fn description(&self) -> String {
        format!("network {}", self.name)
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Change>> {
        match ctx.generation() {
            BridgeGeneration::Modern => modern::plan(self, ctx),
            BridgeGeneration::Legacy => legacy::plan(self, ctx),
        }
    }

    fn apply(&self, change: &Change, ctx: &RunContext) -> Result<()> {
        match ctx.generation() {
            BridgeGeneration::Modern => modern::apply(self, change, ctx),
            BridgeGeneration::Legacy => legacy::apply(self, change, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_feed_wanted_values() {
        let net = Network::new("lxdbr0", Ensure::Present, [("ipv4_nat", RawValue::from("true"))])
            .unwrap();
        assert_eq!(net.wanted("ipv4_address").as_deref(), Some("auto"));
        assert_eq!(net.wanted("dns_domain").as_deref(), Some("lxd"));
        assert_eq!(net.wanted("raw_dnsmasq"), None);
        assert_eq!(net.explicit_bool("ipv4_nat"), Some(true));
        assert_eq!(net.explicit_bool("ipv6_nat"), None);
    }

    #[test]
    fn test_lists_are_joined() {
        let net = Network::new(
            "lxdbr0",
            Ensure::Present,
            [(
                "ipv4_routes",
                RawValue::List(vec!["10.1.0.0/16".into(), "10.2.0.0/16".into()]),
            )],
        )
        .unwrap();
        assert_eq!(
            net.wanted("ipv4_routes").as_deref(),
            Some("10.1.0.0/16,10.2.0.0/16")
        );
    }

    #[test]
    fn test_invalid_symbol_is_rejected() {
        let err = Network::new("lxdbr0", Ensure::Present, [("dns_mode", RawValue::from("bogus"))])
            .unwrap_err();
        assert!(err.to_string().contains("dns_mode"));
    }
}
