//! Bridge address helpers shared by both bridge generations
//!
//! Everything here is pure: randomness comes in through the caller's RNG and
//! the host's own addresses are passed in, so results are reproducible.

use declarative::{Error, Result};
use ipnet::{Ipv4Net, Ipv6Net};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Placeholder asking for a generated subnet
pub const AUTO: &str = "auto";
/// Placeholder disabling an address family
pub const NONE: &str = "none";

/// Attempts before giving up on finding a free private subnet
const MAX_ATTEMPTS: usize = 512;

/// Resolve an IPv4 bridge address setting to a concrete network
///
/// `none` (or nothing) disables IPv4. `auto` keeps whatever the bridge
/// already uses and otherwise picks a random `10.x.y.1/24` that does not
/// overlap any address of the host.
pub fn resolve_ipv4<R: Rng + ?Sized>(
    requested: Option<&str>,
    current: Option<&str>,
    host_addrs: &[IpAddr],
    rng: &mut R,
) -> Result<Option<Ipv4Net>> {
    match requested {
        None | Some(NONE) => Ok(None),
        Some(AUTO) => {
            if let Some(net) = current.and_then(|a| a.parse::<Ipv4Net>().ok()) {
                return Ok(Some(net));
            }
            for _ in 0..MAX_ATTEMPTS {
                let addr = Ipv4Addr::new(10, rng.gen_range(0..255), rng.gen_range(1..255), 1);
                let net = Ipv4Net::new(addr, 24)
                    .map_err(|e| Error::invalid("ipv4_address", e.to_string()))?;
                let taken = host_addrs
                    .iter()
                    .any(|addr| matches!(addr, IpAddr::V4(v4) if net.contains(v4)));
                if !taken {
                    return Ok(Some(net));
                }
                log::debug!("{} is in use on this host, retrying", net.trunc());
            }
            Err(Error::invalid(
                "ipv4_address",
                "no free 10.x.y.0/24 subnet found for auto",
            ))
        }
        Some(cidr) => parse_ipv4(cidr).map(Some),
    }
}

/// Resolve an IPv6 bridge address setting to a concrete network
///
/// Same rules as [`resolve_ipv4`], generating a unique local
/// `fdXX:XXXX:XXXX:XXXX::1/64` whose /64 is not used on the host.
pub fn resolve_ipv6<R: Rng + ?Sized>(
    requested: Option<&str>,
    current: Option<&str>,
    host_addrs: &[IpAddr],
    rng: &mut R,
) -> Result<Option<Ipv6Net>> {
    match requested {
        None | Some(NONE) => Ok(None),
        Some(AUTO) => {
            if let Some(net) = current.and_then(|a| a.parse::<Ipv6Net>().ok()) {
                return Ok(Some(net));
            }
            for _ in 0..MAX_ATTEMPTS {
                let addr = Ipv6Addr::new(
                    0xfd00 | rng.gen_range(0..=255u16),
                    rng.gen_range(0..=u16::MAX),
                    rng.gen_range(0..=u16::MAX),
                    rng.gen_range(0..=u16::MAX),
                    0,
                    0,
                    0,
                    1,
                );
                let net = Ipv6Net::new(addr, 64)
                    .map_err(|e| Error::invalid("ipv6_address", e.to_string()))?;
                let taken = host_addrs
                    .iter()
                    .any(|addr| matches!(addr, IpAddr::V6(v6) if net.contains(v6)));
                if !taken {
                    return Ok(Some(net));
                }
            }
            Err(Error::invalid(
                "ipv6_address",
                "no free unique local /64 found for auto",
            ))
        }
        Some(cidr) => parse_ipv6(cidr).map(Some),
    }
}

/// Parse an IPv4 `addr/prefix`, keeping the host part
pub fn parse_ipv4(cidr: &str) -> Result<Ipv4Net> {
    cidr.trim()
        .parse()
        .map_err(|_| Error::invalid("ipv4_address", format!("'{}' is not an IPv4 CIDR", cidr)))
}

/// Parse an IPv6 `addr/prefix`, keeping the host part
pub fn parse_ipv6(cidr: &str) -> Result<Ipv6Net> {
    cidr.trim()
        .parse()
        .map_err(|_| Error::invalid("ipv6_address", format!("'{}' is not an IPv6 CIDR", cidr)))
}

/// Derive a single DHCP range for a bridge address
///
/// The range follows the bridge address up to the last usable host. When
/// the bridge sits in the last three addresses of its subnet the range runs
/// from the first usable host up to just before the bridge instead. Network
/// and broadcast addresses are never part of the range.
pub fn derive_dhcp_range(net: Ipv4Net) -> Result<(Ipv4Addr, Ipv4Addr)> {
    if net.prefix_len() >= 30 {
        return Err(Error::invalid(
            "ipv4_dhcp_ranges",
            format!(
                "subnet /{} is too small to generate a DHCP range; set ipv4_dhcp_ranges or use a larger subnet",
                net.prefix_len()
            ),
        ));
    }

    let host = u32::from(net.addr());
    let network = u32::from(net.network());
    let broadcast = u32::from(net.broadcast());

    let (start, end) = if host > broadcast - 3 {
        (network + 1, host - 1)
    } else {
        (host + 1, broadcast - 1)
    };
    Ok((Ipv4Addr::from(start), Ipv4Addr::from(end)))
}

/// Number of addresses in an inclusive range
pub fn range_size(start: Ipv4Addr, end: Ipv4Addr) -> u64 {
    let (start, end) = (u64::from(u32::from(start)), u64::from(u32::from(end)));
    if end < start { 0 } else { end - start + 1 }
}

/// Effective NAT setting for an address family
///
/// An explicit `false` always wins. Otherwise a generated (`auto`) address
/// turns NAT on, and anything else keeps the configured value.
pub fn resolve_nat(explicit: Option<bool>, address_is_auto: bool) -> Option<bool> {
    match explicit {
        Some(false) => Some(false),
        _ if address_is_auto => Some(true),
        other => other,
    }
}
