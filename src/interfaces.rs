//! Local network interface discovery and allow-list filtering.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

use tracing::trace;

/// Destination used for the IPv6 entry of an interface.
///
/// IPv6 has no broadcast. The link-local all-nodes group is the closest
/// counterpart, scoped to the interface; delivery semantics are those of
/// multicast, not broadcast.
pub const IPV6_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::V4 => "ipv4",
            Family::V6 => "ipv6",
        })
    }
}

/// One address of one interface that can be broadcast to.
///
/// Recomputed for every broadcast cycle, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name (e.g., "eth0").
    pub name: String,
    pub family: Family,
    /// Address datagrams for this entry are sent to.
    pub broadcast: IpAddr,
    /// The interface's own address.
    pub local: IpAddr,
    /// OS interface index, used as the IPv6 scope.
    pub index: u32,
}

impl NetworkInterface {
    /// Builds an IPv4 entry, deriving the broadcast address from the prefix.
    pub fn ipv4(name: impl Into<String>, index: u32, local: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            name: name.into(),
            family: Family::V4,
            broadcast: IpAddr::V4(broadcast_v4(local, prefix_len)),
            local: IpAddr::V4(local),
            index,
        }
    }

    pub fn ipv6(name: impl Into<String>, index: u32, local: Ipv6Addr) -> Self {
        Self {
            name: name.into(),
            family: Family::V6,
            broadcast: IpAddr::V6(IPV6_ALL_NODES),
            local: IpAddr::V6(local),
            index,
        }
    }

    /// The local address as a numeric host string.
    pub fn local_host(&self) -> String {
        self.local.to_string()
    }

    /// Socket address datagrams for this entry go to.
    pub fn destination(&self, port: u16) -> SocketAddr {
        match self.broadcast {
            IpAddr::V4(addr) => SocketAddr::new(IpAddr::V4(addr), port),
            IpAddr::V6(addr) => SocketAddr::V6(SocketAddrV6::new(addr, port, 0, self.index)),
        }
    }
}

/// Directed broadcast address of an IPv4 network.
pub fn broadcast_v4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let host_mask = if prefix_len >= 32 {
        0
    } else {
        u32::MAX >> prefix_len
    };
    Ipv4Addr::from(u32::from(addr) | host_mask)
}

/// Source of the interfaces a broadcast cycle iterates over.
pub trait InterfaceSource: Send + Sync {
    /// Every interface address that has a broadcast destination, in OS order.
    fn list(&self) -> Vec<NetworkInterface>;
}

/// Interfaces as reported by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn list(&self) -> Vec<NetworkInterface> {
        let mut out = Vec::new();
        for iface in netdev::get_interfaces() {
            if !iface.is_broadcast() {
                trace!("Skipping {}: no broadcast address", iface.name);
                continue;
            }
            out.extend(
                iface
                    .ipv4
                    .iter()
                    .map(|net| NetworkInterface::ipv4(&iface.name, iface.index, net.addr(), net.prefix_len())),
            );
            out.extend(
                iface
                    .ipv6
                    .iter()
                    .map(|net| NetworkInterface::ipv6(&iface.name, iface.index, net.addr())),
            );
        }
        out
    }
}

/// Whether an interface name passes the allow-list.
///
/// An empty list allows everything. Otherwise the name only has to occur
/// somewhere inside the list, so `"eth0,wlan1"` also allows `"eth"` and
/// `"lan1"`.
pub fn is_allowed(name: &str, allow_list: &str) -> bool {
    allow_list.is_empty() || allow_list.contains(name)
}

/// The eligible subset of `interfaces`, preserving order.
pub fn filter(interfaces: Vec<NetworkInterface>, allow_list: &str) -> Vec<NetworkInterface> {
    interfaces
        .into_iter()
        .filter(|iface| is_allowed(&iface.name, allow_list))
        .collect()
}
