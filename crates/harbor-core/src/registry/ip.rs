//! App network addressing.
//!
//! Addresses come from the instance's CIDR. The first four addresses of the
//! range are never handed out: the network address, the gateway (`.1`), the
//! bridge (`.2`) and one kept for the instance itself (`.3`). The broadcast
//! address is never handed out either.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::domain::HarborError;

/// Leading addresses of the range that are never assigned to apps.
pub const RESERVED_LEADING: u32 = 4;

/// An IPv4 network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    base: u32,
    prefix: u8,
}

impl Network {
    fn mask(&self) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0)
    }

    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base | !self.mask())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == self.base
    }

    /// Assignable addresses in ascending order.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let first = self.base + RESERVED_LEADING;
        let broadcast = u32::from(self.broadcast());
        (first..broadcast).map(Ipv4Addr::from)
    }
}

impl FromStr for Network {
    type Err = HarborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarborError::InvalidNetwork(s.to_string());

        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr = Ipv4Addr::from_str(addr).map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        // needs room for the reserved addresses, one host and broadcast
        if prefix > 29 {
            return Err(invalid());
        }

        let mut net = Network { base: 0, prefix };
        net.base = u32::from(addr) & net.mask();
        Ok(net)
    }
}

/// Lowest assignable address of `network` not present in `used`.
pub fn allocate(
    network: &str,
    used: impl IntoIterator<Item = Ipv4Addr>,
) -> Result<Ipv4Addr, HarborError> {
    let net: Network = network.parse()?;
    let used: HashSet<Ipv4Addr> = used.into_iter().filter(|ip| net.contains(*ip)).collect();

    net.hosts()
        .find(|ip| !used.contains(ip))
        .ok_or_else(|| HarborError::NoIpAvailable(network.to_string()))
}
