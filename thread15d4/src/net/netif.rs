//! The Thread network interface: its unicast addresses and multicast
//! subscriptions.

use core::net::Ipv6Addr;

use heapless::Vec;

use crate::{Error, Result};

use super::ip6::{self, prefix_match};

const MAX_UNICAST_ADDRESSES: usize = 8;
const MAX_MULTICAST_ADDRESSES: usize = 8;

const SCOPE_LINK_LOCAL: u8 = 2;
const SCOPE_GLOBAL: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressOrigin {
    /// Link-local, mesh-local EID, RLOC and ALOC addresses.
    Thread,
    /// Addresses configured from on-mesh prefixes.
    Slaac,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetifAddress {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub origin: AddressOrigin,
}

fn scope(address: &Ipv6Addr) -> u8 {
    if address.is_multicast() {
        address.octets()[1] & 0x0f
    } else if ip6::is_link_local(address) {
        SCOPE_LINK_LOCAL
    } else {
        SCOPE_GLOBAL
    }
}

#[derive(Default)]
pub struct Netif {
    unicast: Vec<NetifAddress, MAX_UNICAST_ADDRESSES>,
    multicast: Vec<Ipv6Addr, MAX_MULTICAST_ADDRESSES>,
}

impl Netif {
    pub const fn new() -> Self {
        Self {
            unicast: Vec::new(),
            multicast: Vec::new(),
        }
    }

    pub fn unicast_addresses(&self) -> impl Iterator<Item = &NetifAddress> {
        self.unicast.iter()
    }

    pub fn multicast_addresses(&self) -> impl Iterator<Item = &Ipv6Addr> {
        self.multicast.iter()
    }

    /// Add an address, or update the entry of a known one.
    pub fn add_unicast(&mut self, entry: NetifAddress) -> Result<()> {
        if let Some(existing) = self.unicast.iter_mut().find(|a| a.address == entry.address) {
            *existing = entry;
            return Ok(());
        }
        self.unicast.push(entry).map_err(|_| Error::NoBufs)
    }

    pub fn remove_unicast(&mut self, address: &Ipv6Addr) -> Result<()> {
        let index = self
            .unicast
            .iter()
            .position(|a| a.address == *address)
            .ok_or(Error::NoAddress)?;
        self.unicast.remove(index);
        Ok(())
    }

    /// Remove every address of one origin.
    pub fn remove_origin(&mut self, origin: AddressOrigin) {
        self.unicast.retain(|a| a.origin != origin);
    }

    pub fn has_unicast(&self, address: &Ipv6Addr) -> bool {
        self.unicast.iter().any(|a| a.address == *address)
    }

    pub fn subscribe(&mut self, address: Ipv6Addr) -> Result<()> {
        if !address.is_multicast() {
            return Err(Error::InvalidArgs);
        }
        if self.multicast.contains(&address) {
            return Ok(());
        }
        self.multicast.push(address).map_err(|_| Error::NoBufs)
    }

    pub fn unsubscribe(&mut self, address: &Ipv6Addr) -> Result<()> {
        let index = self
            .multicast
            .iter()
            .position(|a| a == address)
            .ok_or(Error::NoAddress)?;
        self.multicast.remove(index);
        Ok(())
    }

    pub fn is_subscribed(&self, address: &Ipv6Addr) -> bool {
        self.multicast.contains(address)
    }

    /// Return `true` when a datagram to `address` is for this interface.
    pub fn accepts(&self, address: &Ipv6Addr) -> bool {
        if address.is_multicast() {
            self.is_subscribed(address)
        } else {
            self.has_unicast(address)
        }
    }

    /// Return `true` when `address` is covered by the prefix of one of the
    /// interface addresses.
    pub fn is_on_link(&self, address: &Ipv6Addr) -> bool {
        self.unicast.iter().any(|a| {
            prefix_match(&a.address.octets(), &address.octets(), a.prefix_len).is_some()
        })
    }

    /// Pick the source address for a datagram to `destination`.
    pub fn select_source(&self, destination: &Ipv6Addr) -> Option<Ipv6Addr> {
        let dst_scope = scope(destination);
        let link_scoped = dst_scope <= SCOPE_LINK_LOCAL;
        let matching = |a: &Ipv6Addr| ip6::common_prefix_len(a, destination);

        let mut best: Option<&NetifAddress> = None;
        for candidate in self.unicast.iter() {
            let address = &candidate.address;
            if link_scoped && !ip6::is_link_local(address) {
                continue;
            }
            if address == destination {
                return Some(*address);
            }
            let Some(current) = best else {
                best = Some(candidate);
                continue;
            };

            let (scope_candidate, scope_current) = (scope(address), scope(&current.address));
            if scope_candidate < scope_current {
                if scope_candidate >= dst_scope {
                    best = Some(candidate);
                }
            } else if scope_candidate > scope_current {
                if scope_current < dst_scope {
                    best = Some(candidate);
                }
            } else if matching(address) > matching(&current.address) {
                best = Some(candidate);
            }
        }
        best.map(|a| a.address)
    }
}
