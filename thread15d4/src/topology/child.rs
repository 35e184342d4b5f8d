//! Child table of a router.

use core::net::Ipv6Addr;

use heapless::{Deque, Vec};

use crate::config::{MAX_CHILDREN, MAX_CHILD_ADDRESSES, MAX_INDIRECT_FRAMES};
use crate::frame::ExtAddress;
use crate::message::Message;
use crate::mle::DeviceMode;
use crate::time::{Duration, Instant};
use crate::{Error, Result};

use super::{child_id_from_rloc16, rloc16_from_router_id, Neighbor, NeighborState};

const MAX_CHILD_ID: u16 = 0x01ff;

pub struct Child {
    pub neighbor: Neighbor,
    /// Child timeout in seconds.
    pub timeout: u32,
    pub addresses: Vec<Ipv6Addr, MAX_CHILD_ADDRESSES>,
    /// Frames waiting for a Data Request poll.
    pub indirect: Deque<Message, MAX_INDIRECT_FRAMES>,
    /// Network Data version last sent to the child.
    pub network_data_version: u8,
}

impl Child {
    pub fn rloc16(&self) -> u16 {
        self.neighbor.rloc16
    }

    pub fn mode(&self) -> DeviceMode {
        self.neighbor.mode
    }

    pub fn is_rx_on_when_idle(&self) -> bool {
        self.neighbor.mode.contains(DeviceMode::RX_ON_WHEN_IDLE)
    }

    pub fn has_address(&self, address: &Ipv6Addr) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    /// Replace the registered addresses. Addresses beyond the capacity are
    /// ignored.
    pub fn set_addresses(&mut self, addresses: impl Iterator<Item = Ipv6Addr>) {
        self.addresses.clear();
        for address in addresses {
            if self.addresses.push(address).is_err() {
                break;
            }
        }
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.saturating_since(self.neighbor.last_heard)
            > Duration::from_secs(self.timeout as i64)
    }
}

pub struct ChildTable {
    children: Vec<Child, MAX_CHILDREN>,
    last_child_id: u16,
}

impl Default for ChildTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildTable {
    pub const fn new() -> Self {
        Self {
            children: Vec::new(),
            last_child_id: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        MAX_CHILDREN
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Child> {
        self.children.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Child> {
        self.children.iter_mut()
    }

    pub fn valid(&self) -> impl Iterator<Item = &Child> {
        self.children.iter().filter(|c| c.neighbor.is_valid())
    }

    pub fn find_by_ext(&self, ext: &ExtAddress) -> Option<&Child> {
        self.children.iter().find(|c| c.neighbor.ext_address == *ext)
    }

    pub fn find_by_ext_mut(&mut self, ext: &ExtAddress) -> Option<&mut Child> {
        self.children
            .iter_mut()
            .find(|c| c.neighbor.ext_address == *ext)
    }

    pub fn find_by_rloc16(&self, rloc16: u16) -> Option<&Child> {
        self.valid().find(|c| c.neighbor.rloc16 == rloc16)
    }

    pub fn find_by_rloc16_mut(&mut self, rloc16: u16) -> Option<&mut Child> {
        self.children
            .iter_mut()
            .find(|c| c.neighbor.is_valid() && c.neighbor.rloc16 == rloc16)
    }

    pub fn find_by_ip6(&self, address: &Ipv6Addr) -> Option<&Child> {
        self.valid().find(|c| c.has_address(address))
    }

    /// Start attaching a child, reusing its entry when it is already known.
    pub fn add(&mut self, ext: ExtAddress, now: Instant) -> Result<&mut Child> {
        if let Some(index) = self
            .children
            .iter()
            .position(|c| c.neighbor.ext_address == ext)
        {
            return Ok(&mut self.children[index]);
        }

        let mut neighbor = Neighbor::new(ext, super::INVALID_RLOC16, now);
        neighbor.state = NeighborState::ChildIdRequest;
        self.children
            .push(Child {
                neighbor,
                timeout: 0,
                addresses: Vec::new(),
                indirect: Deque::new(),
                network_data_version: 0,
            })
            .map_err(|_| Error::NoBufs)?;

        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Allocate an unused RLOC16 below `router_id`.
    pub fn allocate_rloc16(&mut self, router_id: u8) -> Result<u16> {
        for _ in 0..MAX_CHILD_ID {
            self.last_child_id = if self.last_child_id >= MAX_CHILD_ID {
                1
            } else {
                self.last_child_id + 1
            };
            let rloc16 = rloc16_from_router_id(router_id) | self.last_child_id;
            if !self
                .children
                .iter()
                .any(|c| child_id_from_rloc16(c.neighbor.rloc16) == self.last_child_id)
            {
                return Ok(rloc16);
            }
        }
        Err(Error::NoBufs)
    }

    /// Remove a child. The caller owns the returned queued messages.
    pub fn remove(&mut self, ext: &ExtAddress) -> Option<Child> {
        let index = self
            .children
            .iter()
            .position(|c| c.neighbor.ext_address == *ext)?;
        Some(self.children.remove(index))
    }

    /// Remove every child.
    pub fn drain(&mut self) -> impl Iterator<Item = Child> + '_ {
        core::iter::from_fn(move || self.children.pop()).fuse()
    }

    /// Extended addresses of children whose timeout elapsed.
    pub fn timed_out(&self, now: Instant) -> Vec<ExtAddress, MAX_CHILDREN> {
        self.children
            .iter()
            .filter(|c| c.neighbor.is_valid() && c.is_timed_out(now))
            .map(|c| c.neighbor.ext_address)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageInfo, MessagePool};

    fn ext(n: u8) -> ExtAddress {
        ExtAddress::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    fn attach(table: &mut ChildTable, n: u8, now: Instant) -> u16 {
        let rloc16 = table.allocate_rloc16(1).unwrap();
        let child = table.add(ext(n), now).unwrap();
        child.neighbor.rloc16 = rloc16;
        child.neighbor.state = NeighborState::Valid;
        child.timeout = 10;
        rloc16
    }

    #[test]
    fn lookups() {
        let mut table = ChildTable::new();
        let a = attach(&mut table, 1, Instant::ZERO);
        let b = attach(&mut table, 2, Instant::ZERO);
        assert_eq!(a, 0x0401);
        assert_eq!(b, 0x0402);

        let address: Ipv6Addr = "fd00::1234".parse().unwrap();
        table
            .find_by_ext_mut(&ext(2))
            .unwrap()
            .set_addresses([address].into_iter());

        assert_eq!(table.find_by_rloc16(a).unwrap().neighbor.ext_address, ext(1));
        assert_eq!(table.find_by_ip6(&address).unwrap().rloc16(), b);
        assert!(table.find_by_rloc16(0x0403).is_none());

        let order: std::vec::Vec<_> = table.iter().map(|c| c.rloc16()).collect();
        assert_eq!(order, [a, b]);
    }

    #[test]
    fn capacity_and_ids() {
        let mut table = ChildTable::new();
        for n in 0..MAX_CHILDREN as u8 {
            attach(&mut table, n, Instant::ZERO);
        }
        assert_eq!(table.add(ext(200), Instant::ZERO).err(), Some(Error::NoBufs));

        // a known child keeps its entry
        assert!(table.add(ext(0), Instant::ZERO).is_ok());

        let removed = table.remove(&ext(0)).unwrap();
        assert_eq!(removed.rloc16(), 0x0401);
        assert!(table.add(ext(200), Instant::ZERO).is_ok());
    }

    #[test]
    fn timeout() {
        let mut table = ChildTable::new();
        attach(&mut table, 1, Instant::ZERO);
        assert!(table.timed_out(Instant::from_ms(10_000)).is_empty());
        assert_eq!(&table.timed_out(Instant::from_ms(10_001))[..], &[ext(1)]);
    }

    #[test]
    fn indirect_queue_is_returned_on_removal() {
        let mut pool = MessagePool::<4>::new();
        let mut table = ChildTable::new();
        attach(&mut table, 1, Instant::ZERO);

        let message = pool.allocate(MessageInfo::default()).unwrap();
        let child = table.find_by_ext_mut(&ext(1)).unwrap();
        assert!(child.indirect.push_back(message).is_ok());
        assert_eq!(pool.free_buffers(), 3);

        for mut child in table.drain() {
            while let Some(message) = child.indirect.pop_front() {
                pool.free(message);
            }
        }
        assert!(table.is_empty());
        assert_eq!(pool.free_buffers(), 4);
    }
}
