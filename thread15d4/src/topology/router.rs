//! Router table indexed by Router ID.
//!
//! The table mirrors the router set of the partition (the Router ID mask
//! and its sequence number), the links to neighboring routers, and one
//! distance-vector route per router: the next hop and the cost that next hop
//! advertised for the destination.

use crate::config::{CONTEXT_ID_REUSE_DELAY, MAX_ROUTER_ID, MAX_ROUTE_COST};
use crate::frame::ExtAddress;
use crate::time::{Duration, Instant};
use crate::{Error, Result};

use super::{cost_for_link_quality, rloc16_from_router_id, Neighbor, NeighborState, INVALID_ROUTER_ID};

const ROUTER_COUNT: usize = MAX_ROUTER_ID as usize + 1;

/// A router of the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    pub router_id: u8,
    /// Link state, valid when the router is a neighbor.
    pub neighbor: Neighbor,
    /// Link quality the router reports for frames it receives from us.
    pub link_quality_out: u8,
    pub next_hop: u8,
    /// Cost advertised by `next_hop` towards this router.
    pub cost: u8,
}

impl Router {
    fn new(router_id: u8) -> Self {
        Self {
            router_id,
            neighbor: Neighbor::new(
                ExtAddress::default(),
                rloc16_from_router_id(router_id),
                Instant::ZERO,
            ),
            link_quality_out: 0,
            next_hop: INVALID_ROUTER_ID,
            cost: MAX_ROUTE_COST,
        }
    }

    /// Cost of the direct link, [`MAX_ROUTE_COST`] without a valid link.
    pub fn link_cost(&self) -> u8 {
        if self.neighbor.is_valid() {
            cost_for_link_quality(self.neighbor.link_quality_in().min(self.link_quality_out))
        } else {
            MAX_ROUTE_COST
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    allocated: bool,
    /// The ID may not be handed out again before this instant.
    reusable_at: Option<Instant>,
    router: Router,
}

pub struct RouterTable {
    slots: [Slot; ROUTER_COUNT],
    id_sequence: u8,
}

impl Default for RouterTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare two 8-bit sequence numbers with wrap-around.
pub fn sequence_newer(a: u8, b: u8) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < 128
}

impl RouterTable {
    pub fn new() -> Self {
        let mut slots = [Slot {
            allocated: false,
            reusable_at: None,
            router: Router::new(0),
        }; ROUTER_COUNT];
        for (id, slot) in slots.iter_mut().enumerate() {
            slot.router = Router::new(id as u8);
        }
        Self {
            slots,
            id_sequence: 0,
        }
    }

    /// Forget every router and link.
    pub fn clear(&mut self) {
        *self = Self {
            id_sequence: self.id_sequence,
            ..Self::new()
        };
    }

    pub fn id_sequence(&self) -> u8 {
        self.id_sequence
    }

    pub fn set_id_sequence(&mut self, id_sequence: u8) {
        self.id_sequence = id_sequence;
    }

    pub fn is_allocated(&self, router_id: u8) -> bool {
        self.slots
            .get(router_id as usize)
            .map(|s| s.allocated)
            .unwrap_or(false)
    }

    /// Leader: allocate a Router ID, `preferred` when it is free.
    pub fn allocate(&mut self, preferred: Option<u8>, now: Instant) -> Result<u8> {
        let available = |slot: &Slot| {
            !slot.allocated && slot.reusable_at.map(|t| now >= t).unwrap_or(true)
        };

        let id = match preferred {
            Some(id) if self.slots.get(id as usize).map(available).unwrap_or(false) => id,
            _ => self
                .slots
                .iter()
                .position(available)
                .ok_or(Error::NoBufs)? as u8,
        };

        self.slots[id as usize] = Slot {
            allocated: true,
            reusable_at: None,
            router: Router::new(id),
        };
        self.id_sequence = self.id_sequence.wrapping_add(1);
        Ok(id)
    }

    /// Leader: release a Router ID. The ID stays unavailable for
    /// `CONTEXT_ID_REUSE_DELAY` seconds.
    pub fn release(&mut self, router_id: u8, now: Instant) -> Result<()> {
        let slot = self
            .slots
            .get_mut(router_id as usize)
            .filter(|s| s.allocated)
            .ok_or(Error::NoAddress)?;
        slot.allocated = false;
        slot.reusable_at = Some(now + Duration::from_secs(CONTEXT_ID_REUSE_DELAY as i64));
        slot.router = Router::new(router_id);
        self.invalidate_routes_via(router_id);
        self.id_sequence = self.id_sequence.wrapping_add(1);
        Ok(())
    }

    /// Router ID mask, bit 7 of the first byte being Router ID 0.
    pub fn mask(&self) -> [u8; 8] {
        let mut mask = [0u8; 8];
        for id in self.allocated_ids() {
            mask[id as usize / 8] |= 0x80 >> (id % 8);
        }
        mask
    }

    /// Adopt the router set of the partition. Routers leaving the set lose
    /// their link and routes.
    pub fn update_router_set(&mut self, id_sequence: u8, mask: &[u8; 8]) {
        for id in 0..ROUTER_COUNT {
            let in_mask = mask[id / 8] & (0x80 >> (id % 8)) != 0;
            let slot = &mut self.slots[id];
            if in_mask && !slot.allocated {
                slot.allocated = true;
                slot.router = Router::new(id as u8);
            } else if !in_mask && slot.allocated {
                slot.allocated = false;
                slot.router = Router::new(id as u8);
                self.invalidate_routes_via(id as u8);
            }
        }
        self.id_sequence = id_sequence;
    }

    pub fn allocated_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.allocated)
            .map(|(id, _)| id as u8)
    }

    pub fn count(&self) -> usize {
        self.allocated_ids().count()
    }

    pub fn get(&self, router_id: u8) -> Option<&Router> {
        self.slots
            .get(router_id as usize)
            .filter(|s| s.allocated)
            .map(|s| &s.router)
    }

    pub fn get_mut(&mut self, router_id: u8) -> Option<&mut Router> {
        self.slots
            .get_mut(router_id as usize)
            .filter(|s| s.allocated)
            .map(|s| &mut s.router)
    }

    /// Routers with a valid link.
    pub fn neighbors(&self) -> impl Iterator<Item = &Router> + '_ {
        self.slots
            .iter()
            .filter(|s| s.allocated && s.router.neighbor.is_valid())
            .map(|s| &s.router)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors().count()
    }

    pub fn neighbor_by_ext_mut(&mut self, ext: &ExtAddress) -> Option<&mut Router> {
        self.slots
            .iter_mut()
            .filter(|s| s.allocated && s.router.neighbor.state != NeighborState::Invalid)
            .map(|s| &mut s.router)
            .find(|r| r.neighbor.ext_address == *ext)
    }

    pub fn neighbor_by_ext(&self, ext: &ExtAddress) -> Option<&Router> {
        self.neighbors().find(|r| r.neighbor.ext_address == *ext)
    }

    /// Drop the link to a router and every route through it.
    pub fn remove_link(&mut self, router_id: u8) {
        if let Some(router) = self.get_mut(router_id) {
            router.neighbor.state = NeighborState::Invalid;
            router.link_quality_out = 0;
        }
        self.invalidate_routes_via(router_id);
    }

    fn invalidate_routes_via(&mut self, router_id: u8) {
        for slot in self.slots.iter_mut() {
            if slot.router.next_hop == router_id {
                slot.router.next_hop = INVALID_ROUTER_ID;
                slot.router.cost = MAX_ROUTE_COST;
            }
        }
    }

    /// Cost of the direct link to `router_id`.
    pub fn link_cost(&self, router_id: u8) -> u8 {
        self.get(router_id)
            .map(|r| r.link_cost())
            .unwrap_or(MAX_ROUTE_COST)
    }

    /// Best next hop and total cost towards `router_id`, if reachable.
    pub fn best_route(&self, router_id: u8) -> Option<(u8, u8)> {
        let router = self.get(router_id)?;

        let direct = router.link_cost();
        let mut best = (router_id, direct);

        if router.next_hop != INVALID_ROUTER_ID && router.next_hop != router_id {
            let via = router
                .cost
                .saturating_add(self.link_cost(router.next_hop));
            if via < best.1 {
                best = (router.next_hop, via);
            }
        }

        if best.1 >= MAX_ROUTE_COST {
            None
        } else {
            Some(best)
        }
    }

    /// Next hop Router ID towards `router_id`.
    pub fn next_hop(&self, router_id: u8) -> Option<u8> {
        self.best_route(router_id).map(|(hop, _)| hop)
    }

    /// Total cost towards `router_id`, [`MAX_ROUTE_COST`] when unreachable.
    pub fn route_cost(&self, router_id: u8) -> u8 {
        self.best_route(router_id)
            .map(|(_, cost)| cost)
            .unwrap_or(MAX_ROUTE_COST)
    }

    /// Routers with a link whose last frame is older than `max_age`.
    pub fn stale_links(&self, now: Instant, max_age: Duration) -> impl Iterator<Item = u8> + '_ {
        self.neighbors()
            .filter(move |r| now.saturating_since(r.neighbor.last_heard) > max_age)
            .map(|r| r.router_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(table: &mut RouterTable, id: u8, lq: u8) {
        let router = table.get_mut(id).unwrap();
        router.neighbor.state = NeighborState::Valid;
        router.neighbor.link_margin = match lq {
            3 => 40,
            2 => 15,
            1 => 5,
            _ => 0,
        };
        router.link_quality_out = lq;
    }

    #[test]
    fn allocation_and_reuse_delay() {
        let mut table = RouterTable::new();
        let t0 = Instant::from_ms(0);
        assert_eq!(table.allocate(Some(5), t0), Ok(5));
        assert_eq!(table.allocate(Some(5), t0), Ok(0));
        assert_eq!(table.id_sequence(), 2);
        assert_eq!(table.mask(), [0x84, 0, 0, 0, 0, 0, 0, 0]);

        table.release(5, t0).unwrap();
        assert_eq!(table.release(5, t0), Err(Error::NoAddress));
        assert_eq!(table.id_sequence(), 3);

        let early = t0 + Duration::from_secs(CONTEXT_ID_REUSE_DELAY as i64 - 1);
        assert_eq!(table.allocate(Some(5), early), Ok(1));

        let late = t0 + Duration::from_secs(CONTEXT_ID_REUSE_DELAY as i64);
        assert_eq!(table.allocate(Some(5), late), Ok(5));
    }

    #[test]
    fn table_full() {
        let mut table = RouterTable::new();
        for id in 0..=MAX_ROUTER_ID {
            assert_eq!(table.allocate(None, Instant::ZERO), Ok(id));
        }
        assert_eq!(table.allocate(None, Instant::ZERO), Err(Error::NoBufs));
        assert_eq!(table.count(), 63);
    }

    #[test]
    fn router_set_update() {
        let mut table = RouterTable::new();
        table.allocate(Some(1), Instant::ZERO).unwrap();
        table.allocate(Some(2), Instant::ZERO).unwrap();
        link(&mut table, 2, 3);

        let mut mask = [0u8; 8];
        mask[0] = 0x60; // ids 1 and 2
        table.update_router_set(9, &mask);
        assert!(table.get(2).unwrap().neighbor.is_valid());

        mask[0] = 0x40; // id 1 only
        table.update_router_set(10, &mask);
        assert!(!table.is_allocated(2));
        assert_eq!(table.id_sequence(), 10);
        assert_eq!(table.neighbor_count(), 0);
    }

    #[test]
    fn routes() {
        let mut table = RouterTable::new();
        for id in [1, 2, 3] {
            table.allocate(Some(id), Instant::ZERO).unwrap();
        }
        link(&mut table, 1, 3);
        link(&mut table, 2, 1);

        assert_eq!(table.best_route(1), Some((1, 1)));
        assert_eq!(table.best_route(2), Some((2, 4)));
        assert_eq!(table.best_route(3), None);

        // 1 reaches 2 and 3 at cost 1
        table.get_mut(2).unwrap().next_hop = 1;
        table.get_mut(2).unwrap().cost = 1;
        table.get_mut(3).unwrap().next_hop = 1;
        table.get_mut(3).unwrap().cost = 1;
        assert_eq!(table.best_route(2), Some((1, 2)));
        assert_eq!(table.next_hop(3), Some(1));
        assert_eq!(table.route_cost(3), 2);

        table.remove_link(1);
        assert_eq!(table.next_hop(3), None);
        assert_eq!(table.route_cost(3), MAX_ROUTE_COST);
        assert_eq!(table.best_route(2), Some((2, 4)));
    }

    #[test]
    fn sequence_comparison() {
        assert!(sequence_newer(1, 0));
        assert!(sequence_newer(0, 255));
        assert!(!sequence_newer(0, 0));
        assert!(!sequence_newer(0, 1));
        assert!(!sequence_newer(128, 0));
    }
}
