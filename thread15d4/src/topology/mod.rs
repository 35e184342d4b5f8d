//! Neighbor, router and child tables.

pub mod child;
pub mod router;

use crate::config::MAX_ROUTE_COST;
use crate::frame::ExtAddress;
use crate::mac;
use crate::mle::DeviceMode;
use crate::time::Instant;
use crate::{Error, Result};

pub use child::{Child, ChildTable};
pub use router::{sequence_newer, Router, RouterTable};

/// RLOC16 of no node.
pub const INVALID_RLOC16: u16 = 0xfffe;
/// Router ID of no router.
pub const INVALID_ROUTER_ID: u8 = 63;

const CHILD_ID_MASK: u16 = 0x01ff;

pub const fn router_id_from_rloc16(rloc16: u16) -> u8 {
    (rloc16 >> 10) as u8
}

pub const fn child_id_from_rloc16(rloc16: u16) -> u16 {
    rloc16 & CHILD_ID_MASK
}

pub const fn rloc16_from_router_id(router_id: u8) -> u16 {
    (router_id as u16) << 10
}

/// Return `true` for the RLOC16 of a router (child ID zero).
pub const fn is_router_rloc16(rloc16: u16) -> bool {
    rloc16 != INVALID_RLOC16 && child_id_from_rloc16(rloc16) == 0 && router_id_from_rloc16(rloc16) < INVALID_ROUTER_ID
}

/// Link cost of a link quality, [`MAX_ROUTE_COST`] meaning no usable link.
pub const fn cost_for_link_quality(link_quality: u8) -> u8 {
    match link_quality {
        3 => 1,
        2 => 2,
        1 => 4,
        _ => MAX_ROUTE_COST,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NeighborState {
    #[default]
    Invalid,
    /// A Link Request was sent and the Link Accept is awaited.
    LinkRequest,
    /// A child is being attached (Child ID Request received).
    ChildIdRequest,
    Valid,
}

/// Link state shared by parents, routers and children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub ext_address: ExtAddress,
    pub rloc16: u16,
    pub state: NeighborState,
    pub mode: DeviceMode,
    pub key_sequence: u32,
    /// Next acceptable MAC frame counter.
    pub link_frame_counter: u32,
    /// Next acceptable MLE frame counter.
    pub mle_frame_counter: u32,
    pub last_heard: Instant,
    pub link_margin: u8,
    /// Challenge sent to this neighbor, echoed in its Response TLV.
    pub challenge: [u8; 8],
}

impl Neighbor {
    pub fn new(ext_address: ExtAddress, rloc16: u16, now: Instant) -> Self {
        Self {
            ext_address,
            rloc16,
            state: NeighborState::Invalid,
            mode: DeviceMode::empty(),
            key_sequence: 0,
            link_frame_counter: 0,
            mle_frame_counter: 0,
            last_heard: now,
            link_margin: 0,
            challenge: [0; 8],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == NeighborState::Valid
    }

    pub fn link_quality_in(&self) -> u8 {
        mac::link_quality(self.link_margin)
    }

    /// Fold a new link margin sample into the running average.
    pub fn update_link_margin(&mut self, margin: u8) {
        if self.link_margin == 0 {
            self.link_margin = margin;
        } else {
            self.link_margin = ((self.link_margin as u16 * 3 + margin as u16) / 4) as u8;
        }
    }

    fn check(&self, key_sequence: u32, frame_counter: u32, expected: u32) -> Result<()> {
        // an exhausted counter can never be committed past
        if frame_counter == u32::MAX {
            return Err(Error::Security);
        }
        if key_sequence < self.key_sequence
            || (key_sequence == self.key_sequence && frame_counter < expected)
        {
            return Err(Error::Drop);
        }
        Ok(())
    }

    fn switch_key_sequence(&mut self, key_sequence: u32) {
        if key_sequence != self.key_sequence {
            self.key_sequence = key_sequence;
            self.link_frame_counter = 0;
            self.mle_frame_counter = 0;
        }
    }

    /// Check a received MAC frame counter without updating any state.
    /// Replays and frames under an older key sequence return
    /// [`Error::Drop`]; the exhausted counter `u32::MAX` returns
    /// [`Error::Security`].
    pub fn check_link_frame_counter(&self, key_sequence: u32, frame_counter: u32) -> Result<()> {
        self.check(key_sequence, frame_counter, self.link_frame_counter)
    }

    /// Record an authenticated MAC frame counter.
    pub fn commit_link_frame_counter(&mut self, key_sequence: u32, frame_counter: u32) {
        self.switch_key_sequence(key_sequence);
        self.link_frame_counter = frame_counter.saturating_add(1);
    }

    pub fn check_mle_frame_counter(&self, key_sequence: u32, frame_counter: u32) -> Result<()> {
        self.check(key_sequence, frame_counter, self.mle_frame_counter)
    }

    pub fn commit_mle_frame_counter(&mut self, key_sequence: u32, frame_counter: u32) {
        self.switch_key_sequence(key_sequence);
        self.mle_frame_counter = frame_counter.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rloc16_layout() {
        assert_eq!(rloc16_from_router_id(1), 0x0400);
        assert_eq!(rloc16_from_router_id(62), 0xf800);
        assert_eq!(router_id_from_rloc16(0x0401), 1);
        assert_eq!(child_id_from_rloc16(0x0401), 1);
        assert!(is_router_rloc16(0x0400));
        assert!(is_router_rloc16(0x0000));
        assert!(!is_router_rloc16(0x0401));
        assert!(!is_router_rloc16(INVALID_RLOC16));
        assert!(!is_router_rloc16(0xfc00));
    }

    #[test]
    fn link_costs() {
        assert_eq!(cost_for_link_quality(3), 1);
        assert_eq!(cost_for_link_quality(2), 2);
        assert_eq!(cost_for_link_quality(1), 4);
        assert_eq!(cost_for_link_quality(0), MAX_ROUTE_COST);
    }

    #[test]
    fn replay_protection() {
        let mut neighbor = Neighbor::new(ExtAddress::default(), 0x0400, Instant::ZERO);
        neighbor.check_link_frame_counter(0, 0).unwrap();
        neighbor.commit_link_frame_counter(0, 10);

        assert_eq!(neighbor.check_link_frame_counter(0, 10), Err(Error::Drop));
        assert_eq!(neighbor.check_link_frame_counter(0, 3), Err(Error::Drop));
        neighbor.check_link_frame_counter(0, 11).unwrap();

        // a failed check leaves the counter untouched
        assert_eq!(neighbor.link_frame_counter, 11);

        // a newer key sequence restarts the counters
        neighbor.check_link_frame_counter(1, 0).unwrap();
        neighbor.commit_link_frame_counter(1, 0);
        assert_eq!(neighbor.check_link_frame_counter(0, 100), Err(Error::Drop));
        assert_eq!(neighbor.mle_frame_counter, 0);

        neighbor.commit_mle_frame_counter(1, 7);
        assert_eq!(neighbor.check_mle_frame_counter(1, 7), Err(Error::Drop));
        assert_eq!(neighbor.link_frame_counter, 1);
    }

    #[test]
    fn frame_counter_exhaustion() {
        let mut neighbor = Neighbor::new(ExtAddress::default(), 0x0400, Instant::ZERO);
        neighbor.commit_link_frame_counter(0, u32::MAX - 1);
        assert_eq!(neighbor.link_frame_counter, u32::MAX);

        // the counter does not wrap back to accepting old frames
        assert_eq!(neighbor.check_link_frame_counter(0, 5), Err(Error::Drop));
        assert_eq!(
            neighbor.check_link_frame_counter(0, u32::MAX),
            Err(Error::Security)
        );

        neighbor.commit_mle_frame_counter(0, u32::MAX);
        assert_eq!(neighbor.mle_frame_counter, u32::MAX);
        assert_eq!(neighbor.check_mle_frame_counter(0, 0), Err(Error::Drop));

        // only a new key sequence recovers the link
        neighbor.check_link_frame_counter(1, 0).unwrap();
    }

    #[test]
    fn link_margin_average() {
        let mut neighbor = Neighbor::new(ExtAddress::default(), 0, Instant::ZERO);
        neighbor.update_link_margin(40);
        assert_eq!(neighbor.link_margin, 40);
        neighbor.update_link_margin(0);
        assert_eq!(neighbor.link_margin, 30);
        assert_eq!(neighbor.link_quality_in(), 3);
    }
}
