//! MLE message commands and TLVs.

use core::net::Ipv6Addr;

use heapless::Vec;

use crate::config::MAX_ROUTER_ID;
use crate::utils::tlv::{self, TlvWriter};
use crate::{Error, Result};

pub(crate) mod tlv_type {
    pub const SOURCE_ADDRESS: u8 = 0;
    pub const MODE: u8 = 1;
    pub const TIMEOUT: u8 = 2;
    pub const CHALLENGE: u8 = 3;
    pub const RESPONSE: u8 = 4;
    pub const LINK_FRAME_COUNTER: u8 = 5;
    pub const MLE_FRAME_COUNTER: u8 = 8;
    pub const ROUTE64: u8 = 9;
    pub const ADDRESS16: u8 = 10;
    pub const LEADER_DATA: u8 = 11;
    pub const NETWORK_DATA: u8 = 12;
    pub const TLV_REQUEST: u8 = 13;
    pub const SCAN_MASK: u8 = 14;
    pub const CONNECTIVITY: u8 = 15;
    pub const LINK_MARGIN: u8 = 16;
    pub const STATUS: u8 = 17;
    pub const VERSION: u8 = 18;
    pub const ADDRESS_REGISTRATION: u8 = 19;
}

/// Scan Mask TLV: routers answer.
pub const SCAN_MASK_ROUTER: u8 = 0x80;
/// Scan Mask TLV: REEDs answer.
pub const SCAN_MASK_END_DEVICE: u8 = 0x40;

/// Status TLV value for a rejected request.
pub const STATUS_ERROR: u8 = 1;

/// Thread protocol version carried in the Version TLV.
pub const THREAD_VERSION: u16 = 2;

/// Length of the challenges this node generates.
pub const CHALLENGE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    LinkRequest = 0,
    LinkAccept = 1,
    LinkAcceptAndRequest = 2,
    LinkReject = 3,
    Advertisement = 4,
    DataRequest = 7,
    DataResponse = 8,
    ParentRequest = 9,
    ParentResponse = 10,
    ChildIdRequest = 11,
    ChildIdResponse = 12,
    ChildUpdateRequest = 13,
    ChildUpdateResponse = 14,
}

impl Command {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::LinkRequest,
            1 => Self::LinkAccept,
            2 => Self::LinkAcceptAndRequest,
            3 => Self::LinkReject,
            4 => Self::Advertisement,
            7 => Self::DataRequest,
            8 => Self::DataResponse,
            9 => Self::ParentRequest,
            10 => Self::ParentResponse,
            11 => Self::ChildIdRequest,
            12 => Self::ChildIdResponse,
            13 => Self::ChildUpdateRequest,
            14 => Self::ChildUpdateResponse,
            _ => return None,
        })
    }
}

/// Leader Data TLV.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LeaderData {
    pub partition_id: u32,
    pub weighting: u8,
    pub data_version: u8,
    pub stable_data_version: u8,
    pub leader_router_id: u8,
}

impl LeaderData {
    pub const LEN: usize = 8;

    pub fn parse(value: &[u8]) -> Result<Self> {
        let v: [u8; Self::LEN] = tlv::array(value)?;
        Ok(Self {
            partition_id: u32::from_be_bytes([v[0], v[1], v[2], v[3]]),
            weighting: v[4],
            data_version: v[5],
            stable_data_version: v[6],
            leader_router_id: v[7],
        })
    }

    pub(crate) fn emit(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        let id = self.partition_id.to_be_bytes();
        w.push(
            tlv_type::LEADER_DATA,
            &[
                id[0],
                id[1],
                id[2],
                id[3],
                self.weighting,
                self.data_version,
                self.stable_data_version,
                self.leader_router_id,
            ],
        )
    }

    /// Order partitions: higher weighting first, then higher partition ID.
    pub fn compare_partition(&self, other: &Self) -> core::cmp::Ordering {
        self.weighting
            .cmp(&other.weighting)
            .then(self.partition_id.cmp(&other.partition_id))
    }
}

/// One router of a Route64 TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub router_id: u8,
    pub link_quality_out: u8,
    pub link_quality_in: u8,
    /// Route cost, zero meaning unreachable.
    pub cost: u8,
}

impl RouteEntry {
    fn from_byte(router_id: u8, b: u8) -> Self {
        Self {
            router_id,
            link_quality_out: b >> 6,
            link_quality_in: (b >> 4) & 0b11,
            cost: b & 0x0f,
        }
    }

    fn to_byte(self) -> u8 {
        (self.link_quality_out & 0b11) << 6
            | (self.link_quality_in & 0b11) << 4
            | (self.cost & 0x0f)
    }
}

/// Route64 TLV: the router set and one route entry per allocated router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route64 {
    pub id_sequence: u8,
    pub mask: [u8; 8],
    pub entries: Vec<RouteEntry, { MAX_ROUTER_ID as usize + 1 }>,
}

impl Route64 {
    pub fn is_allocated(mask: &[u8; 8], router_id: u8) -> bool {
        router_id <= MAX_ROUTER_ID && mask[router_id as usize / 8] & (0x80 >> (router_id % 8)) != 0
    }

    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 9 {
            return Err(Error::Parse);
        }
        let mut mask = [0u8; 8];
        mask.copy_from_slice(&value[1..9]);

        let mut entries = Vec::new();
        let mut data = value[9..].iter();
        for id in 0..=MAX_ROUTER_ID {
            if Self::is_allocated(&mask, id) {
                let b = data.next().ok_or(Error::Parse)?;
                entries
                    .push(RouteEntry::from_byte(id, *b))
                    .map_err(|_| Error::Parse)?;
            }
        }
        // bit 63 of the mask must be clear
        if mask[7] & 0x01 != 0 {
            return Err(Error::Parse);
        }

        Ok(Self {
            id_sequence: value[0],
            mask,
            entries,
        })
    }

    pub(crate) fn emit(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        let mut value = [0u8; 9 + MAX_ROUTER_ID as usize + 1];
        value[0] = self.id_sequence;
        value[1..9].copy_from_slice(&self.mask);
        for (slot, entry) in value[9..].iter_mut().zip(self.entries.iter()) {
            *slot = entry.to_byte();
        }
        w.push(tlv_type::ROUTE64, &value[..9 + self.entries.len()])
    }

    pub fn router_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, router_id: u8) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.router_id == router_id)
    }
}

/// Connectivity TLV sent in Parent Responses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    /// Parent priority, -1..=1.
    pub parent_priority: i8,
    pub link_quality_3: u8,
    pub link_quality_2: u8,
    pub link_quality_1: u8,
    pub leader_cost: u8,
    pub id_sequence: u8,
    pub active_routers: u8,
}

impl Connectivity {
    pub fn parse(value: &[u8]) -> Result<Self> {
        let v: [u8; 7] = tlv::array(value)?;
        Ok(Self {
            parent_priority: (v[0] as i8) >> 6,
            link_quality_3: v[1],
            link_quality_2: v[2],
            link_quality_1: v[3],
            leader_cost: v[4],
            id_sequence: v[5],
            active_routers: v[6],
        })
    }

    pub(crate) fn emit(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.push(
            tlv_type::CONNECTIVITY,
            &[
                ((self.parent_priority as u8) & 0b11) << 6,
                self.link_quality_3,
                self.link_quality_2,
                self.link_quality_1,
                self.leader_cost,
                self.id_sequence,
                self.active_routers,
            ],
        )
    }
}

const REGISTRATION_COMPRESSED: u8 = 0x80;
const REGISTRATION_CONTEXT_MASK: u8 = 0x0f;

/// Append an Address Registration TLV. Addresses under `mesh_local_prefix`
/// are compressed with context 0.
pub(crate) fn emit_address_registration(
    w: &mut TlvWriter<'_>,
    mesh_local_prefix: &[u8; 8],
    addresses: impl Iterator<Item = Ipv6Addr>,
) -> Result<()> {
    let mut value = [0u8; 4 * 17];
    let mut len = 0;
    for address in addresses {
        let octets = address.octets();
        let entry_len = if octets[..8] == mesh_local_prefix[..] { 9 } else { 17 };
        let Some(entry) = value.get_mut(len..len + entry_len) else {
            break;
        };
        if entry_len == 9 {
            entry[0] = REGISTRATION_COMPRESSED;
            entry[1..].copy_from_slice(&octets[8..]);
        } else {
            entry[0] = 0;
            entry[1..].copy_from_slice(&octets);
        }
        len += entry_len;
    }
    w.push(tlv_type::ADDRESS_REGISTRATION, &value[..len])
}

/// Iterate over the addresses of an Address Registration TLV. Compressed
/// entries with a context other than 0 are skipped.
pub fn address_registrations<'a>(
    value: &'a [u8],
    mesh_local_prefix: &'a [u8; 8],
) -> impl Iterator<Item = Ipv6Addr> + 'a {
    let mut rest = value;
    core::iter::from_fn(move || loop {
        let (&control, tail) = rest.split_first()?;
        if control & REGISTRATION_COMPRESSED != 0 {
            let iid = tail.get(..8)?;
            rest = &tail[8..];
            if control & REGISTRATION_CONTEXT_MASK != 0 {
                continue;
            }
            let mut octets = [0u8; 16];
            octets[..8].copy_from_slice(mesh_local_prefix);
            octets[8..].copy_from_slice(iid);
            return Some(Ipv6Addr::from(octets));
        } else {
            let full = tail.get(..16)?;
            rest = &tail[16..];
            let mut octets = [0u8; 16];
            octets.copy_from_slice(full);
            return Some(Ipv6Addr::from(octets));
        }
    })
}
