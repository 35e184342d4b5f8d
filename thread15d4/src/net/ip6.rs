//! IPv6 addressing helpers used by Thread: interface identifiers derived
//! from MAC addresses, routing and anycast locators, and prefixes.

use core::net::Ipv6Addr;

use crate::frame::ExtAddress;
use crate::{Error, Result};

/// `ff02::1`
pub const LINK_LOCAL_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
/// `ff02::2`
pub const LINK_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);
/// `ff03::1`
pub const REALM_LOCAL_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff03, 0, 0, 0, 0, 0, 0, 1);
/// `ff03::2`
pub const REALM_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff03, 0, 0, 0, 0, 0, 0, 2);

/// Anycast locator of the Leader.
pub const LEADER_ALOC16: u16 = 0xfc00;

pub const UDP_HEADER_LEN: usize = 8;
pub const NEXT_HEADER_UDP: u8 = 17;

/// First six bytes of the IID of a routing or anycast locator.
const LOCATOR_IID_BASE: [u8; 6] = [0, 0, 0, 0xff, 0xfe, 0];
const UNIVERSAL_LOCAL: u8 = 0x02;

const LINK_LOCAL_PREFIX: [u8; 8] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0];

/// The interface identifier: the last 8 bytes of an address.
pub fn iid(address: &Ipv6Addr) -> [u8; 8] {
    let octets = address.octets();
    let mut iid = [0u8; 8];
    iid.copy_from_slice(&octets[8..]);
    iid
}

/// Interface identifier derived from an extended address (U/L bit inverted).
pub fn iid_from_ext(ext: &ExtAddress) -> [u8; 8] {
    let mut iid = *ext.as_bytes();
    iid[0] ^= UNIVERSAL_LOCAL;
    iid
}

pub fn ext_from_iid(iid: &[u8; 8]) -> ExtAddress {
    let mut bytes = *iid;
    bytes[0] ^= UNIVERSAL_LOCAL;
    ExtAddress::new(bytes)
}

pub fn from_parts(prefix: &[u8; 8], iid: &[u8; 8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(prefix);
    octets[8..].copy_from_slice(iid);
    Ipv6Addr::from(octets)
}

pub fn link_local(ext: &ExtAddress) -> Ipv6Addr {
    from_parts(&LINK_LOCAL_PREFIX, &iid_from_ext(ext))
}

pub fn locator_iid(locator16: u16) -> [u8; 8] {
    let mut iid = [0u8; 8];
    iid[..6].copy_from_slice(&LOCATOR_IID_BASE);
    iid[6..].copy_from_slice(&locator16.to_be_bytes());
    iid
}

/// Routing (or anycast) locator `prefix::ff:fe00:xxxx`.
pub fn locator(mesh_local_prefix: &[u8; 8], locator16: u16) -> Ipv6Addr {
    from_parts(mesh_local_prefix, &locator_iid(locator16))
}

/// The 16-bit locator of an RLOC or ALOC within the mesh-local prefix.
pub fn locator16(mesh_local_prefix: &[u8; 8], address: &Ipv6Addr) -> Option<u16> {
    let octets = address.octets();
    if octets[..8] == mesh_local_prefix[..] && octets[8..14] == LOCATOR_IID_BASE {
        Some(u16::from_be_bytes([octets[14], octets[15]]))
    } else {
        None
    }
}

/// Return `true` for `ff:fe00:fc00` and above.
pub fn is_aloc16(locator16: u16) -> bool {
    locator16 >= LEADER_ALOC16
}

pub fn is_link_local(address: &Ipv6Addr) -> bool {
    address.octets()[..8] == LINK_LOCAL_PREFIX
}

pub fn is_link_local_multicast(address: &Ipv6Addr) -> bool {
    address.is_multicast() && address.octets()[1] & 0x0f == 0x02
}

pub fn is_mesh_local(mesh_local_prefix: &[u8; 8], address: &Ipv6Addr) -> bool {
    address.octets()[..8] == mesh_local_prefix[..]
}

/// Number of leading bits `a` and `b` have in common, compared
/// byte-by-byte over the bytes covering `length` bits. `None` when fewer
/// than `length` bits match.
pub fn prefix_match(a: &[u8], b: &[u8], length: u8) -> Option<u8> {
    let bytes = (length as usize).div_ceil(8);
    if a.len() < bytes || b.len() < bytes {
        return None;
    }

    let mut matched = 0u8;
    for (x, y) in a[..bytes].iter().zip(&b[..bytes]) {
        let diff = x ^ y;
        if diff == 0 {
            matched += 8;
        } else {
            matched += diff.leading_zeros() as u8;
            break;
        }
    }

    (matched >= length).then_some(matched)
}

/// Length of the longest common prefix of two addresses.
pub fn common_prefix_len(a: &Ipv6Addr, b: &Ipv6Addr) -> u8 {
    let (a, b) = (u128::from_be_bytes(a.octets()), u128::from_be_bytes(b.octets()));
    (a ^ b).leading_zeros() as u8
}

/// An IPv6 prefix of up to 128 bits. Bits past `len` are zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Prefix {
    bytes: [u8; 16],
    len: u8,
}

impl Prefix {
    pub fn new(bytes: &[u8], len: u8) -> Result<Self> {
        let size = (len as usize).div_ceil(8);
        if len > 128 || bytes.len() < size {
            return Err(Error::InvalidArgs);
        }
        let mut prefix = Self { bytes: [0; 16], len };
        prefix.bytes[..size].copy_from_slice(&bytes[..size]);
        if len % 8 != 0 {
            prefix.bytes[size - 1] &= 0xff << (8 - len % 8);
        }
        Ok(prefix)
    }

    pub fn from_address(address: &Ipv6Addr, len: u8) -> Result<Self> {
        Self::new(&address.octets(), len)
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes covering the prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..(self.len as usize).div_ceil(8)]
    }

    pub fn contains(&self, address: &Ipv6Addr) -> bool {
        prefix_match(&self.bytes, &address.octets(), self.len).is_some()
    }

    /// Return `true` for a non-empty prefix outside link-local and multicast.
    pub fn is_valid_on_mesh(&self) -> bool {
        self.len > 0 && self.bytes[0] != 0xfe && self.bytes[0] != 0xff
    }
}

/// UDP endpoints of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpInfo {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub hop_limit: u8,
    /// The datagram was protected by MAC security.
    pub link_security: bool,
}

fn sum(mut acc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        acc += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        acc += (*last as u32) << 8;
    }
    acc
}

/// UDP checksum over the pseudo-header, the UDP header (with a zero
/// checksum field) and `payload`.
pub fn udp_checksum(info: &UdpInfo, payload: &[u8]) -> u16 {
    let length = (UDP_HEADER_LEN + payload.len()) as u32;

    let mut acc = sum(0, &info.src.octets());
    acc = sum(acc, &info.dst.octets());
    acc += length + NEXT_HEADER_UDP as u32;
    acc += info.src_port as u32 + info.dst_port as u32 + length;
    acc = sum(acc, payload);

    while acc > 0xffff {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    match !(acc as u16) {
        0 => 0xffff,
        checksum => checksum,
    }
}
