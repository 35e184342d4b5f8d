//! 6LoWPAN encapsulation (RFC 4944 mesh addressing, RFC 6282 IPHC) for UDP
//! datagrams.
//!
//! Only the forms Thread control traffic needs are produced and accepted:
//! elided traffic class and flow label, an inline next header (UDP, with an
//! uncompressed UDP header), and stateless or context 0 (mesh-local prefix)
//! address compression. Anything else is reported as [`Error::Parse`].

use core::net::Ipv6Addr;

use crate::frame::Address;
use crate::{Error, Result};

use super::ip6::{self, UdpInfo, NEXT_HEADER_UDP, UDP_HEADER_LEN};

mod iphc {
    pub const DISPATCH: u8 = 0x60;
    pub const DISPATCH_MASK: u8 = 0xe0;

    // First byte masks

    pub const TF_MASK: u8 = 0x18;
    pub const TF_ELIDED: u8 = 0x18;

    pub const NH: u8 = 0x04;

    pub const HLIM_MASK: u8 = 0x03;
    pub const HLIM_INLINE: u8 = 0x00;
    pub const HLIM_1: u8 = 0x01;
    pub const HLIM_64: u8 = 0x02;
    pub const HLIM_255: u8 = 0x03;

    // Second byte masks

    pub const CID: u8 = 0x80;

    pub const SAC: u8 = 0x40;

    pub const SAM_MASK: u8 = 0x30;
    pub const SAM_INLINE: u8 = 0x00;
    pub const SAM_MODE1: u8 = 0x10;
    pub const SAM_MODE2: u8 = 0x20;
    pub const SAM_MODE3: u8 = 0x30;

    pub const MULTICAST: u8 = 0x08;

    pub const DAC: u8 = 0x04;
    pub const DAM_MASK: u8 = 0x03;
    pub const DAM_INLINE: u8 = 0x00;
    pub const DAM_MODE1: u8 = 0x01;
    pub const DAM_MODE2: u8 = 0x02;
    pub const DAM_MODE3: u8 = 0x03;

    pub const MAC_BASE: [u8; 8] = [0, 0, 0, 0xff, 0xfe, 0, 0, 0];
}

mod mesh {
    pub const DISPATCH: u8 = 0x80;
    pub const DISPATCH_MASK: u8 = 0xc0;
    /// Originator and final destination are 16-bit addresses.
    pub const SHORT_ADDRESSES: u8 = 0x30;
    pub const HOPS_MASK: u8 = 0x0f;
}

/// Largest hop count carried in the mesh header without an extra byte.
pub const MAX_HOPS: u8 = 14;

/// RFC 4944 mesh addressing header with 16-bit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeshHeader {
    pub hops_left: u8,
    pub originator: u16,
    pub final_destination: u16,
}

impl MeshHeader {
    pub const LEN: usize = 5;

    /// Parse a mesh header at the start of `buffer`, if there is one.
    pub fn parse(buffer: &[u8]) -> Result<Option<Self>> {
        let Some(&dispatch) = buffer.first() else {
            return Err(Error::Parse);
        };
        if dispatch & mesh::DISPATCH_MASK != mesh::DISPATCH {
            return Ok(None);
        }
        if dispatch & mesh::SHORT_ADDRESSES != mesh::SHORT_ADDRESSES
            || dispatch & mesh::HOPS_MASK > MAX_HOPS
            || buffer.len() < Self::LEN
        {
            return Err(Error::Parse);
        }
        Ok(Some(Self {
            hops_left: dispatch & mesh::HOPS_MASK,
            originator: u16::from_be_bytes([buffer[1], buffer[2]]),
            final_destination: u16::from_be_bytes([buffer[3], buffer[4]]),
        }))
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.len() < Self::LEN || self.hops_left > MAX_HOPS {
            return Err(Error::NoBufs);
        }
        buffer[0] = mesh::DISPATCH | mesh::SHORT_ADDRESSES | self.hops_left;
        buffer[1..3].copy_from_slice(&self.originator.to_be_bytes());
        buffer[3..5].copy_from_slice(&self.final_destination.to_be_bytes());
        Ok(Self::LEN)
    }
}

/// Interface identifier derived from a link-layer address.
fn compute_iid(mac_addr: &Address) -> Option<[u8; 8]> {
    match mac_addr {
        Address::Short(short) => {
            let mut iid = iphc::MAC_BASE;
            iid[6..].copy_from_slice(&short.to_be_bytes());
            Some(iid)
        }
        Address::Extended(ext) => Some(ip6::iid_from_ext(ext)),
        Address::Absent => None,
    }
}

/// Link-layer addresses IIDs are elided against: the MAC source and
/// destination, or the mesh originator and final destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddresses {
    pub src: Address,
    pub dst: Address,
}

struct Writer<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl Writer<'_> {
    fn put(&mut self, data: &[u8]) -> Result<()> {
        let end = self.offset + data.len();
        if end > self.buffer.len() {
            return Err(Error::NoBufs);
        }
        self.buffer[self.offset..end].copy_from_slice(data);
        self.offset = end;
        Ok(())
    }
}

fn compress_iid(address: &Ipv6Addr, mac_addr: &Address, w: &mut Writer<'_>) -> Result<u8> {
    let octets = address.octets();
    if compute_iid(mac_addr).is_some_and(|iid| octets[8..] == iid) {
        Ok(iphc::SAM_MODE3)
    } else if octets[8..14] == iphc::MAC_BASE[..6] {
        w.put(&octets[14..])?;
        Ok(iphc::SAM_MODE2)
    } else {
        w.put(&octets[8..])?;
        Ok(iphc::SAM_MODE1)
    }
}

fn compress_src(
    address: &Ipv6Addr,
    mac_addr: &Address,
    mesh_local_prefix: &[u8; 8],
    w: &mut Writer<'_>,
) -> Result<u8> {
    if address.is_unspecified() {
        Ok(iphc::SAC | iphc::SAM_INLINE)
    } else if ip6::is_link_local(address) {
        compress_iid(address, mac_addr, w)
    } else if ip6::is_mesh_local(mesh_local_prefix, address) {
        Ok(iphc::SAC | compress_iid(address, mac_addr, w)?)
    } else {
        w.put(&address.octets())?;
        Ok(iphc::SAM_INLINE)
    }
}

fn compress_dst(
    address: &Ipv6Addr,
    mac_addr: &Address,
    mesh_local_prefix: &[u8; 8],
    w: &mut Writer<'_>,
) -> Result<u8> {
    let octets = address.octets();
    if address.is_multicast() {
        let mode = if octets[1] == 0x02 && octets[2..15].iter().all(|b| *b == 0) {
            w.put(&octets[15..])?;
            iphc::DAM_MODE3
        } else if octets[2..13].iter().all(|b| *b == 0) {
            w.put(&[octets[1]])?;
            w.put(&octets[13..])?;
            iphc::DAM_MODE2
        } else {
            w.put(&octets)?;
            iphc::DAM_INLINE
        };
        return Ok(iphc::MULTICAST | mode);
    }

    // Same encodings as the source, shifted into the destination bits.
    if ip6::is_link_local(address) {
        Ok(compress_iid(address, mac_addr, w)? >> 4)
    } else if ip6::is_mesh_local(mesh_local_prefix, address) {
        Ok(iphc::DAC | compress_iid(address, mac_addr, w)? >> 4)
    } else {
        w.put(&octets)?;
        Ok(iphc::DAM_INLINE)
    }
}

/// Encapsulate a UDP datagram: IPHC header, UDP header and payload are
/// written to `buffer`. Returns the number of bytes written.
pub fn compress(
    info: &UdpInfo,
    link: &LinkAddresses,
    mesh_local_prefix: &[u8; 8],
    payload: &[u8],
    buffer: &mut [u8],
) -> Result<usize> {
    let mut w = Writer { buffer, offset: 2 };

    let hlim = match info.hop_limit {
        1 => iphc::HLIM_1,
        64 => iphc::HLIM_64,
        255 => iphc::HLIM_255,
        _ => iphc::HLIM_INLINE,
    };
    w.put(&[NEXT_HEADER_UDP])?;
    if hlim == iphc::HLIM_INLINE {
        w.put(&[info.hop_limit])?;
    }

    let src_bits = compress_src(&info.src, &link.src, mesh_local_prefix, &mut w)?;
    let dst_bits = compress_dst(&info.dst, &link.dst, mesh_local_prefix, &mut w)?;

    let length = (UDP_HEADER_LEN + payload.len()) as u16;
    w.put(&info.src_port.to_be_bytes())?;
    w.put(&info.dst_port.to_be_bytes())?;
    w.put(&length.to_be_bytes())?;
    w.put(&ip6::udp_checksum(info, payload).to_be_bytes())?;
    w.put(payload)?;

    w.buffer[0] = iphc::DISPATCH | iphc::TF_ELIDED | hlim;
    w.buffer[1] = src_bits | dst_bits;
    Ok(w.offset)
}

struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset + len;
        let data = self.buffer.get(self.offset..end).ok_or(Error::Parse)?;
        self.offset = end;
        Ok(data)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let data = self.take(2)?;
        Ok(u16::from_be_bytes([data[0], data[1]]))
    }
}

fn decompress_iid(mode: u8, mac_addr: &Address, r: &mut Reader<'_>) -> Result<[u8; 8]> {
    let mut iid = [0u8; 8];
    match mode {
        iphc::SAM_MODE1 => iid.copy_from_slice(r.take(8)?),
        iphc::SAM_MODE2 => {
            iid = iphc::MAC_BASE;
            iid[6..].copy_from_slice(r.take(2)?);
        }
        _ => iid = compute_iid(mac_addr).ok_or(Error::Parse)?,
    }
    Ok(iid)
}

fn decompress_unicast(
    context: bool,
    mode: u8,
    mac_addr: &Address,
    mesh_local_prefix: &[u8; 8],
    r: &mut Reader<'_>,
) -> Result<Ipv6Addr> {
    match (context, mode) {
        (true, iphc::SAM_INLINE) => Ok(Ipv6Addr::UNSPECIFIED),
        (false, iphc::SAM_INLINE) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(r.take(16)?);
            Ok(Ipv6Addr::from(octets))
        }
        (true, _) => Ok(ip6::from_parts(
            mesh_local_prefix,
            &decompress_iid(mode, mac_addr, r)?,
        )),
        (false, _) => Ok(ip6::from_parts(
            &[0xfe, 0x80, 0, 0, 0, 0, 0, 0],
            &decompress_iid(mode, mac_addr, r)?,
        )),
    }
}

fn decompress_multicast(mode: u8, r: &mut Reader<'_>) -> Result<Ipv6Addr> {
    let mut octets = [0u8; 16];
    octets[0] = 0xff;
    match mode {
        iphc::DAM_INLINE => octets.copy_from_slice(r.take(16)?),
        iphc::DAM_MODE1 => {
            octets[1] = r.u8()?;
            octets[11..].copy_from_slice(r.take(5)?);
        }
        iphc::DAM_MODE2 => {
            octets[1] = r.u8()?;
            octets[13..].copy_from_slice(r.take(3)?);
        }
        _ => {
            octets[1] = 0x02;
            octets[15] = r.u8()?;
        }
    }
    Ok(Ipv6Addr::from(octets))
}

/// Decapsulate a UDP datagram. Returns its endpoints and the offset of the
/// UDP payload in `buffer`, which ends the datagram. The UDP length and
/// checksum are verified.
pub fn decompress(
    buffer: &[u8],
    link: &LinkAddresses,
    mesh_local_prefix: &[u8; 8],
) -> Result<(UdpInfo, usize)> {
    let mut r = Reader { buffer, offset: 0 };
    let header = r.take(2)?;
    let (first, second) = (header[0], header[1]);

    if first & iphc::DISPATCH_MASK != iphc::DISPATCH
        || first & iphc::TF_MASK != iphc::TF_ELIDED
        || first & iphc::NH != 0
        || second & iphc::CID != 0
    {
        return Err(Error::Parse);
    }
    if r.u8()? != NEXT_HEADER_UDP {
        return Err(Error::Parse);
    }

    let hop_limit = match first & iphc::HLIM_MASK {
        iphc::HLIM_1 => 1,
        iphc::HLIM_64 => 64,
        iphc::HLIM_255 => 255,
        _ => r.u8()?,
    };

    let src = decompress_unicast(
        second & iphc::SAC != 0,
        second & iphc::SAM_MASK,
        &link.src,
        mesh_local_prefix,
        &mut r,
    )?;

    let dam = second & iphc::DAM_MASK;
    let dst = if second & iphc::MULTICAST != 0 {
        if second & iphc::DAC != 0 {
            return Err(Error::Parse);
        }
        decompress_multicast(dam, &mut r)?
    } else {
        decompress_unicast(
            second & iphc::DAC != 0,
            dam << 4,
            &link.dst,
            mesh_local_prefix,
            &mut r,
        )?
    };
    if dst.is_unspecified() {
        return Err(Error::Parse);
    }

    let src_port = r.u16()?;
    let dst_port = r.u16()?;
    let length = r.u16()? as usize;
    let checksum = r.u16()?;
    let payload = r.offset;
    if length != UDP_HEADER_LEN + buffer.len() - payload {
        return Err(Error::Parse);
    }

    let info = UdpInfo {
        src,
        dst,
        src_port,
        dst_port,
        hop_limit,
        link_security: false,
    };
    if ip6::udp_checksum(&info, &buffer[payload..]) != checksum {
        return Err(Error::Parse);
    }
    Ok((info, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ExtAddress;

    const PREFIX: [u8; 8] = [0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00];
    const EXT: ExtAddress = ExtAddress::new([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0]);

    fn info(src: &str, dst: &str, hop_limit: u8) -> UdpInfo {
        UdpInfo {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            src_port: 19788,
            dst_port: 19788,
            hop_limit,
            link_security: false,
        }
    }

    #[test]
    fn link_local_multicast() {
        let info = info("fe80::1034:5678:9abc:def0", "ff02::1", 255);
        let link = LinkAddresses {
            src: Address::Extended(EXT),
            dst: Address::BROADCAST,
        };
        let mut buffer = [0u8; 64];
        let len = compress(&info, &link, &PREFIX, b"mle", &mut buffer).unwrap();
        assert_eq!(&buffer[..5], &[0x7b, 0x3b, 0x11, 0x01, 0x4d]);
        assert_eq!(len, 4 + 8 + 3);

        let (decoded, offset) = decompress(&buffer[..len], &link, &PREFIX).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(&buffer[offset..len], b"mle");
    }

    #[test]
    fn mesh_local_locators() {
        let info = info("fdde:ad00:beef::ff:fe00:401", "fdde:ad00:beef::ff:fe00:400", 64);
        let link = LinkAddresses {
            src: Address::Short(0x0401),
            dst: Address::Short(0x0400),
        };
        let mut buffer = [0u8; 64];
        let len = compress(&info, &link, &PREFIX, &[1, 2, 3, 4], &mut buffer).unwrap();
        assert_eq!(&buffer[..3], &[0x7a, 0x77, 0x11]);

        let (decoded, _) = decompress(&buffer[..len], &link, &PREFIX).unwrap();
        assert_eq!(decoded, info);

        // the locators cannot be elided against other link addresses
        let other = LinkAddresses {
            src: Address::Extended(EXT),
            dst: Address::Short(0x0800),
        };
        let len = compress(&info, &other, &PREFIX, &[1, 2, 3, 4], &mut buffer).unwrap();
        assert_eq!(buffer[1], 0x40 | 0x20 | 0x04 | 0x02);
        let (decoded, _) = decompress(&buffer[..len], &other, &PREFIX).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn inline_addresses_and_hop_limit() {
        let info = info("2001:db8::1", "ff03::fc", 10);
        let link = LinkAddresses {
            src: Address::Short(0x0401),
            dst: Address::BROADCAST,
        };
        let mut buffer = [0u8; 64];
        let len = compress(&info, &link, &PREFIX, &[], &mut buffer).unwrap();
        // inline hop limit, 16-byte source, 4-byte multicast destination
        assert_eq!(len, 2 + 1 + 1 + 16 + 4 + 8);
        let (decoded, offset) = decompress(&buffer[..len], &link, &PREFIX).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(offset, len);
    }

    #[test]
    fn corrupted_datagram() {
        let info = info("fe80::1034:5678:9abc:def0", "ff02::2", 255);
        let link = LinkAddresses {
            src: Address::Extended(EXT),
            dst: Address::BROADCAST,
        };
        let mut buffer = [0u8; 64];
        let len = compress(&info, &link, &PREFIX, b"data", &mut buffer).unwrap();

        let mut flipped = buffer;
        flipped[len - 1] ^= 0x80;
        assert_eq!(decompress(&flipped[..len], &link, &PREFIX), Err(Error::Parse));
        assert_eq!(decompress(&buffer[..len - 1], &link, &PREFIX), Err(Error::Parse));
        assert_eq!(decompress(&[0x41, 0x00], &link, &PREFIX), Err(Error::Parse));
    }

    #[test]
    fn mesh_header() {
        let header = MeshHeader {
            hops_left: 14,
            originator: 0x0401,
            final_destination: 0x0800,
        };
        let mut buffer = [0u8; 8];
        assert_eq!(header.emit(&mut buffer), Ok(5));
        assert_eq!(&buffer[..5], &[0xbe, 0x04, 0x01, 0x08, 0x00]);
        assert_eq!(MeshHeader::parse(&buffer), Ok(Some(header)));

        assert_eq!(MeshHeader::parse(&[0x7b, 0x3b]), Ok(None));
        // 64-bit originator
        assert_eq!(MeshHeader::parse(&[0x9e, 0, 0, 0, 0]), Err(Error::Parse));
        assert_eq!(MeshHeader::parse(&[0xbe, 0x04]), Err(Error::Parse));
    }
}
