//! MLE message protection.
//!
//! A secured MLE message is the security suite octet, an auxiliary security
//! header (level 5, 4-byte key source holding the key sequence), the
//! encrypted command and TLVs, and a 4-byte MIC. The source and destination
//! IPv6 addresses and the auxiliary header are authenticated.

use core::net::Ipv6Addr;

use crate::crypto::{CcmStar, Key};
use crate::frame::{AuxiliarySecurityHeader, ExtAddress, KeyIdMode, KeyIdentifier, SecurityLevel};
use crate::key_manager::key_index;
use crate::mac::security::nonce;
use crate::{Error, Result};

/// Security suite of messages protected with 802.15.4 security.
pub const SUITE_802154: u8 = 0;
/// Security suite of unsecured messages (Discovery only, always dropped).
pub const SUITE_NONE: u8 = 255;

const LEVEL: SecurityLevel = SecurityLevel::EncMic32;
const AUX_HEADER_LEN: usize = 10;

/// Bytes before the command: suite and auxiliary header.
pub const HEADER_LEN: usize = 1 + AUX_HEADER_LEN;
pub const MIC_LEN: usize = 4;

/// Security parameters of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityHeader {
    pub key_sequence: u32,
    pub key_index: u8,
    pub frame_counter: u32,
}

/// Write the suite octet and auxiliary header at the start of `buffer`.
pub fn emit_header(buffer: &mut [u8], key_sequence: u32, frame_counter: u32) -> Result<usize> {
    if buffer.len() < HEADER_LEN {
        return Err(Error::NoBufs);
    }
    buffer[0] = SUITE_802154;
    let mut header = AuxiliarySecurityHeader::new_unchecked(&mut buffer[1..HEADER_LEN]);
    header.set_security_control(LEVEL, KeyIdMode::Source4Index);
    header.set_frame_counter(frame_counter);
    header.set_key_identifier(&KeyIdentifier::Source4 {
        source: key_sequence.to_be_bytes(),
        index: key_index(key_sequence),
    });
    Ok(HEADER_LEN)
}

pub fn parse_header(buffer: &[u8]) -> Result<SecurityHeader> {
    match buffer.first() {
        Some(&SUITE_802154) => {}
        Some(_) => return Err(Error::Security),
        None => return Err(Error::Parse),
    }
    let header = AuxiliarySecurityHeader::new(&buffer[1..])?;
    let control = header.security_control();
    if control.security_level() != LEVEL {
        return Err(Error::Security);
    }
    let KeyIdentifier::Source4 { source, index } = header.key_identifier() else {
        return Err(Error::Security);
    };
    if buffer.len() < HEADER_LEN + 1 + MIC_LEN {
        return Err(Error::Parse);
    }
    Ok(SecurityHeader {
        key_sequence: u32::from_be_bytes(source),
        key_index: index,
        frame_counter: header.frame_counter(),
    })
}

fn init_ccm(
    buffer: &[u8],
    len: usize,
    key: &Key,
    sender: &ExtAddress,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    frame_counter: u32,
) -> Result<CcmStar> {
    let nonce = nonce(sender, frame_counter, LEVEL);
    let mut ccm = CcmStar::init(key, 32 + AUX_HEADER_LEN, len - HEADER_LEN, MIC_LEN, &nonce)?;
    ccm.header(&src.octets())?;
    ccm.header(&dst.octets())?;
    ccm.header(&buffer[1..HEADER_LEN])?;
    Ok(ccm)
}

/// Encrypt the command and TLVs in `buffer[HEADER_LEN..len]` and append
/// the MIC. Returns the total length.
pub fn secure(
    buffer: &mut [u8],
    len: usize,
    key: &Key,
    sender: &ExtAddress,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
) -> Result<usize> {
    if len <= HEADER_LEN || buffer.len() < len + MIC_LEN {
        return Err(Error::NoBufs);
    }
    let frame_counter = AuxiliarySecurityHeader::new(&buffer[1..HEADER_LEN])?.frame_counter();

    let mut ccm = init_ccm(buffer, len, key, sender, src, dst, frame_counter)?;
    ccm.payload(&mut buffer[HEADER_LEN..len], true)?;
    ccm.finalize(&mut buffer[len..len + MIC_LEN])?;
    Ok(len + MIC_LEN)
}

/// Authenticate and decrypt a received message in place. Returns the end
/// of the plaintext; the command is at [`HEADER_LEN`].
pub fn unsecure(
    buffer: &mut [u8],
    key: &Key,
    sender: &ExtAddress,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
) -> Result<usize> {
    let header = parse_header(buffer)?;
    let len = buffer.len() - MIC_LEN;

    let mut ccm = init_ccm(buffer, len, key, sender, src, dst, header.frame_counter)?;
    ccm.payload(&mut buffer[HEADER_LEN..len], false)?;
    let mut tag = [0u8; MIC_LEN];
    ccm.finalize(&mut tag)?;

    if tag[..] == buffer[len..] {
        Ok(len)
    } else {
        Err(Error::Security)
    }
}
