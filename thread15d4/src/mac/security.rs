//! In-place security processing of 802.15.4-2006 frames.
//!
//! The MAC header (through the command identifier of command frames) is
//! authenticated. With an encrypting security level the payload is
//! encrypted; with a MIC-only level it is authenticated along with the
//! header.

use crate::crypto::{CcmStar, Key, NONCE_LEN};
use crate::frame::{ExtAddress, Frame, SecurityLevel};
use crate::{Error, Result};

/// Build the CCM* nonce of a frame sent by `source`.
pub fn nonce(source: &ExtAddress, frame_counter: u32, level: SecurityLevel) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(source.as_bytes());
    nonce[8..12].copy_from_slice(&frame_counter.to_be_bytes());
    nonce[12] = level as u8;
    nonce
}

/// Security parameters read from a frame's auxiliary security header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecuredFrameInfo {
    pub level: SecurityLevel,
    pub frame_counter: u32,
    pub key_index: Option<u8>,
}

/// Read the security parameters of a secured frame.
pub fn security_info(frame: &[u8]) -> Result<SecuredFrameInfo> {
    let frame = Frame::new(frame)?;
    let header = frame.auxiliary_security_header().ok_or(Error::Security)?;
    Ok(SecuredFrameInfo {
        level: header.security_control().security_level(),
        frame_counter: header.frame_counter(),
        key_index: header.key_index(),
    })
}

fn process(buffer: &mut [u8], key: &Key, source: &ExtAddress, encrypt: bool) -> Result<()> {
    let info = security_info(buffer)?;
    if info.level == SecurityLevel::None {
        return Err(Error::Security);
    }

    let mut frame = Frame::new_unchecked(&mut buffer[..]);
    let (header, payload, mic) = frame.split_secured_mut();
    let nonce = nonce(source, info.frame_counter, info.level);

    if info.level.encrypted() {
        let mut ccm = CcmStar::init(key, header.len(), payload.len(), mic.len(), &nonce)?;
        ccm.header(header)?;
        ccm.payload(payload, encrypt)?;
        finish(ccm, mic, encrypt)
    } else {
        let mut ccm = CcmStar::init(key, header.len() + payload.len(), 0, mic.len(), &nonce)?;
        ccm.header(header)?;
        ccm.header(payload)?;
        finish(ccm, mic, encrypt)
    }
}

fn finish(ccm: CcmStar, mic: &mut [u8], encrypt: bool) -> Result<()> {
    let mut tag = [0u8; 16];
    let tag = &mut tag[..mic.len()];
    ccm.finalize(tag)?;

    if encrypt {
        mic.copy_from_slice(tag);
        Ok(())
    } else if *mic == *tag {
        Ok(())
    } else {
        Err(Error::Security)
    }
}

/// Secure an emitted frame in place: encrypt its payload when required and
/// fill in the MIC. `source` is the sender's extended address.
pub fn secure_frame(buffer: &mut [u8], key: &Key, source: &ExtAddress) -> Result<()> {
    process(buffer, key, source, true)
}

/// Authenticate and decrypt a received frame in place. A MIC mismatch
/// returns [`Error::Security`]; the payload is then undefined and the frame
/// must be dropped.
pub fn unsecure_frame(buffer: &mut [u8], key: &Key, source: &ExtAddress) -> Result<()> {
    process(buffer, key, source, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Key = [
        0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce,
        0xcf,
    ];
    const SOURCE: ExtAddress = ExtAddress::new([0xac, 0xde, 0x48, 0x00, 0x00, 0x00, 0x00, 0x01]);

    #[test]
    fn annex_c_beacon() {
        let mut frame = hex::decode(
            "08d0842143010000000048deac020500000055cf0000515253540000000000000000",
        )
        .unwrap();
        secure_frame(&mut frame, &KEY, &SOURCE).unwrap();
        assert_eq!(hex::encode(&frame[frame.len() - 8..]), "223bc1ec841ab553");
        // MIC-only: payload stays in the clear
        assert_eq!(hex::encode(&frame[18..26]), "55cf000051525354");

        unsecure_frame(&mut frame, &KEY, &SOURCE).unwrap();
    }

    #[test]
    fn annex_c_data() {
        let mut frame = hex::decode(
            "69dc842143020000000048deac010000000048deac040500000061626364",
        )
        .unwrap();
        secure_frame(&mut frame, &KEY, &SOURCE).unwrap();
        assert_eq!(hex::encode(&frame[frame.len() - 4..]), "d43e022b");

        unsecure_frame(&mut frame, &KEY, &SOURCE).unwrap();
        assert_eq!(&frame[frame.len() - 4..], b"abcd");
    }

    #[test]
    fn annex_c_command() {
        let mut frame = hex::decode(
            "2bdc842143020000000048deacffff010000000048deac060500000001ce0000000000000000",
        )
        .unwrap();
        secure_frame(&mut frame, &KEY, &SOURCE).unwrap();
        assert_eq!(
            hex::encode(&frame[frame.len() - 9..]),
            "d84fde529061f9c6f1"
        );

        let info = security_info(&frame).unwrap();
        assert_eq!(info.level, SecurityLevel::EncMic64);
        assert_eq!(info.frame_counter, 5);
        assert_eq!(info.key_index, None);

        unsecure_frame(&mut frame, &KEY, &SOURCE).unwrap();
        assert_eq!(frame[frame.len() - 9], 0xce);
    }

    #[test]
    fn tampered_frame_is_rejected() {
        let mut frame = hex::decode(
            "2bdc842143020000000048deacffff010000000048deac060500000001ce0000000000000000",
        )
        .unwrap();
        secure_frame(&mut frame, &KEY, &SOURCE).unwrap();

        let mut flipped = frame.clone();
        flipped[28] ^= 0x01;
        assert_eq!(
            unsecure_frame(&mut flipped, &KEY, &SOURCE),
            Err(Error::Security)
        );

        let mut wrong_source = frame.clone();
        let other = ExtAddress::new([0xac, 0xde, 0x48, 0, 0, 0, 0, 2]);
        assert_eq!(
            unsecure_frame(&mut wrong_source, &KEY, &other),
            Err(Error::Security)
        );
    }

    #[test]
    fn unsecured_frame() {
        let mut frame = [0x41, 0x98, 0x01, 0xcd, 0xab, 0xff, 0xff, 0x00, 0x00, 0x00];
        assert_eq!(security_info(&frame), Err(Error::Security));
        assert_eq!(secure_frame(&mut frame, &KEY, &SOURCE), Err(Error::Security));
    }
}
