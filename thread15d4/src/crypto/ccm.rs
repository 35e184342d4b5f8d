//! CCM* authenticated encryption (IEEE 802.15.4-2006 Annex B) with a
//! 13-byte nonce and a 2-byte length field.
//!
//! The computation is streamed: [`CcmStar::header`] feeds the associated
//! data, [`CcmStar::payload`] encrypts or decrypts in place, and
//! [`CcmStar::finalize`] produces the (encrypted) tag.

use super::{AesEcb, Key};
use crate::{Error, Result};

/// Length of the CCM* nonce.
pub const NONCE_LEN: usize = 13;

/// Length of the length field (`L`).
const LEN_FIELD: usize = 2;

const BLOCK: usize = 16;

/// A CCM* computation in progress.
pub struct CcmStar {
    aes: AesEcb,
    nonce: [u8; NONCE_LEN],
    tag_len: usize,
    cbc: [u8; BLOCK],
    cbc_pos: usize,
    header_remaining: usize,
    payload_remaining: usize,
    counter: u16,
    keystream: [u8; BLOCK],
    keystream_pos: usize,
}

impl CcmStar {
    /// Start a computation.
    ///
    /// `tag_len` must be 0, 4, 8 or 16. The header and payload lengths must
    /// be announced up front; they are authenticated.
    pub fn init(
        key: &Key,
        header_len: usize,
        payload_len: usize,
        tag_len: usize,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Self> {
        if !matches!(tag_len, 0 | 4 | 8 | 16) || header_len >= 0xff00 || payload_len > 0xffff {
            return Err(Error::InvalidArgs);
        }

        let aes = AesEcb::new(key);

        let mut b0 = [0u8; BLOCK];
        b0[0] = (LEN_FIELD - 1) as u8;
        if header_len > 0 {
            b0[0] |= 0x40;
        }
        if tag_len > 0 {
            b0[0] |= (((tag_len - 2) / 2) as u8) << 3;
        }
        b0[1..1 + NONCE_LEN].copy_from_slice(nonce);
        b0[14..].copy_from_slice(&(payload_len as u16).to_be_bytes());
        aes.encrypt(&mut b0);

        let mut ccm = Self {
            aes,
            nonce: *nonce,
            tag_len,
            cbc: b0,
            cbc_pos: 0,
            header_remaining: header_len,
            payload_remaining: payload_len,
            counter: 0,
            keystream: [0; BLOCK],
            keystream_pos: BLOCK,
        };

        if header_len > 0 {
            ccm.mac_update(&(header_len as u16).to_be_bytes());
        }

        Ok(ccm)
    }

    fn mac_update(&mut self, data: &[u8]) {
        for byte in data {
            self.cbc[self.cbc_pos] ^= byte;
            self.cbc_pos += 1;
            if self.cbc_pos == BLOCK {
                self.aes.encrypt(&mut self.cbc);
                self.cbc_pos = 0;
            }
        }
    }

    fn mac_pad(&mut self) {
        if self.cbc_pos > 0 {
            self.aes.encrypt(&mut self.cbc);
            self.cbc_pos = 0;
        }
    }

    fn counter_block(&self, counter: u16) -> [u8; BLOCK] {
        let mut block = [0u8; BLOCK];
        block[0] = (LEN_FIELD - 1) as u8;
        block[1..1 + NONCE_LEN].copy_from_slice(&self.nonce);
        block[14..].copy_from_slice(&counter.to_be_bytes());
        self.aes.encrypt(&mut block);
        block
    }

    fn next_keystream_byte(&mut self) -> u8 {
        if self.keystream_pos == BLOCK {
            self.counter = self.counter.wrapping_add(1);
            self.keystream = self.counter_block(self.counter);
            self.keystream_pos = 0;
        }
        let byte = self.keystream[self.keystream_pos];
        self.keystream_pos += 1;
        byte
    }

    /// Feed associated data. May be called repeatedly until the announced
    /// header length is consumed.
    pub fn header(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.header_remaining {
            return Err(Error::InvalidArgs);
        }
        self.mac_update(data);
        self.header_remaining -= data.len();
        if self.header_remaining == 0 {
            self.mac_pad();
        }
        Ok(())
    }

    /// Encrypt (`encrypt == true`) or decrypt payload bytes in place. May be
    /// called repeatedly once the header is complete.
    pub fn payload(&mut self, data: &mut [u8], encrypt: bool) -> Result<()> {
        if self.header_remaining != 0 || data.len() > self.payload_remaining {
            return Err(Error::InvalidArgs);
        }

        for byte in data.iter_mut() {
            let key = self.next_keystream_byte();
            if encrypt {
                self.mac_update(&[*byte]);
                *byte ^= key;
            } else {
                *byte ^= key;
                self.mac_update(&[*byte]);
            }
        }
        self.payload_remaining -= data.len();
        Ok(())
    }

    /// Complete the computation and write the encrypted tag into
    /// `tag[..tag_len]`.
    pub fn finalize(mut self, tag: &mut [u8]) -> Result<()> {
        if self.header_remaining != 0 || self.payload_remaining != 0 || tag.len() < self.tag_len {
            return Err(Error::InvalidArgs);
        }
        self.mac_pad();

        let s0 = self.counter_block(0);
        for (i, t) in tag[..self.tag_len].iter_mut().enumerate() {
            *t = self.cbc[i] ^ s0[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Key = [
        0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce,
        0xcf,
    ];

    fn nonce(level: u8) -> [u8; NONCE_LEN] {
        [
            0xac, 0xde, 0x48, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, level,
        ]
    }

    #[test]
    fn annex_c_beacon_mic_only() {
        let a = hex::decode("08d0842143010000000048deac020500000055cf000051525354")
            .unwrap();
        let mut ccm = CcmStar::init(&KEY, a.len(), 0, 8, &nonce(2)).unwrap();
        ccm.header(&a).unwrap();
        let mut tag = [0u8; 8];
        ccm.finalize(&mut tag).unwrap();
        assert_eq!(hex::encode(tag), "223bc1ec841ab553");
    }

    #[test]
    fn annex_c_data_encryption_only() {
        let a = hex::decode("69dc842143020000000048deac010000000048deac0405000000")
            .unwrap();
        let mut m = *b"abcd";
        let mut ccm = CcmStar::init(&KEY, a.len(), m.len(), 0, &nonce(4)).unwrap();
        ccm.header(&a).unwrap();
        ccm.payload(&mut m, true).unwrap();
        ccm.finalize(&mut []).unwrap();
        assert_eq!(m, [0xd4, 0x3e, 0x02, 0x2b]);
    }

    #[test]
    fn annex_c_command_round_trip() {
        let a = hex::decode("2bdc842143020000000048deacffff010000000048deac060500000001")
        .unwrap();
        let mut m = [0xce];

        // Header fed in two chunks, as a frame is processed field by field.
        let mut ccm = CcmStar::init(&KEY, a.len(), 1, 8, &nonce(6)).unwrap();
        ccm.header(&a[..10]).unwrap();
        ccm.header(&a[10..]).unwrap();
        ccm.payload(&mut m, true).unwrap();
        let mut tag = [0u8; 8];
        ccm.finalize(&mut tag).unwrap();
        assert_eq!(m, [0xd8]);
        assert_eq!(hex::encode(tag), "4fde529061f9c6f1");

        let mut ccm = CcmStar::init(&KEY, a.len(), 1, 8, &nonce(6)).unwrap();
        ccm.header(&a).unwrap();
        ccm.payload(&mut m, false).unwrap();
        let mut check = [0u8; 8];
        ccm.finalize(&mut check).unwrap();
        assert_eq!(m, [0xce]);
        assert_eq!(check, tag);
    }

    #[test]
    fn long_payload_round_trip() {
        let header = [0x11u8; 21];
        let plain: std::vec::Vec<u8> = (0..100).collect();
        let mut data = plain.clone();
        let n = nonce(5);

        let mut ccm = CcmStar::init(&KEY, header.len(), data.len(), 4, &n).unwrap();
        ccm.header(&header).unwrap();
        ccm.payload(&mut data[..37], true).unwrap();
        ccm.payload(&mut data[37..], true).unwrap();
        let mut tag = [0u8; 4];
        ccm.finalize(&mut tag).unwrap();
        assert_ne!(data, plain);

        let mut ccm = CcmStar::init(&KEY, header.len(), data.len(), 4, &n).unwrap();
        ccm.header(&header).unwrap();
        ccm.payload(&mut data, false).unwrap();
        let mut check = [0u8; 4];
        ccm.finalize(&mut check).unwrap();
        assert_eq!(data, plain);
        assert_eq!(check, tag);
    }

    #[test]
    fn misuse() {
        assert!(CcmStar::init(&KEY, 0, 0, 6, &nonce(5)).is_err());

        let mut ccm = CcmStar::init(&KEY, 4, 2, 4, &nonce(5)).unwrap();
        assert_eq!(ccm.payload(&mut [0, 0], true), Err(Error::InvalidArgs));
        assert_eq!(ccm.header(&[0; 5]), Err(Error::InvalidArgs));
        ccm.header(&[0; 4]).unwrap();
        assert_eq!(ccm.payload(&mut [0, 0, 0], true), Err(Error::InvalidArgs));
        assert_eq!(ccm.finalize(&mut [0; 4]), Err(Error::InvalidArgs));
    }
}
