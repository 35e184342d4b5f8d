//! Thread beacon payload, sent in answer to MAC Beacon Requests.
//!
//! ```text
//! protocol id (1) | version << 4 | joinable (1) | network name (16) | extended PAN ID (8)
//! ```

use crate::{Error, Result};

pub const PROTOCOL_ID: u8 = 3;
pub const PROTOCOL_VERSION: u8 = 2;
pub const NETWORK_NAME_LEN: usize = 16;

const FLAG_JOINABLE: u8 = 0x01;

/// Length of the beacon payload.
pub const BEACON_PAYLOAD_LEN: usize = 2 + NETWORK_NAME_LEN + 8;

/// A network name of at most 16 UTF-8 bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetworkName {
    bytes: [u8; NETWORK_NAME_LEN],
    len: u8,
}

impl NetworkName {
    pub fn new(name: &str) -> Result<Self> {
        Self::from_bytes(name.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > NETWORK_NAME_LEN || core::str::from_utf8(bytes).is_err() {
            return Err(Error::InvalidArgs);
        }
        let mut name = Self {
            bytes: [0; NETWORK_NAME_LEN],
            len: bytes.len() as u8,
        };
        name.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(name)
    }

    /// Parse a zero padded 16-byte field.
    fn from_padded(bytes: &[u8; NETWORK_NAME_LEN]) -> Result<Self> {
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(NETWORK_NAME_LEN);
        Self::from_bytes(&bytes[..len])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

/// Thread beacon contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBeacon {
    pub version: u8,
    pub joinable: bool,
    pub network_name: NetworkName,
    pub extended_pan_id: [u8; 8],
}

impl ThreadBeacon {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < BEACON_PAYLOAD_LEN || buffer[0] != PROTOCOL_ID {
            return Err(Error::Parse);
        }

        let mut name = [0u8; NETWORK_NAME_LEN];
        name.copy_from_slice(&buffer[2..2 + NETWORK_NAME_LEN]);
        let mut extended_pan_id = [0u8; 8];
        extended_pan_id.copy_from_slice(&buffer[2 + NETWORK_NAME_LEN..BEACON_PAYLOAD_LEN]);

        Ok(Self {
            version: buffer[1] >> 4,
            joinable: buffer[1] & FLAG_JOINABLE != 0,
            network_name: NetworkName::from_padded(&name).map_err(|_| Error::Parse)?,
            extended_pan_id,
        })
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.len() < BEACON_PAYLOAD_LEN {
            return Err(Error::NoBufs);
        }
        buffer[0] = PROTOCOL_ID;
        buffer[1] = (self.version << 4) | if self.joinable { FLAG_JOINABLE } else { 0 };
        buffer[2..2 + NETWORK_NAME_LEN].fill(0);
        buffer[2..2 + self.network_name.as_bytes().len()]
            .copy_from_slice(self.network_name.as_bytes());
        buffer[2 + NETWORK_NAME_LEN..BEACON_PAYLOAD_LEN].copy_from_slice(&self.extended_pan_id);
        Ok(BEACON_PAYLOAD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_name_bounds() {
        assert!(NetworkName::new("OpenThreadNetwrk").is_ok());
        assert_eq!(
            NetworkName::new("seventeen-bytes!!"),
            Err(Error::InvalidArgs)
        );
        assert_eq!(NetworkName::from_bytes(&[0xff, 0xfe]), Err(Error::InvalidArgs));
        assert_eq!(NetworkName::new("mesh").unwrap().as_str(), "mesh");
    }

    #[test]
    fn beacon() {
        let beacon = ThreadBeacon {
            version: PROTOCOL_VERSION,
            joinable: true,
            network_name: NetworkName::new("Test").unwrap(),
            extended_pan_id: [0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe],
        };
        let mut buffer = [0u8; BEACON_PAYLOAD_LEN];
        assert_eq!(beacon.emit(&mut buffer), Ok(BEACON_PAYLOAD_LEN));
        assert_eq!(&buffer[..6], &[0x03, 0x21, b'T', b'e', b's', b't']);
        assert_eq!(buffer[17], 0);
        assert_eq!(ThreadBeacon::parse(&buffer), Ok(beacon));

        buffer[0] = 2;
        assert_eq!(ThreadBeacon::parse(&buffer), Err(Error::Parse));
        assert_eq!(ThreadBeacon::parse(&buffer[..10]), Err(Error::Parse));
    }
}
