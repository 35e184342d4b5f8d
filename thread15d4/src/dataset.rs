//! Operational dataset encoded as MeshCoP TLVs.

use crate::crypto::{Key, KEY_LEN};
use crate::mac::NetworkName;
use crate::utils::tlv::{TlvWriter, Tlvs};
use crate::{Error, Result};

mod tlv_type {
    pub const CHANNEL: u8 = 0;
    pub const PAN_ID: u8 = 1;
    pub const EXTENDED_PAN_ID: u8 = 2;
    pub const NETWORK_NAME: u8 = 3;
    pub const MASTER_KEY: u8 = 5;
    pub const MESH_LOCAL_PREFIX: u8 = 7;
}

/// The components of an operational dataset. Absent components are `None`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    pub extended_pan_id: Option<[u8; 8]>,
    pub network_name: Option<NetworkName>,
    pub master_key: Option<Key>,
    pub mesh_local_prefix: Option<[u8; 8]>,
}

impl Dataset {
    /// Largest encoded dataset.
    pub const MAX_LEN: usize = 5 + 4 + 10 + 18 + 18 + 10;

    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Tlvs::validate(buffer)?;
        let mut dataset = Self::default();

        for tlv in Tlvs::new(buffer) {
            match tlv.typ {
                tlv_type::CHANNEL => {
                    // channel page, then the channel number
                    let value: [u8; 3] = tlv.array()?;
                    dataset.channel = Some(value[2]);
                }
                tlv_type::PAN_ID => dataset.pan_id = Some(tlv.u16()?),
                tlv_type::EXTENDED_PAN_ID => dataset.extended_pan_id = Some(tlv.array()?),
                tlv_type::NETWORK_NAME => {
                    dataset.network_name =
                        Some(NetworkName::from_bytes(tlv.value).map_err(|_| Error::Parse)?)
                }
                tlv_type::MASTER_KEY => dataset.master_key = Some(tlv.array::<KEY_LEN>()?),
                tlv_type::MESH_LOCAL_PREFIX => dataset.mesh_local_prefix = Some(tlv.array()?),
                _ => {}
            }
        }

        Ok(dataset)
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = TlvWriter::new(buffer);
        if let Some(channel) = self.channel {
            w.push(tlv_type::CHANNEL, &[0, 0, channel])?;
        }
        if let Some(pan_id) = self.pan_id {
            w.push_u16(tlv_type::PAN_ID, pan_id)?;
        }
        if let Some(xpanid) = &self.extended_pan_id {
            w.push(tlv_type::EXTENDED_PAN_ID, xpanid)?;
        }
        if let Some(name) = &self.network_name {
            w.push(tlv_type::NETWORK_NAME, name.as_bytes())?;
        }
        if let Some(key) = &self.master_key {
            w.push(tlv_type::MASTER_KEY, key)?;
        }
        if let Some(prefix) = &self.mesh_local_prefix {
            w.push(tlv_type::MESH_LOCAL_PREFIX, prefix)?;
        }
        Ok(w.len())
    }

    /// Check that every component needed to form or join a network is set.
    pub fn is_complete(&self) -> bool {
        self.channel.is_some()
            && self.pan_id.is_some()
            && self.extended_pan_id.is_some()
            && self.network_name.is_some()
            && self.master_key.is_some()
            && self.mesh_local_prefix.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode() {
        let dataset = Dataset {
            channel: Some(15),
            pan_id: Some(0xface),
            extended_pan_id: Some([0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe]),
            network_name: Some(NetworkName::new("OpenThread").unwrap()),
            master_key: Some([0x11; 16]),
            mesh_local_prefix: Some([0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00]),
        };
        assert!(dataset.is_complete());

        let mut buffer = [0u8; Dataset::MAX_LEN];
        let len = dataset.emit(&mut buffer).unwrap();
        assert_eq!(&buffer[..9], &[0x00, 0x03, 0x00, 0x00, 0x0f, 0x01, 0x02, 0xfa, 0xce]);
        assert_eq!(Dataset::parse(&buffer[..len]), Ok(dataset));
    }

    #[test]
    fn partial_and_malformed() {
        let dataset = Dataset::parse(&[0x01, 0x02, 0x12, 0x34, 0x42, 0x01, 0x00]).unwrap();
        assert_eq!(dataset.pan_id, Some(0x1234));
        assert!(!dataset.is_complete());

        assert_eq!(Dataset::parse(&[0x01, 0x03, 0x12]), Err(Error::Parse));
        assert_eq!(Dataset::parse(&[0x02, 0x02, 0x12, 0x34]), Err(Error::Parse));
    }
}
