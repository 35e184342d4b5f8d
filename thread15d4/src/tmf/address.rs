//! Payloads of the Router ID management and server data requests.

use crate::frame::ExtAddress;
use crate::network_data::NetworkData;
use crate::utils::tlv::{array, TlvWriter, Tlvs};
use crate::{Error, Result};

use super::tlv_type;

/// Status values of the Status TLV.
pub mod status {
    pub const SUCCESS: u8 = 0;
    pub const NO_ADDRESS_AVAILABLE: u8 = 1;
    pub const TOO_FEW_ROUTERS: u8 = 2;
    pub const HAVE_CHILD_ID_REQUEST: u8 = 3;
    pub const PARENT_PARTITION_CHANGE: u8 = 4;
}

/// Value of the Router Mask TLV: the Router ID sequence and a bit per
/// allocated Router ID, most significant bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterMask {
    pub id_sequence: u8,
    pub mask: [u8; 8],
}

impl RouterMask {
    pub const LEN: usize = 9;

    pub fn parse(value: &[u8]) -> Result<Self> {
        let [id_sequence, rest @ ..] = value else {
            return Err(Error::Parse);
        };
        Ok(Self {
            id_sequence: *id_sequence,
            mask: array(rest)?,
        })
    }

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.id_sequence;
        out[1..].copy_from_slice(&self.mask);
        out
    }
}

/// `/a/as`: ask the Leader for a Router ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSolicit {
    pub ext_address: ExtAddress,
    /// The RLOC16 of a previously held Router ID, if any.
    pub rloc16: Option<u16>,
    pub reason: u8,
}

impl AddressSolicit {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Tlvs::validate(payload)?;
        Ok(Self {
            ext_address: ExtAddress(Tlvs::require(payload, tlv_type::EXT_MAC_ADDRESS)?.array()?),
            rloc16: Tlvs::find(payload, tlv_type::RLOC16)
                .map(|t| t.u16())
                .transpose()?,
            reason: Tlvs::require(payload, tlv_type::STATUS)?.u8()?,
        })
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = TlvWriter::new(buffer);
        w.push(tlv_type::EXT_MAC_ADDRESS, &self.ext_address.0)?;
        w.push_u8(tlv_type::STATUS, self.reason)?;
        if let Some(rloc16) = self.rloc16 {
            w.push_u16(tlv_type::RLOC16, rloc16)?;
        }
        Ok(w.len())
    }
}

/// Response to an [`AddressSolicit`]. The RLOC16 and the router mask are
/// present on success only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSolicitResponse {
    pub status: u8,
    pub rloc16: Option<u16>,
    pub router_mask: Option<RouterMask>,
}

impl AddressSolicitResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Tlvs::validate(payload)?;
        let response = Self {
            status: Tlvs::require(payload, tlv_type::STATUS)?.u8()?,
            rloc16: Tlvs::find(payload, tlv_type::RLOC16)
                .map(|t| t.u16())
                .transpose()?,
            router_mask: Tlvs::find(payload, tlv_type::ROUTER_MASK)
                .map(|t| RouterMask::parse(t.value))
                .transpose()?,
        };
        if response.status == status::SUCCESS
            && (response.rloc16.is_none() || response.router_mask.is_none())
        {
            return Err(Error::Parse);
        }
        Ok(response)
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = TlvWriter::new(buffer);
        w.push_u8(tlv_type::STATUS, self.status)?;
        if let Some(rloc16) = self.rloc16 {
            w.push_u16(tlv_type::RLOC16, rloc16)?;
        }
        if let Some(mask) = &self.router_mask {
            w.push(tlv_type::ROUTER_MASK, &mask.emit())?;
        }
        Ok(w.len())
    }
}

/// `/a/ar`: give a Router ID back to the Leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRelease {
    pub rloc16: u16,
    pub ext_address: ExtAddress,
}

impl AddressRelease {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Tlvs::validate(payload)?;
        Ok(Self {
            rloc16: Tlvs::require(payload, tlv_type::RLOC16)?.u16()?,
            ext_address: ExtAddress(Tlvs::require(payload, tlv_type::EXT_MAC_ADDRESS)?.array()?),
        })
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = TlvWriter::new(buffer);
        w.push_u16(tlv_type::RLOC16, self.rloc16)?;
        w.push(tlv_type::EXT_MAC_ADDRESS, &self.ext_address.0)?;
        Ok(w.len())
    }
}

/// `/a/sd`: the server data of the node with the given RLOC16.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerData {
    pub rloc16: u16,
    pub network_data: NetworkData,
}

impl ServerData {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Tlvs::validate(payload)?;
        Ok(Self {
            rloc16: Tlvs::require(payload, tlv_type::RLOC16)?.u16()?,
            network_data: NetworkData::from_bytes(
                Tlvs::require(payload, tlv_type::NETWORK_DATA)?.value,
            )?,
        })
    }

    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = TlvWriter::new(buffer);
        w.push(tlv_type::NETWORK_DATA, self.network_data.as_bytes())?;
        w.push_u16(tlv_type::RLOC16, self.rloc16)?;
        Ok(w.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Prefix;
    use crate::network_data::{ExternalRouteConfig, RoutePreference};

    #[test]
    fn solicit() {
        let solicit = AddressSolicit {
            ext_address: ExtAddress([1, 2, 3, 4, 5, 6, 7, 8]),
            rloc16: Some(0x0c00),
            reason: status::TOO_FEW_ROUTERS,
        };
        let mut buffer = [0u8; 32];
        let len = solicit.emit(&mut buffer).unwrap();
        assert_eq!(
            &buffer[..len],
            &[1, 8, 1, 2, 3, 4, 5, 6, 7, 8, 4, 1, 2, 2, 2, 0x0c, 0x00]
        );
        assert_eq!(AddressSolicit::parse(&buffer[..len]), Ok(solicit));

        // status is mandatory
        assert_eq!(AddressSolicit::parse(&buffer[..10]), Err(Error::Parse));
    }

    #[test]
    fn solicit_response() {
        let mut buffer = [0u8; 32];
        let response = AddressSolicitResponse {
            status: status::SUCCESS,
            rloc16: Some(0x1400),
            router_mask: Some(RouterMask {
                id_sequence: 7,
                mask: [0b1000_0100, 0, 0, 0, 0, 0, 0, 0],
            }),
        };
        let len = response.emit(&mut buffer).unwrap();
        assert_eq!(len, 3 + 4 + 11);
        assert_eq!(AddressSolicitResponse::parse(&buffer[..len]), Ok(response));

        let failure = AddressSolicitResponse {
            status: status::NO_ADDRESS_AVAILABLE,
            rloc16: None,
            router_mask: None,
        };
        let len = failure.emit(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[4, 1, 1]);
        assert_eq!(AddressSolicitResponse::parse(&buffer[..len]), Ok(failure));

        // success without an address
        assert_eq!(AddressSolicitResponse::parse(&[4, 1, 0]), Err(Error::Parse));
    }

    #[test]
    fn server_data() {
        let mut network_data = NetworkData::new();
        network_data
            .add_has_route(&ExternalRouteConfig {
                prefix: Prefix::new(&[0x20, 0x01, 0x0d, 0xb8], 32).unwrap(),
                preference: RoutePreference::High,
                stable: true,
                rloc16: 0x0401,
            })
            .unwrap();
        let server = ServerData {
            rloc16: 0x0401,
            network_data,
        };

        let mut buffer = [0u8; 64];
        let len = server.emit(&mut buffer).unwrap();
        assert_eq!(ServerData::parse(&buffer[..len]), Ok(server));

        let release = AddressRelease {
            rloc16: 0x0800,
            ext_address: ExtAddress([8; 8]),
        };
        let len = release.emit(&mut buffer).unwrap();
        assert_eq!(AddressRelease::parse(&buffer[..len]), Ok(release));
    }
}
