//! Network Data TLVs.
//!
//! Every TLV starts with a type byte holding the type in bits 7..1 and the
//! stable flag in bit 0, followed by a one byte length.

use bitflags::bitflags;

use crate::net::Prefix;
use crate::{Error, Result};

pub(crate) mod tlv_type {
    pub const HAS_ROUTE: u8 = 0;
    pub const PREFIX: u8 = 1;
    pub const BORDER_ROUTER: u8 = 2;
    pub const CONTEXT: u8 = 3;
}

pub(crate) const BORDER_ROUTER_ENTRY_LEN: usize = 4;
pub(crate) const HAS_ROUTE_ENTRY_LEN: usize = 3;
pub(crate) const CONTEXT_LEN: usize = 2;

/// A TLV of Network Data, top-level or nested in a Prefix TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDataTlv<'a> {
    pub typ: u8,
    pub stable: bool,
    pub value: &'a [u8],
}

impl NetworkDataTlv<'_> {
    pub(crate) fn type_byte(typ: u8, stable: bool) -> u8 {
        typ << 1 | stable as u8
    }
}

/// Iterator over consecutive TLVs. Stops at the first truncated TLV.
pub struct NetworkDataTlvs<'a> {
    buffer: &'a [u8],
}

impl<'a> NetworkDataTlvs<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }
}

impl<'a> Iterator for NetworkDataTlvs<'a> {
    type Item = NetworkDataTlv<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let buffer = self.buffer;
        let [typ, len, rest @ ..] = buffer else {
            return None;
        };
        let value = rest.get(..*len as usize)?;
        let tlv = NetworkDataTlv {
            typ: typ >> 1,
            stable: typ & 1 != 0,
            value,
        };
        self.buffer = &rest[*len as usize..];
        Some(tlv)
    }
}

fn validate_tlvs(buffer: &[u8], nested: bool) -> Result<()> {
    let mut rest = buffer;
    while !rest.is_empty() {
        let [typ, len, tail @ ..] = rest else {
            return Err(Error::Parse);
        };
        let value = tail.get(..*len as usize).ok_or(Error::Parse)?;
        match (typ >> 1, nested) {
            (tlv_type::PREFIX, false) => {
                PrefixTlv::parse(value)?;
            }
            (tlv_type::BORDER_ROUTER, true) if value.len() % BORDER_ROUTER_ENTRY_LEN != 0 => {
                return Err(Error::Parse)
            }
            (tlv_type::HAS_ROUTE, true) if value.len() % HAS_ROUTE_ENTRY_LEN != 0 => {
                return Err(Error::Parse)
            }
            (tlv_type::CONTEXT, true) if value.len() < CONTEXT_LEN => return Err(Error::Parse),
            // unknown TLVs are carried along
            _ => {}
        }
        rest = &tail[*len as usize..];
    }
    Ok(())
}

/// Check that `buffer` is well-formed Network Data.
pub fn validate(buffer: &[u8]) -> Result<()> {
    validate_tlvs(buffer, false)
}

/// Route preference, two bits on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i8)]
pub enum RoutePreference {
    Low = -1,
    #[default]
    Medium = 0,
    High = 1,
}

impl RoutePreference {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Self::High,
            0b11 => Self::Low,
            _ => Self::Medium,
        }
    }

    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::High => 0b01,
            Self::Medium => 0b00,
            Self::Low => 0b11,
        }
    }
}

bitflags! {
    /// Flags of a Border Router entry. The preference occupies bits 15..14.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct BorderRouterFlags: u16 {
        const PREFERRED = 1 << 13;
        const SLAAC = 1 << 12;
        const DHCP = 1 << 11;
        const CONFIGURE = 1 << 10;
        const DEFAULT_ROUTE = 1 << 9;
        const ON_MESH = 1 << 8;
        const ND_DNS = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderRouterEntry {
    pub rloc16: u16,
    pub preference: RoutePreference,
    pub flags: BorderRouterFlags,
}

impl BorderRouterEntry {
    pub fn parse(b: &[u8]) -> Result<Self> {
        let &[r0, r1, f0, f1, ..] = b else {
            return Err(Error::Parse);
        };
        let flags = u16::from_be_bytes([f0, f1]);
        Ok(Self {
            rloc16: u16::from_be_bytes([r0, r1]),
            preference: RoutePreference::from_bits((flags >> 14) as u8),
            flags: BorderRouterFlags::from_bits_truncate(flags),
        })
    }

    pub fn emit(&self) -> [u8; BORDER_ROUTER_ENTRY_LEN] {
        let flags = (self.preference.bits() as u16) << 14 | self.flags.bits();
        let [r0, r1] = self.rloc16.to_be_bytes();
        let [f0, f1] = flags.to_be_bytes();
        [r0, r1, f0, f1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasRouteEntry {
    pub rloc16: u16,
    pub preference: RoutePreference,
}

impl HasRouteEntry {
    pub fn parse(b: &[u8]) -> Result<Self> {
        let &[r0, r1, flags, ..] = b else {
            return Err(Error::Parse);
        };
        Ok(Self {
            rloc16: u16::from_be_bytes([r0, r1]),
            preference: RoutePreference::from_bits(flags >> 6),
        })
    }

    pub fn emit(&self) -> [u8; HAS_ROUTE_ENTRY_LEN] {
        let [r0, r1] = self.rloc16.to_be_bytes();
        [r0, r1, self.preference.bits() << 6]
    }
}

/// 6LoWPAN context assigned to a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEntry {
    pub context_id: u8,
    pub compress: bool,
    pub context_length: u8,
}

impl ContextEntry {
    const COMPRESS: u8 = 0x10;
    const ID_MASK: u8 = 0x0f;

    pub fn parse(b: &[u8]) -> Result<Self> {
        let &[flags, context_length, ..] = b else {
            return Err(Error::Parse);
        };
        Ok(Self {
            context_id: flags & Self::ID_MASK,
            compress: flags & Self::COMPRESS != 0,
            context_length,
        })
    }

    pub fn emit(&self) -> [u8; CONTEXT_LEN] {
        let compress = if self.compress { Self::COMPRESS } else { 0 };
        [compress | self.context_id & Self::ID_MASK, self.context_length]
    }
}

/// Value of a Prefix TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixTlv<'a> {
    pub domain_id: u8,
    pub prefix: Prefix,
    pub sub_tlvs: &'a [u8],
}

impl<'a> PrefixTlv<'a> {
    pub fn parse(value: &'a [u8]) -> Result<Self> {
        let [domain_id, len, rest @ ..] = value else {
            return Err(Error::Parse);
        };
        let size = (*len as usize).div_ceil(8);
        if *len > 128 || rest.len() < size {
            return Err(Error::Parse);
        }
        let prefix = Prefix::new(&rest[..size], *len).map_err(|_| Error::Parse)?;
        let sub_tlvs = &rest[size..];
        validate_tlvs(sub_tlvs, true)?;
        Ok(Self {
            domain_id: *domain_id,
            prefix,
            sub_tlvs,
        })
    }

    pub fn sub_tlvs(&self) -> NetworkDataTlvs<'a> {
        NetworkDataTlvs::new(self.sub_tlvs)
    }

    pub fn border_routers(&self) -> impl Iterator<Item = (BorderRouterEntry, bool)> + 'a {
        self.sub_tlvs()
            .filter(|t| t.typ == tlv_type::BORDER_ROUTER)
            .flat_map(|t| {
                t.value
                    .chunks_exact(BORDER_ROUTER_ENTRY_LEN)
                    .filter_map(move |e| BorderRouterEntry::parse(e).ok().map(|e| (e, t.stable)))
            })
    }

    pub fn has_routes(&self) -> impl Iterator<Item = (HasRouteEntry, bool)> + 'a {
        self.sub_tlvs()
            .filter(|t| t.typ == tlv_type::HAS_ROUTE)
            .flat_map(|t| {
                t.value
                    .chunks_exact(HAS_ROUTE_ENTRY_LEN)
                    .filter_map(move |e| HasRouteEntry::parse(e).ok().map(|e| (e, t.stable)))
            })
    }

    pub fn context(&self) -> Option<ContextEntry> {
        self.sub_tlvs()
            .find(|t| t.typ == tlv_type::CONTEXT)
            .and_then(|t| ContextEntry::parse(t.value).ok())
    }
}
