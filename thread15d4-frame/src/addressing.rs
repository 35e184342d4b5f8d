//! Addressing fields readers and writers.

use super::FrameControl;
use super::FrameVersion;
use super::{Error, Result};

/// An IEEE 802.15.4 extended address (EUI-64), stored in canonical
/// (big-endian) order. On air it is transmitted in reverse order.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtAddress(pub [u8; 8]);

impl ExtAddress {
    /// Create an extended address from its canonical byte order.
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create an extended address from its on-air (little-endian) byte order.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        raw.reverse();
        Self(raw)
    }

    /// Write the address in on-air (little-endian) order.
    pub fn write_le_bytes(&self, buffer: &mut [u8]) {
        let mut raw = self.0;
        raw.reverse();
        buffer[..8].copy_from_slice(&raw);
    }

    /// Return the canonical bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl core::fmt::Display for ExtAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let v = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]
        )
    }
}

/// An IEEE 802.15.4 address.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// No address.
    #[default]
    Absent,
    /// A 16-bit short address.
    Short(u16),
    /// A 64-bit extended address.
    Extended(ExtAddress),
}

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address::Short(0xffff);

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !self.is_broadcast() && !self.is_empty()
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Return the short address, if this is one.
    pub fn short(&self) -> Option<u16> {
        match self {
            Address::Short(a) => Some(*a),
            _ => None,
        }
    }

    /// Return the extended address, if this is one.
    pub fn extended(&self) -> Option<ExtAddress> {
        match self {
            Address::Extended(a) => Some(*a),
            _ => None,
        }
    }

    /// Read an address in on-air order. The length of `a` selects the type.
    pub fn from_le_bytes(a: &[u8]) -> Result<Self> {
        match a.len() {
            0 => Ok(Address::Absent),
            2 => Ok(Address::Short(u16::from_le_bytes([a[0], a[1]]))),
            8 => Ok(Address::Extended(ExtAddress::from_le_bytes(a))),
            _ => Err(Error),
        }
    }

    /// Write the address in on-air order.
    pub fn write_le_bytes(&self, buffer: &mut [u8]) {
        match self {
            Address::Absent => {}
            Address::Short(value) => buffer[..2].copy_from_slice(&value.to_le_bytes()),
            Address::Extended(value) => value.write_le_bytes(buffer),
        }
    }

    /// Return the length of the address in octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            Address::Absent => 0,
            Address::Short(_) => 2,
            Address::Extended(_) => 8,
        }
    }

    /// Returns `true` for [`Address::Absent`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Address::Absent)
    }
}

impl From<Address> for AddressingMode {
    fn from(value: Address) -> Self {
        match value {
            Address::Absent => AddressingMode::Absent,
            Address::Short(_) => AddressingMode::Short,
            Address::Extended(_) => AddressingMode::Extended,
        }
    }
}

impl From<ExtAddress> for Address {
    fn from(value: ExtAddress) -> Self {
        Address::Extended(value)
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Address::Absent => write!(f, "absent"),
            Address::Short(value) => write!(f, "{:04x}", value),
            Address::Extended(value) => write!(f, "{}", value),
        }
    }
}

/// IEEE 802.15.4 addressing mode.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum AddressingMode {
    /// Address not present.
    Absent = 0b00,
    /// 16-bit short address.
    Short = 0b10,
    /// 64-bit extended address.
    Extended = 0b11,
    /// Reserved mode.
    Unknown,
}

impl AddressingMode {
    /// Return the size of the address in octets.
    pub fn size(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Short => 2,
            Self::Extended => 8,
            Self::Unknown => 0,
        }
    }
}

impl From<u8> for AddressingMode {
    fn from(value: u8) -> Self {
        match value {
            0b00 => Self::Absent,
            0b10 => Self::Short,
            0b11 => Self::Extended,
            _ => Self::Unknown,
        }
    }
}

/// Presence of the four addressing fields under the 2003/2006 rules:
/// `(dst_pan_id, dst_addr, src_pan_id, src_addr)`.
fn address_present_flags(
    frame_version: FrameVersion,
    dst_addr_mode: AddressingMode,
    src_addr_mode: AddressingMode,
    pan_id_compression: bool,
) -> Option<(bool, AddressingMode, bool, AddressingMode)> {
    use AddressingMode::*;

    if !matches!(
        frame_version,
        FrameVersion::Ieee802154_2003 | FrameVersion::Ieee802154_2006
    ) {
        return None;
    }

    match (dst_addr_mode, src_addr_mode) {
        (Unknown, _) | (_, Unknown) => None,
        (Absent, Absent) => Some((false, Absent, false, Absent)),
        (Absent, src) => Some((false, Absent, true, src)),
        (dst, Absent) => Some((true, dst, false, Absent)),
        (dst, src) => Some((true, dst, !pan_id_compression, src)),
    }
}

/// A reader/writer for the IEEE 802.15.4 Addressing Fields.
pub struct AddressingFields<T: AsRef<[u8]>, FC: AsRef<[u8]>> {
    buffer: T,
    fc: FrameControl<FC>,
}

impl<T: AsRef<[u8]>, FC: AsRef<[u8]>> AddressingFields<T, FC> {
    /// Create a new [`AddressingFields`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// This function will check the length of the buffer to ensure it is large
    /// enough to contain the addressing fields. If the buffer is too small,
    /// or the addressing modes are not valid, an error will be returned.
    pub fn new(buffer: T, fc: FrameControl<FC>) -> Result<Self> {
        let af = Self::new_unchecked(buffer, fc);

        if !af.check_len() {
            return Err(Error);
        }

        Ok(af)
    }

    fn check_len(&self) -> bool {
        match self.flags() {
            Some(_) => self.buffer.as_ref().len() >= self.len(),
            None => false,
        }
    }

    /// Create a new [`AddressingFields`] reader/writer from a given buffer
    /// without checking the length.
    pub fn new_unchecked(buffer: T, fc: FrameControl<FC>) -> Self {
        Self { buffer, fc }
    }

    fn flags(&self) -> Option<(bool, AddressingMode, bool, AddressingMode)> {
        address_present_flags(
            self.fc.frame_version(),
            self.fc.dst_addressing_mode(),
            self.fc.src_addressing_mode(),
            self.fc.pan_id_compression(),
        )
    }

    /// Return the length of the Addressing Fields in octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self.flags() {
            Some((dst_pan_id, dst, src_pan_id, src)) => {
                (if dst_pan_id { 2 } else { 0 })
                    + dst.size()
                    + (if src_pan_id { 2 } else { 0 })
                    + src.size()
            }
            None => 0,
        }
    }

    /// Return the IEEE 802.15.4 destination [`Address`].
    pub fn dst_address(&self) -> Option<Address> {
        let (dst_pan_id, dst, _, _) = self.flags()?;
        let offset = if dst_pan_id { 2 } else { 0 };
        Address::from_le_bytes(&self.buffer.as_ref()[offset..][..dst.size()]).ok()
    }

    /// Return the IEEE 802.15.4 source [`Address`].
    pub fn src_address(&self) -> Option<Address> {
        let (dst_pan_id, dst, src_pan_id, src) = self.flags()?;
        let mut offset = if dst_pan_id { 2 } else { 0 };
        offset += dst.size();
        offset += if src_pan_id { 2 } else { 0 };
        Address::from_le_bytes(&self.buffer.as_ref()[offset..][..src.size()]).ok()
    }

    /// Return the IEEE 802.15.4 destination PAN ID if not elided.
    pub fn dst_pan_id(&self) -> Option<u16> {
        match self.flags()? {
            (true, _, _, _) => {
                let b = &self.buffer.as_ref()[..2];
                Some(u16::from_le_bytes([b[0], b[1]]))
            }
            _ => None,
        }
    }

    /// Return the IEEE 802.15.4 source PAN ID if not elided.
    pub fn src_pan_id(&self) -> Option<u16> {
        match self.flags()? {
            (dst_pan_id, dst, true, _) => {
                let mut offset = if dst_pan_id { 2 } else { 0 };
                offset += dst.size();
                let b = &self.buffer.as_ref()[offset..][..2];
                Some(u16::from_le_bytes([b[0], b[1]]))
            }
            _ => None,
        }
    }

    /// Return the PAN ID the source belongs to: the source PAN ID, or the
    /// destination PAN ID when compressed.
    pub fn effective_src_pan_id(&self) -> Option<u16> {
        self.src_pan_id().or_else(|| {
            if self.fc.pan_id_compression() {
                self.dst_pan_id()
            } else {
                None
            }
        })
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>, FC: AsRef<[u8]>> AddressingFields<T, FC> {
    /// Write the addressing fields. The frame control must already carry the
    /// matching addressing modes and PAN ID compression bit.
    pub fn write_fields(&mut self, fields: &super::repr::AddressingFieldsRepr) {
        let mut offset = 0;

        if let Some(id) = fields.dst_pan_id {
            self.buffer.as_mut()[offset..][..2].copy_from_slice(&id.to_le_bytes());
            offset += 2;
        }

        fields
            .dst_address
            .write_le_bytes(&mut self.buffer.as_mut()[offset..]);
        offset += fields.dst_address.len();

        if let Some(id) = fields.src_pan_id {
            self.buffer.as_mut()[offset..][..2].copy_from_slice(&id.to_le_bytes());
            offset += 2;
        }

        fields
            .src_address
            .write_le_bytes(&mut self.buffer.as_mut()[offset..]);
    }
}

impl<T: AsRef<[u8]>, FC: AsRef<[u8]>> core::fmt::Display for AddressingFields<T, FC> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Addressing Fields")?;

        if let Some(id) = self.dst_pan_id() {
            writeln!(f, "  dst pan id: {:0x}", id)?;
        }

        if let Some(addr) = self.dst_address() {
            writeln!(f, "  dst address: {}", addr)?;
        }

        if let Some(id) = self.src_pan_id() {
            writeln!(f, "  src pan id: {:0x}", id)?;
        }

        if let Some(addr) = self.src_address() {
            writeln!(f, "  src address: {}", addr)?;
        }

        Ok(())
    }
}
