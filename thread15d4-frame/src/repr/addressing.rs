use super::FrameControlRepr;

use crate::{Address, AddressingFields, AddressingMode, Error, FrameType, Result};

/// A high-level representation of the IEEE 802.15.4 Addressing Fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct AddressingFieldsRepr {
    /// Destination PAN identifier.
    pub dst_pan_id: Option<u16>,
    /// Destination address.
    pub dst_address: Address,
    /// Source PAN identifier.
    pub src_pan_id: Option<u16>,
    /// Source address.
    pub src_address: Address,
}

impl AddressingFieldsRepr {
    /// Parse the Addressing Fields from the given reader.
    pub fn parse(addressing: AddressingFields<&'_ [u8], &'_ [u8]>) -> Result<Self> {
        Ok(Self {
            dst_pan_id: addressing.dst_pan_id(),
            dst_address: addressing.dst_address().ok_or(Error)?,
            src_pan_id: addressing.src_pan_id(),
            src_address: addressing.src_address().ok_or(Error)?,
        })
    }

    /// Validate the Addressing Fields against the frame control.
    pub fn validate(&self, fc: &FrameControlRepr) -> Result<()> {
        if AddressingMode::from(self.dst_address) != fc.dst_addressing_mode
            || AddressingMode::from(self.src_address) != fc.src_addressing_mode
        {
            return Err(Error);
        }

        if fc.frame_type == FrameType::Data && self.dst_address.is_empty() && self.src_address.is_empty() {
            return Err(Error);
        }

        // 2006 rules: a PAN ID accompanies each present address, except
        // the source PAN ID under compression.
        let dst_pan_expected = !self.dst_address.is_empty();
        let src_pan_expected = !self.src_address.is_empty()
            && (self.dst_address.is_empty() || !fc.pan_id_compression);

        if self.dst_pan_id.is_some() != dst_pan_expected
            || self.src_pan_id.is_some() != src_pan_expected
        {
            return Err(Error);
        }

        Ok(())
    }

    /// Return the length of the Addressing Fields in octets.
    pub fn buffer_len(&self) -> usize {
        self.dst_pan_id.map(|_| 2).unwrap_or(0)
            + self.dst_address.len()
            + self.src_pan_id.map(|_| 2).unwrap_or(0)
            + self.src_address.len()
    }
}
