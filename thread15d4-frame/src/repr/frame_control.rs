#![allow(missing_docs)]

use crate::{AddressingMode, FrameControl, FrameType, FrameVersion};
use crate::{Error, Result};

/// Owned Frame Control field of a 2003 or 2006 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct FrameControlRepr {
    pub frame_type: FrameType,
    pub security_enabled: bool,
    pub frame_pending: bool,
    pub ack_request: bool,
    pub pan_id_compression: bool,
    pub dst_addressing_mode: AddressingMode,
    pub src_addressing_mode: AddressingMode,
    pub frame_version: FrameVersion,
}

impl FrameControlRepr {
    pub fn parse(fc: FrameControl<&[u8]>) -> Result<Self> {
        let repr = Self {
            frame_type: fc.frame_type(),
            security_enabled: fc.security_enabled(),
            frame_pending: fc.frame_pending(),
            ack_request: fc.ack_request(),
            pan_id_compression: fc.pan_id_compression(),
            dst_addressing_mode: fc.dst_addressing_mode(),
            src_addressing_mode: fc.src_addressing_mode(),
            frame_version: fc.frame_version(),
        };
        repr.validate()?;
        Ok(repr)
    }

    /// Check that the field describes a frame these readers understand.
    ///
    /// Security is only defined for 2006 frames here, and 2015 frames (with
    /// their information elements) are refused.
    pub fn validate(&self) -> Result<()> {
        if self.frame_type == FrameType::Unknown
            || self.dst_addressing_mode == AddressingMode::Unknown
            || self.src_addressing_mode == AddressingMode::Unknown
        {
            return Err(Error);
        }

        match self.frame_version {
            FrameVersion::Ieee802154_2003 if !self.security_enabled => Ok(()),
            FrameVersion::Ieee802154_2006 => Ok(()),
            _ => Err(Error),
        }
    }

    pub const fn buffer_len(&self) -> usize {
        2
    }

    pub fn emit(&self, fc: &mut FrameControl<&mut [u8]>) {
        fc.set_frame_type(self.frame_type);
        fc.set_frame_version(self.frame_version);
        fc.set_security_enabled(self.security_enabled);
        fc.set_frame_pending(self.frame_pending);
        fc.set_ack_request(self.ack_request);
        fc.set_pan_id_compression(self.pan_id_compression);
        fc.set_dst_addressing_mode(self.dst_addressing_mode);
        fc.set_src_addressing_mode(self.src_addressing_mode);
    }
}
