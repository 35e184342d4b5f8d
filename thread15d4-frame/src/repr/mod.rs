use crate::{CommandId, FrameType};

use super::{Error, Frame, Result};

mod addressing;
pub use addressing::AddressingFieldsRepr;

mod frame_control;
pub use frame_control::FrameControlRepr;

mod security;
pub use security::AuxSecurityHeaderRepr;

mod builder;
pub use builder::{Ack, Beacon, Command, Data, FrameBuilder};

/// A high-level representation of an IEEE 802.15.4-2006 frame.
///
/// For secured frames the payload is the plaintext; [`emit`] leaves room for
/// the MIC (zero filled) and the caller applies CCM* in place.
///
/// [`emit`]: FrameRepr::emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct FrameRepr<'p> {
    /// The frame control field.
    pub frame_control: FrameControlRepr,
    /// The sequence number.
    pub sequence_number: u8,
    /// The addressing fields.
    pub addressing_fields: AddressingFieldsRepr,
    /// The auxiliary security header.
    pub security: Option<AuxSecurityHeaderRepr>,
    /// The command identifier of MAC command frames.
    pub command_id: Option<CommandId>,
    /// The payload.
    pub payload: &'p [u8],
}

impl<'f> FrameRepr<'f> {
    /// Parse an IEEE 802.15.4 frame.
    pub fn parse(reader: &Frame<&'f [u8]>) -> Result<Self> {
        let frame_control = FrameControlRepr::parse(reader.frame_control())?;
        let addressing_fields = AddressingFieldsRepr::parse(reader.addressing())?;
        let security = reader
            .auxiliary_security_header()
            .map(AuxSecurityHeaderRepr::parse)
            .transpose()?;

        let buffer: &'f [u8] = reader.inner();
        let header_len = reader.header_len();
        let payload = &buffer[header_len..buffer.len() - reader.mic_len()];

        Ok(Self {
            frame_control,
            sequence_number: reader.sequence_number(),
            addressing_fields,
            security,
            command_id: reader.command_id(),
            payload,
        })
    }

    /// Validate the frame.
    pub fn validate(&self) -> Result<()> {
        self.frame_control.validate()?;

        if self.frame_control.security_enabled != self.security.is_some() {
            return Err(Error);
        }

        if (self.frame_control.frame_type == FrameType::MacCommand) != self.command_id.is_some() {
            return Err(Error);
        }

        if self.frame_control.frame_type == FrameType::Ack {
            if !self.addressing_fields.dst_address.is_empty()
                || !self.addressing_fields.src_address.is_empty()
            {
                return Err(Error);
            }
        } else {
            self.addressing_fields.validate(&self.frame_control)?;
        }

        if self.buffer_len() > crate::MAX_FRAME_LEN {
            return Err(Error);
        }

        Ok(())
    }

    /// Return the length of the MIC of a secured frame.
    pub fn mic_len(&self) -> usize {
        self.security
            .map(|s| s.security_level.mic_len())
            .unwrap_or(0)
    }

    /// Return the length of the MAC header, command identifier included.
    pub fn header_len(&self) -> usize {
        self.frame_control.buffer_len()
            + 1
            + self.addressing_fields.buffer_len()
            + self.security.map(|s| s.buffer_len()).unwrap_or(0)
            + self.command_id.map(|_| 1).unwrap_or(0)
    }

    /// Return the length of the frame when emitted into a buffer, FCS excluded.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload.len() + self.mic_len()
    }

    /// Emit the frame into a buffer of exactly [`buffer_len`] bytes.
    ///
    /// [`buffer_len`]: FrameRepr::buffer_len
    pub fn emit(&self, frame: &mut Frame<&'_ mut [u8]>) {
        frame.set_frame_control(&self.frame_control);
        frame.set_sequence_number(self.sequence_number);
        frame.set_addressing_fields(&self.addressing_fields);

        if let Some(security) = &self.security {
            frame.set_aux_sec_header(security);
        }

        if let Some(id) = self.command_id {
            frame.set_command_id(id);
        }

        let (_, payload, mic) = frame.split_secured_mut();
        payload.copy_from_slice(self.payload);
        mic.fill(0);
    }
}
