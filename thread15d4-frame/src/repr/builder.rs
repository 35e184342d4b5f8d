use super::*;
use crate::{Address, AddressingMode, FrameType, FrameVersion, KeyIdentifier, SecurityLevel};
use crate::{Error, Result};

/// Type state of a beacon frame builder.
pub struct Beacon;
/// Type state of an acknowledgment frame builder.
pub struct Ack;
/// Type state of a data frame builder.
pub struct Data;
/// Type state of a MAC command frame builder.
pub struct Command;

/// A helper for building IEEE 802.15.4 frames.
pub struct FrameBuilder<'p, T> {
    frame: FrameRepr<'p>,
    r#type: core::marker::PhantomData<T>,
}

const fn frame_control(frame_type: FrameType) -> FrameControlRepr {
    FrameControlRepr {
        frame_type,
        security_enabled: false,
        frame_pending: false,
        ack_request: false,
        pan_id_compression: false,
        dst_addressing_mode: AddressingMode::Absent,
        src_addressing_mode: AddressingMode::Absent,
        frame_version: FrameVersion::Ieee802154_2003,
    }
}

impl<'p, T> FrameBuilder<'p, T> {
    fn with(frame_type: FrameType, command_id: Option<CommandId>, payload: &'p [u8]) -> Self {
        Self {
            frame: FrameRepr {
                frame_control: frame_control(frame_type),
                sequence_number: 0,
                addressing_fields: AddressingFieldsRepr::default(),
                security: None,
                command_id,
                payload,
            },
            r#type: core::marker::PhantomData,
        }
    }
}

impl<'p> FrameBuilder<'p, Ack> {
    /// Create a new builder for an immediate acknowledgment frame.
    pub fn new_imm_ack(sequence_number: u8) -> Self {
        Self::with(FrameType::Ack, None, &[]).set_sequence_number(sequence_number)
    }
}

impl<'p> FrameBuilder<'p, Beacon> {
    /// Create a new builder for a beacon frame carrying the given MAC
    /// payload (superframe specification, GTS, pending addresses and beacon
    /// payload, see [`emit_beacon`](crate::emit_beacon)).
    pub fn new_beacon(payload: &'p [u8]) -> Self {
        Self::with(FrameType::Beacon, None, payload)
    }
}

impl<'p> FrameBuilder<'p, Data> {
    /// Create a new builder for a data frame.
    pub fn new_data(payload: &'p [u8]) -> Self {
        Self::with(FrameType::Data, None, payload)
    }
}

impl<'p> FrameBuilder<'p, Command> {
    /// Create a new builder for a MAC command frame.
    pub fn new_command(command_id: CommandId, payload: &'p [u8]) -> Self {
        Self::with(FrameType::MacCommand, Some(command_id), payload)
    }
}

impl<'p, T> FrameBuilder<'p, T> {
    /// Set the frame sequence number.
    pub fn set_sequence_number(mut self, sequence_number: u8) -> Self {
        self.frame.sequence_number = sequence_number;
        self
    }

    /// Set the destination PAN ID.
    pub fn set_dst_pan_id(mut self, pan_id: u16) -> Self {
        self.frame.addressing_fields.dst_pan_id = Some(pan_id);
        self
    }

    /// Set the source PAN ID.
    pub fn set_src_pan_id(mut self, pan_id: u16) -> Self {
        self.frame.addressing_fields.src_pan_id = Some(pan_id);
        self
    }

    /// Set the destination address.
    ///
    /// # Note
    /// Based on the address, the addressing mode will be set.
    pub fn set_dst_address(mut self, address: Address) -> Self {
        self.frame.frame_control.dst_addressing_mode = address.into();
        self.frame.addressing_fields.dst_address = address;
        self
    }

    /// Set the source address.
    ///
    /// # Note
    /// Based on the address, the addressing mode will be set.
    pub fn set_src_address(mut self, address: Address) -> Self {
        self.frame.frame_control.src_addressing_mode = address.into();
        self.frame.addressing_fields.src_address = address;
        self
    }

    /// Request an acknowledgment.
    pub fn set_ack_request(mut self, ack_request: bool) -> Self {
        self.frame.frame_control.ack_request = ack_request;
        self
    }

    /// Set the frame pending bit.
    pub fn set_frame_pending(mut self, frame_pending: bool) -> Self {
        self.frame.frame_control.frame_pending = frame_pending;
        self
    }

    /// Secure the frame.
    ///
    /// # Note
    /// This method enables the security bit and sets the frame version to
    /// IEEE 802.15.4-2006. The payload stays in plaintext until CCM* is
    /// applied on the emitted buffer.
    pub fn set_security(
        mut self,
        security_level: SecurityLevel,
        key_identifier: KeyIdentifier,
        frame_counter: u32,
    ) -> Self {
        self.frame.frame_control.security_enabled = true;
        self.frame.frame_control.frame_version = FrameVersion::Ieee802154_2006;
        self.frame.security = Some(AuxSecurityHeaderRepr {
            security_level,
            key_identifier,
            frame_counter,
        });
        self
    }

    /// Set the frame payload.
    pub fn set_payload(mut self, payload: &'p [u8]) -> Self {
        self.frame.payload = payload;
        self
    }

    /// Finalize the frame builder, returning the frame representation.
    ///
    /// # Note
    /// The source PAN ID is elided and PAN ID compression is set when both
    /// addresses are present and the PAN IDs are equal (or the source PAN
    /// ID was never set).
    pub fn finalize(mut self) -> Result<FrameRepr<'p>> {
        if self.frame.frame_control.frame_type == FrameType::Ack {
            self.frame.addressing_fields = AddressingFieldsRepr::default();
            return Ok(self.frame);
        }

        let addr = &mut self.frame.addressing_fields;

        match (
            addr.dst_address.is_empty(),
            addr.src_address.is_empty(),
            addr.dst_pan_id,
            addr.src_pan_id,
        ) {
            (false, false, Some(dst), src) => {
                if src.is_none() || src == Some(dst) {
                    self.frame.frame_control.pan_id_compression = true;
                    addr.src_pan_id = None;
                } else {
                    self.frame.frame_control.pan_id_compression = false;
                }
            }
            (false, true, Some(_), _) => {
                self.frame.frame_control.pan_id_compression = false;
                addr.src_pan_id = None;
            }
            (true, false, dst, src) => {
                self.frame.frame_control.pan_id_compression = false;
                addr.src_pan_id = src.or(dst);
                addr.dst_pan_id = None;
                if addr.src_pan_id.is_none() {
                    return Err(Error);
                }
            }
            _ => return Err(Error),
        }

        self.frame.validate()?;

        Ok(self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExtAddress, Frame};

    fn emit(repr: &FrameRepr<'_>) -> std::vec::Vec<u8> {
        let mut buffer = vec![0u8; repr.buffer_len()];
        repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));
        buffer
    }

    #[test]
    fn imm_ack() {
        let repr = FrameBuilder::new_imm_ack(42).finalize().unwrap();
        assert_eq!(emit(&repr), [0x02, 0x00, 42]);
    }

    #[test]
    fn data_with_different_pans() {
        let repr = FrameBuilder::new_data(&[0x01])
            .set_sequence_number(1)
            .set_dst_pan_id(0xabcd)
            .set_dst_address(Address::BROADCAST)
            .set_src_pan_id(0x1234)
            .set_src_address(Address::Short(0x0001))
            .finalize()
            .unwrap();
        assert!(!repr.frame_control.pan_id_compression);
        assert_eq!(
            emit(&repr),
            [0x01, 0x88, 0x01, 0xcd, 0xab, 0xff, 0xff, 0x34, 0x12, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn beacon_request_command() {
        let repr = FrameBuilder::new_command(CommandId::BeaconRequest, &[])
            .set_sequence_number(3)
            .set_dst_pan_id(0xffff)
            .set_dst_address(Address::BROADCAST)
            .finalize()
            .unwrap();
        assert_eq!(emit(&repr), [0x03, 0x08, 0x03, 0xff, 0xff, 0xff, 0xff, 0x07]);
    }

    #[test]
    fn secured_data_frame() {
        let src = ExtAddress([0x18, 0xb4, 0x30, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let repr = FrameBuilder::new_data(&[0xaa, 0xbb])
            .set_sequence_number(9)
            .set_dst_pan_id(0xface)
            .set_dst_address(Address::Short(0x0400))
            .set_src_address(Address::Extended(src))
            .set_security(SecurityLevel::EncMic32, KeyIdentifier::Index(1), 7)
            .finalize()
            .unwrap();
        assert_eq!(repr.mic_len(), 4);
        assert_eq!(repr.header_len(), 3 + 2 + 2 + 8 + 6);

        let bytes = emit(&repr);
        let frame = Frame::new(&bytes[..]).unwrap();
        assert_eq!(frame.frame_control().frame_version(), FrameVersion::Ieee802154_2006);
        assert_eq!(frame.addressing().src_address(), Some(Address::Extended(src)));
        assert_eq!(frame.addressing().effective_src_pan_id(), Some(0xface));
        assert_eq!(frame.payload(), &[0xaa, 0xbb]);
        assert_eq!(frame.mic(), &[0, 0, 0, 0]);
        assert_eq!(FrameRepr::parse(&frame).unwrap(), repr);
    }

    #[test]
    fn missing_addresses() {
        assert!(FrameBuilder::new_data(&[]).finalize().is_err());
        assert!(FrameBuilder::new_data(&[])
            .set_dst_address(Address::BROADCAST)
            .finalize()
            .is_err());
    }
}
