//! Readers and writers for complete IEEE 802.15.4-2006 frames.

use crate::{Error, Result};

use crate::{
    AddressingFields, AuxiliarySecurityHeader, CommandId, FrameControl, FrameType, FrameVersion,
};

/// A reader for an IEEE 802.15.4 frame followed by a Frame Check Sequence (FCS).
pub struct FrameWithFcs<T: AsRef<[u8]>> {
    buffer: T,
}

/// CRC-16 used for the FCS. Unlike most CRCs, the initial and final values
/// are both 0x0000 instead of the 0xFFFF of the ITU-T CRC-16 standard.
const CRC_16_IEEE802154: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x2189,
    residue: 0x0000,
};

/// Compute the FCS of `content` (the frame without FCS).
pub fn calculate_fcs(content: &[u8]) -> u16 {
    crc::Crc::<u16>::new(&CRC_16_IEEE802154).checksum(content)
}

impl<T: AsRef<[u8]>> FrameWithFcs<T> {
    /// Create a new [`FrameWithFcs`] from a given buffer.
    pub fn new(buffer: T) -> Result<Self> {
        let frame = Self::new_unchecked(buffer);

        if !frame.check_len() {
            return Err(Error);
        }

        if !frame.check_fcs() {
            return Err(Error);
        }

        Ok(frame)
    }

    /// Check the length of the frame.
    pub fn check_len(&self) -> bool {
        self.buffer.as_ref().len() >= 2
    }

    /// Calculate the Frame Check Sequence (FCS) of the frame.
    #[inline]
    pub fn calculate_fcs(&self) -> u16 {
        calculate_fcs(self.content())
    }

    /// Check the Frame Check Sequence (FCS) of the frame.
    #[inline]
    pub fn check_fcs(&self) -> bool {
        self.calculate_fcs() == self.fcs()
    }

    /// Create a new [`FrameWithFcs`] from a given buffer without checking the FCS.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return the content of the frame, excluding the FCS.
    pub fn content(&self) -> &[u8] {
        &self.buffer.as_ref()[..self.buffer.as_ref().len() - 2]
    }

    /// Return the Frame Check Sequence (FCS) of the frame.
    pub fn fcs(&self) -> u16 {
        let len = self.buffer.as_ref().len();
        u16::from_le_bytes([self.buffer.as_ref()[len - 2], self.buffer.as_ref()[len - 1]])
    }

    /// Return a reader for the frame, excluding the FCS.
    pub fn frame(&self) -> Result<Frame<&'_ [u8]>> {
        Frame::new(self.content())
    }
}

/// A reader/writer for an IEEE 802.15.4-2006 frame, FCS excluded.
///
/// The layout is: frame control, sequence number, addressing fields,
/// auxiliary security header (when security is enabled), command identifier
/// (for MAC command frames), payload and MIC.
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Frame<T> {
    /// Create a new [`Frame`] reader, validating every length and mode.
    pub fn new(buffer: T) -> Result<Self> {
        let frame = Self::new_unchecked(buffer);

        if !frame.check_len() {
            return Err(Error);
        }

        Ok(frame)
    }

    fn check_len(&self) -> bool {
        let b = self.buffer.as_ref();

        if b.len() < 3 || b.len() > crate::MAX_FRAME_LEN {
            return false;
        }

        let fc = self.frame_control();

        if !matches!(
            fc.frame_version(),
            FrameVersion::Ieee802154_2003 | FrameVersion::Ieee802154_2006
        ) {
            return false;
        }

        if fc.frame_type() == FrameType::Unknown {
            return false;
        }

        if AddressingFields::new(&b[3..], fc).is_err() {
            return false;
        }

        let mut offset = 3 + self.addressing().len();

        if self.frame_control().security_enabled() {
            match AuxiliarySecurityHeader::new(&b[offset..]) {
                Ok(header) => offset += header.len(),
                Err(_) => return false,
            }
        }

        if self.frame_control().frame_type() == FrameType::MacCommand {
            offset += 1;
        }

        offset + self.mic_len() <= b.len()
    }

    /// Create a new [`Frame`] reader/writer without checking the buffer.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return a [`FrameControl`] reader.
    pub fn frame_control(&self) -> FrameControl<&'_ [u8]> {
        FrameControl::new_unchecked(&self.buffer.as_ref()[..2])
    }

    /// Return the sequence number of the frame.
    pub fn sequence_number(&self) -> u8 {
        self.buffer.as_ref()[2]
    }

    /// Return an [`AddressingFields`] reader.
    pub fn addressing(&self) -> AddressingFields<&'_ [u8], &'_ [u8]> {
        AddressingFields::new_unchecked(&self.buffer.as_ref()[3..], self.frame_control())
    }

    fn security_header_offset(&self) -> usize {
        3 + self.addressing().len()
    }

    /// Return the auxiliary security header when security is enabled.
    pub fn auxiliary_security_header(&self) -> Option<AuxiliarySecurityHeader<&'_ [u8]>> {
        if self.frame_control().security_enabled() {
            Some(AuxiliarySecurityHeader::new_unchecked(
                &self.buffer.as_ref()[self.security_header_offset()..],
            ))
        } else {
            None
        }
    }

    fn command_offset(&self) -> usize {
        self.security_header_offset()
            + self
                .auxiliary_security_header()
                .map(|h| h.len())
                .unwrap_or(0)
    }

    /// Return the command identifier of a MAC command frame.
    pub fn command_id(&self) -> Option<CommandId> {
        if self.frame_control().frame_type() == FrameType::MacCommand {
            Some(CommandId::from(self.buffer.as_ref()[self.command_offset()]))
        } else {
            None
        }
    }

    /// Length of the MAC header. The command identifier of MAC command frames
    /// is counted as header: it is authenticated but not encrypted.
    pub fn header_len(&self) -> usize {
        self.command_offset()
            + match self.frame_control().frame_type() {
                FrameType::MacCommand => 1,
                _ => 0,
            }
    }

    /// Length of the Message Integrity Code.
    pub fn mic_len(&self) -> usize {
        self.auxiliary_security_header()
            .map(|h| h.security_control().security_level().mic_len())
            .unwrap_or(0)
    }

    /// Return the MAC header (authenticated data of a secured frame).
    pub fn header(&self) -> &[u8] {
        &self.buffer.as_ref()[..self.header_len()]
    }

    /// Return the payload, between the header and the MIC.
    pub fn payload(&self) -> &[u8] {
        let len = self.buffer.as_ref().len();
        &self.buffer.as_ref()[self.header_len()..len - self.mic_len()]
    }

    /// Return the Message Integrity Code.
    pub fn mic(&self) -> &[u8] {
        let len = self.buffer.as_ref().len();
        &self.buffer.as_ref()[len - self.mic_len()..]
    }

    /// Return the whole frame buffer.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<'f> Frame<&'f [u8]> {
    /// Return the underlying buffer, keeping its lifetime.
    pub fn inner(&self) -> &'f [u8] {
        self.buffer
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    /// Set the frame control field.
    pub fn set_frame_control(&mut self, fc: &crate::FrameControlRepr) {
        let mut w = FrameControl::new_unchecked(&mut self.buffer.as_mut()[..2]);
        fc.emit(&mut w);
    }

    /// Set the sequence number.
    pub fn set_sequence_number(&mut self, sequence_number: u8) {
        self.buffer.as_mut()[2] = sequence_number;
    }

    /// Set the addressing fields. The frame control must be set first.
    pub fn set_addressing_fields(&mut self, fields: &crate::AddressingFieldsRepr) {
        let (fc, rest) = self.buffer.as_mut().split_at_mut(2);
        let mut w = AddressingFields::new_unchecked(&mut rest[1..], FrameControl::new_unchecked(&*fc));
        w.write_fields(fields);
    }

    /// Set the auxiliary security header. The frame control and addressing
    /// fields must be set first.
    pub fn set_aux_sec_header(&mut self, header: &crate::AuxSecurityHeaderRepr) {
        let offset = self.security_header_offset();
        let mut w = AuxiliarySecurityHeader::new_unchecked(&mut self.buffer.as_mut()[offset..]);
        header.emit(&mut w);
    }

    /// Set the frame counter in an already written auxiliary security header.
    pub fn set_frame_counter(&mut self, frame_counter: u32) {
        let offset = self.security_header_offset();
        let mut w = AuxiliarySecurityHeader::new_unchecked(&mut self.buffer.as_mut()[offset..]);
        w.set_frame_counter(frame_counter);
    }

    /// Set the command identifier of a MAC command frame.
    pub fn set_command_id(&mut self, id: CommandId) {
        let offset = self.command_offset();
        self.buffer.as_mut()[offset] = id as u8;
    }

    /// Set the frame pending bit of an already written frame.
    pub fn set_frame_pending(&mut self, pending: bool) {
        FrameControl::new_unchecked(&mut self.buffer.as_mut()[..2]).set_frame_pending(pending);
    }

    /// Return a mutable slice to the payload.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.header_len();
        let end = self.buffer.as_ref().len() - self.mic_len();
        &mut self.buffer.as_mut()[start..end]
    }

    /// Split the frame into header, payload and MIC for in-place security
    /// processing.
    pub fn split_secured_mut(&mut self) -> (&[u8], &mut [u8], &mut [u8]) {
        let header_len = self.header_len();
        let mic_len = self.mic_len();
        let len = self.buffer.as_ref().len();
        let (header, rest) = self.buffer.as_mut().split_at_mut(header_len);
        let (payload, mic) = rest.split_at_mut(len - header_len - mic_len);
        (&*header, payload, mic)
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for Frame<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.frame_control())?;
        writeln!(f, "Sequence Number: {}", self.sequence_number())?;
        write!(f, "{}", self.addressing())?;
        if let Some(header) = self.auxiliary_security_header() {
            write!(f, "{}", header)?;
        }
        if let Some(id) = self.command_id() {
            writeln!(f, "Command: {:?}", id)?;
        }
        writeln!(f, "Payload: {} bytes", self.payload().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Address, ExtAddress, KeyIdMode, SecurityLevel};

    #[test]
    fn data_frame() {
        let data = hex::decode("41d801cdabffffc7d9b514004b12002b000000").unwrap();
        let frame = Frame::new(&data[..]).unwrap();
        assert_eq!(frame.frame_control().frame_type(), FrameType::Data);
        assert_eq!(frame.sequence_number(), 1);
        assert_eq!(frame.addressing().dst_pan_id(), Some(0xabcd));
        assert_eq!(frame.addressing().dst_address(), Some(Address::BROADCAST));
        assert_eq!(
            frame.addressing().src_address(),
            Some(Address::Extended(ExtAddress([
                0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7
            ])))
        );
        assert!(frame.auxiliary_security_header().is_none());
        assert_eq!(frame.header_len(), 15);
        assert_eq!(frame.payload(), &[0x2b, 0x00, 0x00, 0x00]);
        assert!(frame.mic().is_empty());
    }

    #[test]
    fn secured_command_frame() {
        // IEEE 802.15.4-2006 Annex C.2.3, MAC command frame.
        let data = [
            0x2b, 0xdc, 0x84, 0x21, 0x43, 0x02, 0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0xff,
            0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0x06, 0x05, 0x00, 0x00, 0x00,
            0x01, 0xce, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let frame = Frame::new(&data[..]).unwrap();
        assert_eq!(frame.frame_control().frame_type(), FrameType::MacCommand);
        let header = frame.auxiliary_security_header().unwrap();
        assert_eq!(
            header.security_control().security_level(),
            SecurityLevel::EncMic64
        );
        assert_eq!(header.security_control().key_id_mode(), KeyIdMode::Implicit);
        assert_eq!(header.frame_counter(), 5);
        assert_eq!(frame.command_id(), Some(CommandId::AssociationRequest));
        assert_eq!(frame.header_len(), 29);
        assert_eq!(frame.payload(), &[0xce]);
        assert_eq!(frame.mic_len(), 8);
    }

    #[test]
    fn rejects_malformed() {
        // too short
        assert!(Frame::new(&[0x41u8, 0xd8][..]).is_err());
        // truncated addressing
        assert!(Frame::new(&hex::decode("41d801cdabffffc7d9b5").unwrap()[..]).is_err());
        // 2015 frame version
        assert!(Frame::new(&hex::decode("41e801cdabffffc7d9b514004b12002b").unwrap()[..]).is_err());
        // MIC longer than the remaining bytes
        let data = [
            0x69, 0xdc, 0x84, 0x21, 0x43, 0x02, 0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0x04, 0x05, 0x00, 0x00, 0x00, 0x61,
        ];
        assert!(Frame::new(&data[..]).is_ok());
        let data = [
            0x69, 0xdc, 0x84, 0x21, 0x43, 0x02, 0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x48, 0xde, 0xac, 0x06, 0x05, 0x00, 0x00, 0x00, 0x61,
        ];
        assert!(Frame::new(&data[..]).is_err());
        // too long
        assert!(Frame::new(&[0u8; 126][..]).is_err());
    }

    #[test]
    fn fcs() {
        let frame_with_fcs = [
            0x40, 0xeb, 0xcd, 0xab, 0xff, 0xff, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
            0x00, 0x3f, 0x32, 0x88, 0x06, 0x1a, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x19, 0x1c,
            0x01, 0x08, 0x07, 0x80, 0x00, 0x48, 0x08, 0xfc, 0x03, 0x20, 0x03, 0xe8, 0x03, 0x98,
            0x08, 0x90, 0x01, 0xc0, 0x00, 0x60, 0x09, 0xa0, 0x10, 0x10, 0x27, 0x01, 0xc8, 0x00,
            0x0a, 0x1b, 0x01, 0x00, 0x11, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x07, 0x12, 0x16,
        ];
        assert!(FrameWithFcs::new(&frame_with_fcs[..]).is_ok());

        let mut corrupted = frame_with_fcs;
        corrupted[5] ^= 0x01;
        assert!(FrameWithFcs::new(&corrupted[..]).is_err());

        let frame_with_fcs = [
            0x02, 0x2e, 0x8d, 0xcd, 0xab, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02,
            0x0f, 0x00, 0x00, 0x7d, 0xd4,
        ];
        assert!(FrameWithFcs::new(&frame_with_fcs[..]).is_ok());
    }

    #[test]
    fn fcs_of_data_frame() {
        let content = hex::decode("41d801cdabffffc7d9b514004b12002b000000").unwrap();
        let fcs = calculate_fcs(&content);
        let mut with_fcs = content.clone();
        with_fcs.extend_from_slice(&fcs.to_le_bytes());
        let frame = FrameWithFcs::new(&with_fcs[..]).unwrap();
        let inner = frame.frame().unwrap();
        assert_eq!(inner.payload(), &[0x2b, 0x00, 0x00, 0x00]);
    }
}
