//! Type-length-value encoding shared by MLE, TMF and MeshCoP datasets.
//!
//! A TLV is a one octet type, a one octet length and the value. A length of
//! `0xff` announces an extended TLV with a 16-bit big-endian length.

use crate::{Error, Result};

const EXTENDED_LENGTH: u8 = 0xff;

/// A borrowed TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tlv<'a> {
    pub typ: u8,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn u8(&self) -> Result<u8> {
        match self.value {
            [v, ..] => Ok(*v),
            _ => Err(Error::Parse),
        }
    }

    pub fn u16(&self) -> Result<u16> {
        match self.value {
            [a, b, ..] => Ok(u16::from_be_bytes([*a, *b])),
            _ => Err(Error::Parse),
        }
    }

    pub fn u32(&self) -> Result<u32> {
        match self.value {
            [a, b, c, d, ..] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => Err(Error::Parse),
        }
    }

    pub fn array<const N: usize>(&self) -> Result<[u8; N]> {
        array(self.value)
    }
}

/// Copy the first `N` bytes of `value`.
pub(crate) fn array<const N: usize>(value: &[u8]) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(value.get(..N).ok_or(Error::Parse)?);
    Ok(out)
}

/// An iterator over the TLVs of a buffer. Iteration stops at the first
/// malformed TLV; [`Tlvs::validate`] reports it.
#[derive(Clone)]
pub(crate) struct Tlvs<'a> {
    buffer: &'a [u8],
}

impl<'a> Tlvs<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Check that the whole buffer is a sequence of well formed TLVs.
    pub fn validate(buffer: &[u8]) -> Result<()> {
        let mut rest = buffer;
        while !rest.is_empty() {
            let (_, len) = split(rest).ok_or(Error::Parse)?;
            rest = &rest[len..];
        }
        Ok(())
    }

    /// Return the first TLV of the given type.
    pub fn find(buffer: &'a [u8], typ: u8) -> Option<Tlv<'a>> {
        Self::new(buffer).find(|tlv| tlv.typ == typ)
    }

    /// Return the first TLV of the given type, or `Error::Parse`.
    pub fn require(buffer: &'a [u8], typ: u8) -> Result<Tlv<'a>> {
        Self::find(buffer, typ).ok_or(Error::Parse)
    }
}

/// Split the first TLV off `buffer`, returning it and its total length.
fn split(buffer: &[u8]) -> Option<(Tlv<'_>, usize)> {
    let typ = *buffer.first()?;
    let len = *buffer.get(1)?;
    let (header, len) = if len == EXTENDED_LENGTH {
        let ext = buffer.get(2..4)?;
        (4, u16::from_be_bytes([ext[0], ext[1]]) as usize)
    } else {
        (2, len as usize)
    };
    let value = buffer.get(header..header + len)?;
    Some((Tlv { typ, value }, header + len))
}

impl<'a> Iterator for Tlvs<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (tlv, len) = split(self.buffer)?;
        self.buffer = &self.buffer[len..];
        Some(tlv)
    }
}

/// Appends TLVs to a buffer.
pub(crate) struct TlvWriter<'a> {
    buffer: &'a mut [u8],
    len: usize,
}

impl<'a> TlvWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Append raw bytes, outside of any TLV.
    pub fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.len + bytes.len();
        self.buffer
            .get_mut(self.len..end)
            .ok_or(Error::NoBufs)?
            .copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    pub fn push(&mut self, typ: u8, value: &[u8]) -> Result<()> {
        let header = if value.len() >= EXTENDED_LENGTH as usize { 4 } else { 2 };
        if self.len + header + value.len() > self.buffer.len() {
            return Err(Error::NoBufs);
        }

        if header == 4 {
            if value.len() > u16::MAX as usize {
                return Err(Error::InvalidArgs);
            }
            let len = (value.len() as u16).to_be_bytes();
            self.raw(&[typ, EXTENDED_LENGTH, len[0], len[1]])?;
        } else {
            self.raw(&[typ, value.len() as u8])?;
        }
        self.raw(value)
    }

    pub fn push_u8(&mut self, typ: u8, value: u8) -> Result<()> {
        self.push(typ, &[value])
    }

    pub fn push_u16(&mut self, typ: u8, value: u16) -> Result<()> {
        self.push(typ, &value.to_be_bytes())
    }

    pub fn push_u32(&mut self, typ: u8, value: u32) -> Result<()> {
        self.push(typ, &value.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterate() {
        let buffer = [0x00, 0x02, 0x04, 0x00, 0x03, 0x00, 0x12, 0x01, 0x0a];
        let tlvs: std::vec::Vec<_> = Tlvs::new(&buffer).collect();
        assert_eq!(tlvs.len(), 3);
        assert_eq!(tlvs[0].u16(), Ok(0x0400));
        assert_eq!(tlvs[1].typ, 3);
        assert!(tlvs[1].value.is_empty());
        assert_eq!(tlvs[2].u8(), Ok(0x0a));
        assert_eq!(Tlvs::find(&buffer, 0x12).map(|t| t.value), Some(&[0x0a][..]));
        assert!(Tlvs::require(&buffer, 0x07).is_err());
    }

    #[test]
    fn truncated() {
        assert!(Tlvs::validate(&[0x00, 0x02, 0x04]).is_err());
        assert!(Tlvs::validate(&[0x00]).is_err());
        assert!(Tlvs::validate(&[]).is_ok());
        assert_eq!(Tlvs::new(&[0x00, 0x01, 0x01, 0x02, 0x05]).count(), 1);
    }

    #[test]
    fn extended_length() {
        let value = [0x5a; 300];
        let mut buffer = [0u8; 310];
        let mut writer = TlvWriter::new(&mut buffer);
        writer.push(0x0c, &value).unwrap();
        assert_eq!(writer.len(), 304);
        assert_eq!(&buffer[..4], &[0x0c, 0xff, 0x01, 0x2c]);

        let tlv = Tlvs::find(&buffer[..304], 0x0c).unwrap();
        assert_eq!(tlv.value.len(), 300);
    }

    #[test]
    fn writer_out_of_room() {
        let mut buffer = [0u8; 5];
        let mut writer = TlvWriter::new(&mut buffer);
        writer.push_u16(1, 0xbeef).unwrap();
        assert_eq!(writer.push_u8(2, 1), Err(Error::NoBufs));
        assert_eq!(writer.len(), 4);
    }
}
