//! CoAP (RFC 7252) messages as used by Thread management: a type, a code,
//! a token, the Uri-Path option and a payload. Other options are skipped.

use heapless::Vec;

use crate::{Error, Result};

const VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xff;
const HEADER_LEN: usize = 4;

pub const MAX_TOKEN_LEN: usize = 8;
const MAX_URI_PATH_LEN: usize = 16;

const OPTION_URI_PATH: u16 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Type {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgment = 2,
    Reset = 3,
}

impl Type {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgment,
            _ => Self::Reset,
        }
    }
}

/// Request method or response code, `class.detail` packed in one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Self = Self(0x00);
    pub const POST: Self = Self(0x02);
    pub const CHANGED: Self = Self(0x44);
    pub const BAD_REQUEST: Self = Self(0x80);
    pub const NOT_FOUND: Self = Self(0x84);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && self != Self::EMPTY
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage<'a> {
    pub typ: Type,
    pub code: Code,
    pub message_id: u16,
    pub token: &'a [u8],
    uri_path: Vec<u8, MAX_URI_PATH_LEN>,
    pub payload: &'a [u8],
}

impl<'a> CoapMessage<'a> {
    /// A request for `uri_path`, segments separated by `/`.
    pub fn request(
        typ: Type,
        code: Code,
        message_id: u16,
        token: &'a [u8],
        uri_path: &str,
        payload: &'a [u8],
    ) -> Result<Self> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::InvalidArgs);
        }
        Ok(Self {
            typ,
            code,
            message_id,
            token,
            uri_path: Vec::from_slice(uri_path.as_bytes()).map_err(|_| Error::InvalidArgs)?,
            payload,
        })
    }

    /// A response to `request`, piggybacked on the acknowledgment of
    /// confirmable requests.
    pub fn response(request: &CoapMessage<'a>, code: Code, payload: &'a [u8]) -> Self {
        let typ = match request.typ {
            Type::Confirmable => Type::Acknowledgment,
            _ => Type::NonConfirmable,
        };
        Self {
            typ,
            code,
            message_id: request.message_id,
            token: request.token,
            uri_path: Vec::new(),
            payload,
        }
    }

    pub fn uri_path(&self) -> &[u8] {
        &self.uri_path
    }

    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let [first, code, id0, id1, rest @ ..] = buffer else {
            return Err(Error::Parse);
        };
        if first >> 6 != VERSION {
            return Err(Error::Parse);
        }
        let token_len = (first & 0x0f) as usize;
        if token_len > MAX_TOKEN_LEN || rest.len() < token_len {
            return Err(Error::Parse);
        }
        let (token, mut rest) = rest.split_at(token_len);

        let mut uri_path: Vec<u8, MAX_URI_PATH_LEN> = Vec::new();
        let mut number = 0u16;
        let mut payload: &[u8] = &[];
        while let [byte, tail @ ..] = rest {
            if *byte == PAYLOAD_MARKER {
                if tail.is_empty() {
                    return Err(Error::Parse);
                }
                payload = tail;
                break;
            }
            let (delta, tail) = option_nibble(byte >> 4, tail)?;
            let (len, tail) = option_nibble(byte & 0x0f, tail)?;
            let value = tail.get(..len as usize).ok_or(Error::Parse)?;
            number = number.checked_add(delta).ok_or(Error::Parse)?;

            if number == OPTION_URI_PATH {
                if !uri_path.is_empty() {
                    uri_path.push(b'/').map_err(|_| Error::Parse)?;
                }
                uri_path.extend_from_slice(value).map_err(|_| Error::Parse)?;
            }
            rest = &tail[len as usize..];
        }

        Ok(Self {
            typ: Type::from_bits(first >> 4),
            code: Code(*code),
            message_id: u16::from_be_bytes([*id0, *id1]),
            token,
            uri_path,
            payload,
        })
    }

    /// Write the message to `buffer` and return its length.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut offset = HEADER_LEN + self.token.len();
        if buffer.len() < offset {
            return Err(Error::NoBufs);
        }
        buffer[0] = VERSION << 6 | (self.typ as u8) << 4 | self.token.len() as u8;
        buffer[1] = self.code.0;
        buffer[2..4].copy_from_slice(&self.message_id.to_be_bytes());
        buffer[HEADER_LEN..offset].copy_from_slice(self.token);

        let mut delta = OPTION_URI_PATH;
        if !self.uri_path.is_empty() {
            for segment in self.uri_path.split(|b| *b == b'/') {
                offset += emit_option(&mut buffer[offset..], delta, segment)?;
                delta = 0;
            }
        }

        if !self.payload.is_empty() {
            let end = offset + 1 + self.payload.len();
            let out = buffer.get_mut(offset..end).ok_or(Error::NoBufs)?;
            out[0] = PAYLOAD_MARKER;
            out[1..].copy_from_slice(self.payload);
            offset = end;
        }
        Ok(offset)
    }
}

fn option_nibble(nibble: u8, rest: &[u8]) -> Result<(u16, &[u8])> {
    match (nibble, rest) {
        (0..=12, _) => Ok((nibble as u16, rest)),
        (13, [ext, tail @ ..]) => Ok((*ext as u16 + 13, tail)),
        (14, [hi, lo, tail @ ..]) => Ok((u16::from_be_bytes([*hi, *lo]).saturating_add(269), tail)),
        _ => Err(Error::Parse),
    }
}

fn emit_option(buffer: &mut [u8], delta: u16, value: &[u8]) -> Result<usize> {
    // Uri-Path segments are short: one byte for the delta and length
    // nibbles, plus an extended length byte for 13..=268 bytes.
    let (len_nibble, ext): (u8, &[u8]) = match value.len() {
        0..=12 => (value.len() as u8, &[]),
        13..=268 => (13, &[(value.len() - 13) as u8]),
        _ => return Err(Error::InvalidArgs),
    };
    if delta > 12 {
        return Err(Error::InvalidArgs);
    }
    let total = 1 + ext.len() + value.len();
    let out = buffer.get_mut(..total).ok_or(Error::NoBufs)?;
    out[0] = (delta as u8) << 4 | len_nibble;
    out[1..1 + ext.len()].copy_from_slice(ext);
    out[1 + ext.len()..].copy_from_slice(value);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_solicit_request() {
        let request =
            CoapMessage::request(Type::Confirmable, Code::POST, 0x1234, &[0xaa, 0xbb], "a/as", &[1, 2])
                .unwrap();
        let mut buffer = [0u8; 32];
        let len = request.emit(&mut buffer).unwrap();
        assert_eq!(
            &buffer[..len],
            &[0x42, 0x02, 0x12, 0x34, 0xaa, 0xbb, 0xb1, b'a', 0x02, b'a', b's', 0xff, 1, 2]
        );

        let parsed = CoapMessage::parse(&buffer[..len]).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.uri_path(), b"a/as");
        assert!(parsed.code.is_request());
    }

    #[test]
    fn piggybacked_response() {
        let request =
            CoapMessage::request(Type::Confirmable, Code::POST, 7, &[1], "a/ar", &[]).unwrap();
        let response = CoapMessage::response(&request, Code::CHANGED, &[]);
        assert_eq!(response.typ, Type::Acknowledgment);

        let mut buffer = [0u8; 8];
        let len = response.emit(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[0x61, 0x44, 0x00, 0x07, 0x01]);
        let parsed = CoapMessage::parse(&buffer[..len]).unwrap();
        assert!(parsed.code.is_success());
        assert!(parsed.uri_path().is_empty());
    }

    #[test]
    fn other_options_are_skipped() {
        // Uri-Host (3) "x", Uri-Path "sd", Content-Format (12) empty
        let buffer = [
            0x50, 0x02, 0, 1, 0x31, b'x', 0x82, b's', b'd', 0x10, 0xff, 9,
        ];
        let message = CoapMessage::parse(&buffer).unwrap();
        assert_eq!(message.typ, Type::NonConfirmable);
        assert_eq!(message.uri_path(), b"sd");
        assert_eq!(message.payload, &[9]);
    }

    #[test]
    fn malformed() {
        assert_eq!(CoapMessage::parse(&[0x40, 0x02, 0]), Err(Error::Parse));
        // wrong version
        assert_eq!(CoapMessage::parse(&[0x80, 0x02, 0, 0]), Err(Error::Parse));
        // token longer than the message
        assert_eq!(CoapMessage::parse(&[0x44, 0x02, 0, 0, 1]), Err(Error::Parse));
        // payload marker without payload
        assert_eq!(CoapMessage::parse(&[0x40, 0x02, 0, 0, 0xff]), Err(Error::Parse));
        // option running past the end
        assert_eq!(CoapMessage::parse(&[0x40, 0x02, 0, 0, 0xb4, b'a']), Err(Error::Parse));
    }
}
