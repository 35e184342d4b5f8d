//! Auxiliary Security Header readers and writers.

use super::{Error, Result};

/// Security level of a secured frame.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum SecurityLevel {
    /// No security.
    #[default]
    None = 0,
    /// Authentication only, 32-bit MIC.
    Mic32 = 1,
    /// Authentication only, 64-bit MIC.
    Mic64 = 2,
    /// Authentication only, 128-bit MIC.
    Mic128 = 3,
    /// Encryption only.
    Enc = 4,
    /// Encryption and 32-bit MIC.
    EncMic32 = 5,
    /// Encryption and 64-bit MIC.
    EncMic64 = 6,
    /// Encryption and 128-bit MIC.
    EncMic128 = 7,
}

impl From<u8> for SecurityLevel {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::None,
            1 => Self::Mic32,
            2 => Self::Mic64,
            3 => Self::Mic128,
            4 => Self::Enc,
            5 => Self::EncMic32,
            6 => Self::EncMic64,
            _ => Self::EncMic128,
        }
    }
}

impl SecurityLevel {
    /// Return the MIC length.
    pub fn mic_len(&self) -> usize {
        match self {
            Self::Mic32 | Self::EncMic32 => 4,
            Self::Mic64 | Self::EncMic64 => 8,
            Self::Mic128 | Self::EncMic128 => 16,
            Self::None | Self::Enc => 0,
        }
    }

    /// Return `true` when confidentiality is enabled.
    pub fn encrypted(&self) -> bool {
        (*self as u8) & 0b100 != 0
    }
}

/// Key Identifier Mode field.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum KeyIdMode {
    /// Key determined implicitly from the originator and recipient.
    Implicit = 0,
    /// Key determined from a 1-octet key index.
    Index = 1,
    /// Key determined from a 4-octet key source and a key index.
    Source4Index = 2,
    /// Key determined from an 8-octet key source and a key index.
    Source8Index = 3,
}

impl From<u8> for KeyIdMode {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Implicit,
            1 => Self::Index,
            2 => Self::Source4Index,
            _ => Self::Source8Index,
        }
    }
}

impl KeyIdMode {
    /// Length of the Key Identifier field for this mode.
    pub fn key_identifier_len(&self) -> usize {
        match self {
            Self::Implicit => 0,
            Self::Index => 1,
            Self::Source4Index => 5,
            Self::Source8Index => 9,
        }
    }
}

/// A reader for the IEEE 802.15.4 Security Control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    buffer: u8,
}

impl SecurityControl {
    /// Create a security control reader from its raw value.
    pub fn from(buffer: u8) -> Self {
        Self { buffer }
    }

    /// Build the raw security control value.
    pub fn encode(level: SecurityLevel, key_id_mode: KeyIdMode) -> u8 {
        (level as u8) | ((key_id_mode as u8) << 3)
    }

    /// Return the security level field.
    pub fn security_level(&self) -> SecurityLevel {
        SecurityLevel::from(self.buffer & 0b111)
    }

    /// Return the key identifier mode field.
    pub fn key_id_mode(&self) -> KeyIdMode {
        KeyIdMode::from((self.buffer >> 3) & 0b11)
    }
}

/// A reader/writer for the IEEE 802.15.4-2006 Auxiliary Security Header.
#[derive(Debug)]
pub struct AuxiliarySecurityHeader<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AuxiliarySecurityHeader<T> {
    /// Create a new reader, checking the length against the key identifier
    /// mode.
    pub fn new(buffer: T) -> Result<Self> {
        let header = Self::new_unchecked(buffer);

        if !header.check_len() {
            return Err(Error);
        }

        Ok(header)
    }

    fn check_len(&self) -> bool {
        let b = self.buffer.as_ref();
        !b.is_empty() && b.len() >= self.len()
    }

    /// Create a new reader without checking the length.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Length of the header: security control, frame counter and key
    /// identifier.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + 4 + self.security_control().key_id_mode().key_identifier_len()
    }

    /// Return the Security Control field.
    pub fn security_control(&self) -> SecurityControl {
        SecurityControl::from(self.buffer.as_ref()[0])
    }

    /// Return the frame counter.
    pub fn frame_counter(&self) -> u32 {
        let b = &self.buffer.as_ref()[1..][..4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Return the key source, absent for implicit and index-only modes.
    pub fn key_source(&self) -> Option<&[u8]> {
        match self.security_control().key_id_mode() {
            KeyIdMode::Source4Index => Some(&self.buffer.as_ref()[5..][..4]),
            KeyIdMode::Source8Index => Some(&self.buffer.as_ref()[5..][..8]),
            _ => None,
        }
    }

    /// Return the key index, absent in implicit mode.
    pub fn key_index(&self) -> Option<u8> {
        let mode = self.security_control().key_id_mode();
        match mode {
            KeyIdMode::Implicit => None,
            _ => Some(self.buffer.as_ref()[4 + mode.key_identifier_len()]),
        }
    }

    /// Return the key identifier.
    pub fn key_identifier(&self) -> KeyIdentifier {
        match self.security_control().key_id_mode() {
            KeyIdMode::Implicit => KeyIdentifier::Implicit,
            KeyIdMode::Index => KeyIdentifier::Index(self.buffer.as_ref()[5]),
            KeyIdMode::Source4Index => {
                let b = &self.buffer.as_ref()[5..];
                KeyIdentifier::Source4 {
                    source: [b[0], b[1], b[2], b[3]],
                    index: b[4],
                }
            }
            KeyIdMode::Source8Index => {
                let b = &self.buffer.as_ref()[5..];
                let mut source = [0u8; 8];
                source.copy_from_slice(&b[..8]);
                KeyIdentifier::Source8 {
                    source,
                    index: b[8],
                }
            }
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AuxiliarySecurityHeader<T> {
    /// Set the Security Control field.
    pub fn set_security_control(&mut self, level: SecurityLevel, key_id_mode: KeyIdMode) {
        self.buffer.as_mut()[0] = SecurityControl::encode(level, key_id_mode);
    }

    /// Set the frame counter.
    pub fn set_frame_counter(&mut self, frame_counter: u32) {
        self.buffer.as_mut()[1..][..4].copy_from_slice(&frame_counter.to_le_bytes());
    }

    /// Set the key identifier. The security control must already carry the
    /// matching key identifier mode.
    pub fn set_key_identifier(&mut self, key_identifier: &KeyIdentifier) {
        let b = &mut self.buffer.as_mut()[5..];
        match key_identifier {
            KeyIdentifier::Implicit => {}
            KeyIdentifier::Index(index) => b[0] = *index,
            KeyIdentifier::Source4 { source, index } => {
                b[..4].copy_from_slice(source);
                b[4] = *index;
            }
            KeyIdentifier::Source8 { source, index } => {
                b[..8].copy_from_slice(source);
                b[8] = *index;
            }
        }
    }
}

/// The Key Identifier field.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum KeyIdentifier {
    /// No key identifier.
    Implicit,
    /// Key index only.
    Index(u8),
    /// 4-octet key source and key index.
    Source4 {
        /// Key source.
        source: [u8; 4],
        /// Key index.
        index: u8,
    },
    /// 8-octet key source and key index.
    Source8 {
        /// Key source.
        source: [u8; 8],
        /// Key index.
        index: u8,
    },
}

impl KeyIdentifier {
    /// Return the matching [`KeyIdMode`].
    pub fn mode(&self) -> KeyIdMode {
        match self {
            Self::Implicit => KeyIdMode::Implicit,
            Self::Index(_) => KeyIdMode::Index,
            Self::Source4 { .. } => KeyIdMode::Source4Index,
            Self::Source8 { .. } => KeyIdMode::Source8Index,
        }
    }

    /// Return the key index, if any.
    pub fn index(&self) -> Option<u8> {
        match self {
            Self::Implicit => None,
            Self::Index(index) => Some(*index),
            Self::Source4 { index, .. } | Self::Source8 { index, .. } => Some(*index),
        }
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for AuxiliarySecurityHeader<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Auxiliary Security Header")?;
        writeln!(
            f,
            "  security level: {:?}",
            self.security_control().security_level()
        )?;
        writeln!(
            f,
            "  key id mode: {:?}",
            self.security_control().key_id_mode()
        )?;
        writeln!(f, "  frame counter: {}", self.frame_counter())?;
        if let Some(index) = self.key_index() {
            writeln!(f, "  key index: {}", index)?;
        }
        Ok(())
    }
}
