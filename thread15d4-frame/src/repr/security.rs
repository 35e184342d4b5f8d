use crate::{AuxiliarySecurityHeader, Error, KeyIdentifier, Result, SecurityLevel};

/// A high-level representation of the Auxiliary Security Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct AuxSecurityHeaderRepr {
    /// Security level.
    pub security_level: SecurityLevel,
    /// Key identifier (mode, key source and key index).
    pub key_identifier: KeyIdentifier,
    /// Frame counter.
    pub frame_counter: u32,
}

impl AuxSecurityHeaderRepr {
    /// Parse an Auxiliary Security Header.
    pub fn parse(header: AuxiliarySecurityHeader<&'_ [u8]>) -> Result<Self> {
        let security_level = header.security_control().security_level();
        if security_level == SecurityLevel::None {
            return Err(Error);
        }

        Ok(Self {
            security_level,
            key_identifier: header.key_identifier(),
            frame_counter: header.frame_counter(),
        })
    }

    /// Return the length of the header when emitted.
    pub fn buffer_len(&self) -> usize {
        1 + 4 + self.key_identifier.mode().key_identifier_len()
    }

    /// Emit the header.
    pub fn emit(&self, header: &mut AuxiliarySecurityHeader<&'_ mut [u8]>) {
        header.set_security_control(self.security_level, self.key_identifier.mode());
        header.set_frame_counter(self.frame_counter);
        header.set_key_identifier(&self.key_identifier);
    }
}
