//! Readers and writers for the MAC payload of (non-enhanced) beacon frames.
#![allow(missing_docs)]

use thread15d4_macros::frame;

use crate::{Error, Result};

#[frame]
#[derive(Debug)]
/// A reader/writer for the Superframe Specification field.
pub struct SuperframeSpecification {
    /// Return the beacon order field value.
    #[bits(4)]
    beacon_order: u8,
    /// Return the superframe order field value.
    #[bits(4)]
    superframe_order: u8,
    /// Return the final cap slot field value.
    #[bits(4)]
    final_cap_slot: u8,
    /// Return the battery life extension field value.
    #[bits(1)]
    battery_life_extension: bool,
    #[bits(1)]
    _reserved: bool,
    /// Return the PAN coordinator field value.
    #[bits(1)]
    pan_coordinator: bool,
    /// Return the association permit field value.
    #[bits(1)]
    association_permit: bool,
}

/// A reader for the MAC payload of a beacon frame: superframe
/// specification, GTS and pending address fields, then the beacon payload.
pub struct BeaconPayload<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> BeaconPayload<T> {
    /// Create a new reader, checking the variable length fields.
    pub fn new(buffer: T) -> Result<Self> {
        let beacon = Self::new_unchecked(buffer);

        if !beacon.check_len() {
            return Err(Error);
        }

        Ok(beacon)
    }

    fn check_len(&self) -> bool {
        let b = self.buffer.as_ref();
        if b.len() < 4 {
            return false;
        }
        b.len() >= self.header_len()
    }

    /// Create a new reader without checking the length.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return the superframe specification.
    pub fn superframe_specification(&self) -> SuperframeSpecification<&'_ [u8]> {
        SuperframeSpecification::new_unchecked(&self.buffer.as_ref()[..2])
    }

    /// Number of GTS descriptors.
    pub fn gts_count(&self) -> usize {
        (self.buffer.as_ref()[2] & 0b111) as usize
    }

    fn gts_len(&self) -> usize {
        match self.gts_count() {
            0 => 1,
            n => 1 + 1 + 3 * n,
        }
    }

    fn pending_len(&self) -> usize {
        let spec = self.buffer.as_ref()[2 + self.gts_len()];
        let short = (spec & 0b111) as usize;
        let extended = ((spec >> 4) & 0b111) as usize;
        1 + short * 2 + extended * 8
    }

    fn header_len(&self) -> usize {
        let b = self.buffer.as_ref();
        let gts = self.gts_len();
        if b.len() < 2 + gts + 1 {
            return usize::MAX;
        }
        2 + gts + self.pending_len()
    }

    /// Return the beacon payload carried after the MAC beacon fields.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len()..]
    }
}

/// Write a beacon MAC payload without GTS or pending addresses, followed by
/// `payload`. Returns the number of bytes written.
pub fn emit_beacon(
    buffer: &mut [u8],
    association_permit: bool,
    pan_coordinator: bool,
    payload: &[u8],
) -> Result<usize> {
    let len = 4 + payload.len();
    if buffer.len() < len {
        return Err(Error);
    }

    buffer[..4].fill(0);
    let mut spec = SuperframeSpecification::new_unchecked(&mut buffer[..2]);
    spec.set_beacon_order(15);
    spec.set_superframe_order(15);
    spec.set_final_cap_slot(15);
    spec.set_pan_coordinator(pan_coordinator);
    spec.set_association_permit(association_permit);
    buffer[4..len].copy_from_slice(payload);

    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superframe_specification() {
        let spec = SuperframeSpecification::new(&[0xff, 0xcf][..]).unwrap();
        assert_eq!(spec.beacon_order(), 15);
        assert_eq!(spec.superframe_order(), 15);
        assert_eq!(spec.final_cap_slot(), 15);
        assert!(!spec.battery_life_extension());
        assert!(spec.pan_coordinator());
        assert!(spec.association_permit());
    }

    #[test]
    fn beacon_payload() {
        let mut buffer = [0u8; 16];
        let len = emit_beacon(&mut buffer, true, false, &[0x03, 0x21]).unwrap();
        assert_eq!(&buffer[..len], &[0xff, 0x8f, 0x00, 0x00, 0x03, 0x21]);

        let beacon = BeaconPayload::new(&buffer[..len]).unwrap();
        assert!(beacon.superframe_specification().association_permit());
        assert!(!beacon.superframe_specification().pan_coordinator());
        assert_eq!(beacon.gts_count(), 0);
        assert_eq!(beacon.payload(), &[0x03, 0x21]);
    }

    #[test]
    fn pending_addresses_are_skipped() {
        // one short pending address
        let buffer = [0xff, 0x0f, 0x00, 0x01, 0x34, 0x12, 0xaa];
        let beacon = BeaconPayload::new(&buffer[..]).unwrap();
        assert_eq!(beacon.payload(), &[0xaa]);
    }

    #[test]
    fn truncated() {
        assert!(BeaconPayload::new(&[0xff, 0x0f, 0x00][..]).is_err());
        assert!(BeaconPayload::new(&[0xff, 0x0f, 0x00, 0x02, 0x34, 0x12][..]).is_err());
    }
}
