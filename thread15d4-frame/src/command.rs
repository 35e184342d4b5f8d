//! MAC command frame identifiers and payload readers.
#![allow(missing_docs)]

use bitflags::bitflags;
use thread15d4_macros::frame;

use crate::{Error, Result};

/// MAC command frame identifier.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum CommandId {
    AssociationRequest = 0x01,
    AssociationResponse = 0x02,
    DisassociationNotification = 0x03,
    DataRequest = 0x04,
    PanIdConflictNotification = 0x05,
    OrphanNotification = 0x06,
    BeaconRequest = 0x07,
    CoordinatorRealignment = 0x08,
    GtsRequest = 0x09,
    Unknown,
}

impl From<u8> for CommandId {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::AssociationRequest,
            0x02 => Self::AssociationResponse,
            0x03 => Self::DisassociationNotification,
            0x04 => Self::DataRequest,
            0x05 => Self::PanIdConflictNotification,
            0x06 => Self::OrphanNotification,
            0x07 => Self::BeaconRequest,
            0x08 => Self::CoordinatorRealignment,
            0x09 => Self::GtsRequest,
            _ => Self::Unknown,
        }
    }
}

bitflags! {
    /// Capability Information field of an Association Request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityInformation: u8 {
        const ALTERNATE_PAN_COORDINATOR = 0b0000_0001;
        const FULL_FUNCTION_DEVICE = 0b0000_0010;
        const MAINS_POWERED = 0b0000_0100;
        const RX_ON_WHEN_IDLE = 0b0000_1000;
        const SECURITY_CAPABLE = 0b0100_0000;
        const ALLOCATE_ADDRESS = 0b1000_0000;
    }
}

/// Association status carried by an Association Response.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AssociationStatus {
    Successful,
    PanAtCapacity,
    PanAccessDenied,
    Unknown(u8),
}

impl From<u8> for AssociationStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Successful,
            0x01 => Self::PanAtCapacity,
            0x02 => Self::PanAccessDenied,
            v => Self::Unknown(v),
        }
    }
}

#[frame]
#[derive(Debug)]
/// Payload of an Association Request command.
pub struct AssociationRequest {
    /// Raw capability information.
    capability_information: u8,
}

impl<T: AsRef<[u8]>> AssociationRequest<T> {
    /// Return the parsed capability information.
    pub fn capabilities(&self) -> CapabilityInformation {
        CapabilityInformation::from_bits_retain(self.capability_information())
    }
}

#[frame]
#[derive(Debug)]
/// Payload of an Association Response command.
pub struct AssociationResponse {
    /// Short address allocated to the device.
    short_address: u16,
    /// Association status.
    #[into(AssociationStatus)]
    status: u8,
}

#[frame]
#[derive(Debug)]
/// Payload of a Disassociation Notification command.
pub struct Disassociation {
    /// Disassociation reason.
    reason: u8,
}

#[frame]
#[derive(Debug)]
/// Payload of a Coordinator Realignment command.
pub struct CoordinatorRealignment {
    /// PAN identifier of the coordinator.
    pan_id: u16,
    /// Short address of the coordinator.
    coordinator_short_address: u16,
    /// Logical channel.
    channel: u8,
    /// Short address of the recipient, `0xffff` when broadcast.
    short_address: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids() {
        assert_eq!(CommandId::from(0x04), CommandId::DataRequest);
        assert_eq!(CommandId::from(0x07), CommandId::BeaconRequest);
        assert_eq!(CommandId::from(0x42), CommandId::Unknown);
    }

    #[test]
    fn association_response() {
        let payload = [0x01, 0x04, 0x00];
        let response = AssociationResponse::new(&payload[..]).unwrap();
        assert_eq!(response.short_address(), 0x0401);
        assert_eq!(response.status(), AssociationStatus::Successful);
        assert!(AssociationResponse::new(&payload[..2]).is_err());
    }

    #[test]
    fn capabilities() {
        let request = AssociationRequest::new(&[0x8e][..]).unwrap();
        let caps = request.capabilities();
        assert!(caps.contains(CapabilityInformation::FULL_FUNCTION_DEVICE));
        assert!(caps.contains(CapabilityInformation::RX_ON_WHEN_IDLE));
        assert!(caps.contains(CapabilityInformation::ALLOCATE_ADDRESS));
        assert!(!caps.contains(CapabilityInformation::SECURITY_CAPABLE));
    }

    #[test]
    fn coordinator_realignment() {
        let mut payload = [0u8; 7];
        let mut realign = CoordinatorRealignment::new_unchecked(&mut payload[..]);
        realign.set_pan_id(0xface);
        realign.set_coordinator_short_address(0x0000);
        realign.set_channel(15);
        realign.set_short_address(0xffff);
        assert_eq!(payload, [0xce, 0xfa, 0x00, 0x00, 0x0f, 0xff, 0xff]);
        assert_eq!(CoordinatorRealignment::<&[u8]>::size(), 7);
    }
}
