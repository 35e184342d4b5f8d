//! Zero-copy read and write structures for IEEE 802.15.4-2006 MAC frames as
//! used by Thread.
//!
//! Each reader contains the following functions:
//! - [`new`]: Create a new reader, checking that the buffer holds a complete
//!   structure.
//! - [`new_unchecked`]: Create a new reader without checking the buffer
//!   length.
//!
//! The most important reader is the [`Frame`] reader, which is used to read a
//! full frame (without FCS). It provides:
//! - [`frame_control`]: returns a [`FrameControl`] reader.
//! - [`sequence_number`]: returns the sequence number.
//! - [`addressing`]: returns an [`AddressingFields`] reader.
//! - [`auxiliary_security_header`]: returns an [`AuxiliarySecurityHeader`]
//!   reader when security is enabled.
//! - [`command_id`]: returns the MAC command identifier of command frames.
//! - [`payload`] and [`mic`].
//!
//! ## Reading a frame
//! ```
//! # use thread15d4_frame::{Address, Frame, FrameType};
//! let frame = [
//!     0x41, 0xd8, 0x01, 0xcd, 0xab, 0xff, 0xff, 0xc7, 0xd9, 0xb5, 0x14, 0x00, 0x4b,
//!     0x12, 0x00, 0x2b, 0x00, 0x00, 0x00,
//! ];
//! let frame = Frame::new(&frame[..]).unwrap();
//! assert_eq!(frame.frame_control().frame_type(), FrameType::Data);
//! assert_eq!(frame.addressing().dst_address(), Some(Address::BROADCAST));
//! assert_eq!(frame.payload(), &[0x2b, 0x00, 0x00, 0x00]);
//! ```
//!
//! ## Writing a frame
//! Frames are written through a [`FrameRepr`], usually obtained from a
//! [`FrameBuilder`]:
//! ```
//! # use thread15d4_frame::{Address, ExtAddress, FrameBuilder, Frame};
//! let repr = FrameBuilder::new_data(&[0xaa, 0xbb])
//!     .set_sequence_number(7)
//!     .set_dst_pan_id(0xface)
//!     .set_dst_address(Address::Short(0x0400))
//!     .set_src_address(Address::Short(0x0401))
//!     .set_ack_request(true)
//!     .finalize()
//!     .unwrap();
//!
//! let mut buffer = [0u8; 127];
//! let len = repr.buffer_len();
//! repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));
//! assert_eq!(&buffer[..len], &[0x61, 0x88, 0x07, 0xce, 0xfa, 0x00, 0x04, 0x01, 0x04, 0xaa, 0xbb]);
//! ```
//!
//! [`new`]: Frame::new
//! [`new_unchecked`]: Frame::new_unchecked
//! [`frame_control`]: Frame::frame_control
//! [`sequence_number`]: Frame::sequence_number
//! [`addressing`]: Frame::addressing
//! [`auxiliary_security_header`]: Frame::auxiliary_security_header
//! [`command_id`]: Frame::command_id
//! [`payload`]: Frame::payload
//! [`mic`]: Frame::mic
#![no_std]
#![deny(missing_docs)]
#![deny(unsafe_code)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[cfg(test)]
mod tests;

mod frames;
pub use frames::Frame;
pub use frames::FrameWithFcs;

mod frame_control;
pub use frame_control::*;

mod aux_sec_header;
pub use aux_sec_header::*;

mod addressing;
pub use addressing::*;

mod command;
pub use command::*;

mod beacon;
pub use beacon::*;

mod repr;
pub use repr::*;

/// Largest PSDU accepted by the PHY, FCS included.
pub const MAX_PHY_PACKET_SIZE: usize = 127;

/// Length of the Frame Check Sequence.
pub const FCS_LEN: usize = 2;

/// Largest frame handled by the readers, FCS excluded.
pub const MAX_FRAME_LEN: usize = MAX_PHY_PACKET_SIZE - FCS_LEN;

/// An error that can occur when reading or writing an IEEE 802.15.4 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "malformed IEEE 802.15.4 frame")
    }
}

/// A type alias for `Result<T, frame::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
