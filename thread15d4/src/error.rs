//! Error type shared by the whole stack.

use crate::frame;

/// An error returned by the Thread core.
///
/// The discriminants are the numeric codes exchanged with a host; success
/// (code 0) is represented by `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Error {
    /// Generic failure (code 1), also returned for operations that are not
    /// valid in the current state.
    Failed = 1,
    /// The message was dropped.
    Drop = 2,
    /// Insufficient buffers.
    NoBufs = 3,
    /// No route is available.
    NoRoute = 4,
    /// The service is busy or the item is already queued.
    Busy = 5,
    /// Failed to parse a message.
    Parse = 6,
    /// Invalid arguments.
    InvalidArgs = 7,
    /// Security checks failed.
    Security = 8,
    /// Address query pending.
    LeaseQuery = 9,
    /// No address or entry found.
    NoAddress = 10,
    /// The radio is not receiving.
    NotReceiving = 11,
    /// The operation was aborted.
    Abort = 12,
}

impl Error {
    /// Return the numeric code of this error.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Convert a numeric code back into an error. Code 0 (success) and
    /// unknown codes return `None`.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Failed,
            2 => Self::Drop,
            3 => Self::NoBufs,
            4 => Self::NoRoute,
            5 => Self::Busy,
            6 => Self::Parse,
            7 => Self::InvalidArgs,
            8 => Self::Security,
            9 => Self::LeaseQuery,
            10 => Self::NoAddress,
            11 => Self::NotReceiving,
            12 => Self::Abort,
            _ => return None,
        })
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Failed => "failed",
            Self::Drop => "dropped",
            Self::NoBufs => "insufficient buffers",
            Self::NoRoute => "no route",
            Self::Busy => "busy",
            Self::Parse => "parse error",
            Self::InvalidArgs => "invalid arguments",
            Self::Security => "security check failed",
            Self::LeaseQuery => "address query pending",
            Self::NoAddress => "no address",
            Self::NotReceiving => "not receiving",
            Self::Abort => "aborted",
        };
        write!(f, "{s}")
    }
}

impl From<frame::Error> for Error {
    fn from(_: frame::Error) -> Self {
        Self::Parse
    }
}

/// A type alias for `Result<T, thread15d4::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
