//! Radio abstraction.
//!
//! The platform owns the transceiver; the stack only configures it and hands
//! it complete frames (without FCS). Received frames are delivered through
//! [`Instance::signal_frame_received`](crate::Instance::signal_frame_received).

use crate::frame::ExtAddress;

/// First 2.4 GHz O-QPSK channel.
pub const MIN_CHANNEL: u8 = 11;
/// Last 2.4 GHz O-QPSK channel.
pub const MAX_CHANNEL: u8 = 26;

/// Reason a transmission did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// The channel was busy after all CSMA-CA backoffs.
    CcaFailed,
    /// No acknowledgment was received after all retries.
    AckFailed,
}

pub trait Radio {
    /// Return the factory assigned IEEE EUI-64 of the radio.
    fn ieee_eui64(&self) -> ExtAddress;

    fn set_pan_id(&mut self, pan_id: u16);

    fn set_short_address(&mut self, short_address: u16);

    fn set_extended_address(&mut self, address: &ExtAddress);

    /// Tune to `channel`, always within `11..=26`.
    fn set_channel(&mut self, channel: u8);

    /// Transmit a frame (FCS excluded), performing CSMA-CA and, when the
    /// frame requests it, waiting for the acknowledgment.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TxError>;

    /// Return the peak RSSI (dBm) observed on `channel` during
    /// `duration_ms`.
    fn energy_scan(&mut self, channel: u8, duration_ms: u16) -> i8;
}

/// Check that `channel` is a valid 2.4 GHz channel.
pub const fn is_valid_channel(channel: u8) -> bool {
    channel >= MIN_CHANNEL && channel <= MAX_CHANNEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_bounds() {
        assert!(!is_valid_channel(10));
        assert!(is_valid_channel(11));
        assert!(is_valid_channel(26));
        assert!(!is_valid_channel(27));
    }
}
