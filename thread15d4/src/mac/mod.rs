//! MAC sublayer state: addresses, sequence numbers, receive filtering and
//! counters. Frame security lives in [`security`], the allow-list in
//! [`allow_list`].

pub mod allow_list;
pub mod beacon;
pub mod security;

use crate::frame::{Address, ExtAddress};

pub use allow_list::{Admission, AllowList};
pub use beacon::{NetworkName, ThreadBeacon};

/// Broadcast PAN identifier.
pub const BROADCAST_PAN_ID: u16 = 0xffff;
/// Broadcast short address.
pub const BROADCAST_ADDRESS: u16 = 0xffff;
/// Short address meaning "use the extended address".
pub const SHORT_ADDRESS_INVALID: u16 = 0xfffe;

/// Noise floor assumed when converting RSSI to link margin.
pub const NOISE_FLOOR: i8 = -100;

/// MAC diagnostic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacCounters {
    pub tx_total: u32,
    pub tx_unicast: u32,
    pub tx_broadcast: u32,
    pub tx_ack_requested: u32,
    pub tx_acked: u32,
    pub tx_data_poll: u32,
    pub tx_beacon: u32,
    pub tx_err_cca: u32,
    pub tx_err_ack: u32,
    pub tx_err_too_long: u32,
    pub rx_total: u32,
    pub rx_unicast: u32,
    pub rx_broadcast: u32,
    pub rx_data_poll: u32,
    pub rx_beacon_request: u32,
    pub rx_other: u32,
    pub rx_err_parse: u32,
    pub rx_err_security: u32,
    pub rx_filtered: u32,
    pub rx_duplicated: u32,
    pub rx_dest_mismatch: u32,
    pub forwarded: u32,
}

/// MAC addressing state.
pub struct Mac {
    pub(crate) ext_address: ExtAddress,
    pub(crate) short_address: u16,
    pub(crate) pan_id: u16,
    pub(crate) channel: u8,
    pub(crate) rx_on_when_idle: bool,
    sequence: u8,
    pub allow_list: AllowList,
    pub counters: MacCounters,
}

impl Mac {
    pub fn new(ext_address: ExtAddress, sequence: u8) -> Self {
        Self {
            ext_address,
            short_address: SHORT_ADDRESS_INVALID,
            pan_id: BROADCAST_PAN_ID,
            channel: crate::radio::MIN_CHANNEL,
            rx_on_when_idle: true,
            sequence,
            allow_list: AllowList::new(),
            counters: MacCounters::default(),
        }
    }

    pub fn ext_address(&self) -> ExtAddress {
        self.ext_address
    }

    pub fn short_address(&self) -> u16 {
        self.short_address
    }

    pub fn pan_id(&self) -> u16 {
        self.pan_id
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    /// Source address to put in outgoing frames.
    pub fn src_address(&self, prefer_extended: bool) -> Address {
        if prefer_extended || self.short_address == SHORT_ADDRESS_INVALID {
            Address::Extended(self.ext_address)
        } else {
            Address::Short(self.short_address)
        }
    }

    /// Check the destination PAN ID and address of a received frame.
    pub fn accepts_destination(&self, dst_pan_id: Option<u16>, dst: Address) -> bool {
        if let Some(pan_id) = dst_pan_id {
            if pan_id != self.pan_id && pan_id != BROADCAST_PAN_ID {
                return false;
            }
        }

        match dst {
            Address::Absent => dst_pan_id.is_none(),
            Address::Short(BROADCAST_ADDRESS) => true,
            Address::Short(short) => {
                short == self.short_address && short != SHORT_ADDRESS_INVALID
            }
            Address::Extended(ext) => ext == self.ext_address,
        }
    }
}

/// Link margin in dB above the noise floor.
pub fn link_margin(rssi: i8) -> u8 {
    (rssi as i16 - NOISE_FLOOR as i16).clamp(0, u8::MAX as i16) as u8
}

/// Link quality (0..=3) from a link margin.
pub fn link_quality(margin: u8) -> u8 {
    match margin {
        m if m > 20 => 3,
        m if m > 10 => 2,
        m if m > 2 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_filter() {
        let mut mac = Mac::new(ExtAddress::new([1, 2, 3, 4, 5, 6, 7, 8]), 0);
        mac.pan_id = 0xface;

        assert!(mac.accepts_destination(Some(0xface), Address::BROADCAST));
        assert!(mac.accepts_destination(Some(0xffff), Address::BROADCAST));
        assert!(!mac.accepts_destination(Some(0xbeef), Address::BROADCAST));
        assert!(mac.accepts_destination(Some(0xface), Address::Extended(mac.ext_address)));
        assert!(!mac.accepts_destination(Some(0xface), Address::Short(0xfffe)));

        mac.short_address = 0x0400;
        assert!(mac.accepts_destination(Some(0xface), Address::Short(0x0400)));
        assert!(!mac.accepts_destination(Some(0xface), Address::Short(0x0401)));
    }

    #[test]
    fn sequence_wraps() {
        let mut mac = Mac::new(ExtAddress::default(), 0xff);
        assert_eq!(mac.next_sequence(), 0xff);
        assert_eq!(mac.next_sequence(), 0);
    }

    #[test]
    fn link_quality_from_rssi() {
        assert_eq!(link_margin(-50), 50);
        assert_eq!(link_margin(-120), 0);
        assert_eq!(link_quality(link_margin(-50)), 3);
        assert_eq!(link_quality(link_margin(-85)), 2);
        assert_eq!(link_quality(link_margin(-95)), 1);
        assert_eq!(link_quality(link_margin(-98)), 0);
        assert_eq!(link_quality(21), 3);
        assert_eq!(link_quality(20), 2);
    }

    #[test]
    fn source_address() {
        let mut mac = Mac::new(ExtAddress::new([1; 8]), 0);
        assert_eq!(mac.src_address(false), Address::Extended(ExtAddress::new([1; 8])));
        mac.short_address = 0x0800;
        assert_eq!(mac.src_address(false), Address::Short(0x0800));
        assert_eq!(mac.src_address(true), Address::Extended(ExtAddress::new([1; 8])));
    }
}
