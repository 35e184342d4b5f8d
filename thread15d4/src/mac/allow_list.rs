//! Extended address allow-list.
//!
//! When enabled, only frames whose source extended address is listed reach
//! the upper layers. An entry may carry a fixed RSSI which replaces the
//! radio-reported value when computing link quality.

use crate::config::ALLOW_LIST_SIZE;
use crate::frame::ExtAddress;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    address: ExtAddress,
    rssi: Option<i8>,
}

/// Outcome of checking a source address against the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Accept the frame, optionally overriding its RSSI.
    Accept(Option<i8>),
    Reject,
}

pub struct AllowList {
    enabled: bool,
    entries: [Option<Entry>; ALLOW_LIST_SIZE],
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowList {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            entries: [None; ALLOW_LIST_SIZE],
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn capacity(&self) -> usize {
        ALLOW_LIST_SIZE
    }

    /// Add `address` and return its entry index. Adding a listed address
    /// returns the existing entry.
    pub fn add(&mut self, address: ExtAddress) -> Result<usize> {
        if let Some(index) = self.find(&address) {
            return Ok(index);
        }

        let (index, slot) = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.is_none())
            .ok_or(Error::NoBufs)?;
        *slot = Some(Entry { address, rssi: None });
        Ok(index)
    }

    pub fn remove(&mut self, address: &ExtAddress) -> Result<()> {
        let index = self.find(address).ok_or(Error::InvalidArgs)?;
        self.entries[index] = None;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries = [None; ALLOW_LIST_SIZE];
    }

    /// Return the entry index of `address`.
    pub fn find(&self, address: &ExtAddress) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Some(e) if e.address == *address))
    }

    pub fn address(&self, index: usize) -> Option<ExtAddress> {
        self.entries.get(index).copied().flatten().map(|e| e.address)
    }

    /// Return the fixed RSSI of an entry.
    pub fn rssi(&self, index: usize) -> Result<Option<i8>> {
        self.entry(index).map(|e| e.rssi)
    }

    pub fn set_rssi(&mut self, index: usize, rssi: i8) -> Result<()> {
        self.entry_mut(index)?.rssi = Some(rssi);
        Ok(())
    }

    pub fn clear_rssi(&mut self, index: usize) -> Result<()> {
        self.entry_mut(index)?.rssi = None;
        Ok(())
    }

    /// Iterate over the listed addresses in entry order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, ExtAddress, Option<i8>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|e| (i, e.address, e.rssi)))
    }

    /// Check a frame source. Frames without a known extended source are
    /// rejected while the list is enabled.
    pub fn admit(&self, source: Option<&ExtAddress>) -> Admission {
        if !self.enabled {
            return Admission::Accept(None);
        }

        match source.and_then(|s| self.find(s)) {
            Some(index) => Admission::Accept(self.entries[index].and_then(|e| e.rssi)),
            None => Admission::Reject,
        }
    }

    fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries
            .get(index)
            .and_then(|e| e.as_ref())
            .ok_or(Error::InvalidArgs)
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut Entry> {
        self.entries
            .get_mut(index)
            .and_then(|e| e.as_mut())
            .ok_or(Error::InvalidArgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> ExtAddress {
        ExtAddress::new([0x12, 0x34, 0, 0, 0, 0, 0, n])
    }

    #[test]
    fn disabled_accepts_everything() {
        let list = AllowList::new();
        assert_eq!(list.admit(Some(&addr(1))), Admission::Accept(None));
        assert_eq!(list.admit(None), Admission::Accept(None));
    }

    #[test]
    fn enabled_filters() {
        let mut list = AllowList::new();
        let index = list.add(addr(1)).unwrap();
        assert_eq!(list.add(addr(1)), Ok(index));
        list.enable();

        assert_eq!(list.admit(Some(&addr(1))), Admission::Accept(None));
        assert_eq!(list.admit(Some(&addr(2))), Admission::Reject);
        assert_eq!(list.admit(None), Admission::Reject);

        list.set_rssi(index, -40).unwrap();
        assert_eq!(list.admit(Some(&addr(1))), Admission::Accept(Some(-40)));
        assert_eq!(list.rssi(index), Ok(Some(-40)));
        list.clear_rssi(index).unwrap();
        assert_eq!(list.rssi(index), Ok(None));

        list.remove(&addr(1)).unwrap();
        assert_eq!(list.remove(&addr(1)), Err(Error::InvalidArgs));
        assert_eq!(list.admit(Some(&addr(1))), Admission::Reject);
        assert_eq!(list.set_rssi(index, 0), Err(Error::InvalidArgs));
    }

    #[test]
    fn capacity() {
        let mut list = AllowList::new();
        for n in 0..32 {
            assert_eq!(list.add(addr(n)), Ok(n as usize));
        }
        assert_eq!(list.add(addr(32)), Err(Error::NoBufs));

        list.remove(&addr(7)).unwrap();
        assert_eq!(list.add(addr(32)), Ok(7));
        assert_eq!(list.address(7), Some(addr(32)));
        assert_eq!(list.iter().count(), 32);

        list.clear();
        assert_eq!(list.iter().count(), 0);
    }
}
