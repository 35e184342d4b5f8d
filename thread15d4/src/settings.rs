//! Non-volatile settings.
//!
//! The platform provides a key/value store ([`Settings`]); the stack stores
//! fixed little-endian records in it. [`RamSettings`] keeps everything in
//! memory.

use heapless::Vec;

use crate::frame::ExtAddress;
use crate::mle::{DeviceMode, Role};
use crate::{Error, Result};

/// Settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum SettingsKey {
    ActiveDataset = 1,
    PendingDataset = 2,
    NetworkInfo = 3,
    ParentInfo = 4,
    ChildInfo = 5,
    FrameCounter = 6,
    SrpEcdsaKey = 11,
}

/// A key/value store where each key holds a list of values.
pub trait Settings {
    /// Read the value at `index` of `key` into `buffer` and return its
    /// length. A missing value returns `Ok(None)`.
    fn get(&self, key: SettingsKey, index: usize, buffer: &mut [u8]) -> Result<Option<usize>>;

    /// Replace all values of `key` with `value`.
    fn set(&mut self, key: SettingsKey, value: &[u8]) -> Result<()>;

    /// Append a value to `key`.
    fn add(&mut self, key: SettingsKey, value: &[u8]) -> Result<()>;

    /// Delete the value at `index`, or every value of `key` when `index` is
    /// `None`. Deleting a missing value returns [`Error::NoAddress`].
    fn delete(&mut self, key: SettingsKey, index: Option<usize>) -> Result<()>;

    /// Erase everything.
    fn wipe(&mut self);
}

const MAX_VALUE_LEN: usize = 128;

struct Record {
    key: SettingsKey,
    value: Vec<u8, MAX_VALUE_LEN>,
}

/// In-memory [`Settings`] with room for `N` values.
pub struct RamSettings<const N: usize> {
    records: Vec<Record, N>,
}

impl<const N: usize> Default for RamSettings<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RamSettings<N> {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    fn positions(&self, key: SettingsKey) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.key == key)
            .map(|(i, _)| i)
    }
}

impl<const N: usize> Settings for RamSettings<N> {
    fn get(&self, key: SettingsKey, index: usize, buffer: &mut [u8]) -> Result<Option<usize>> {
        let Some(position) = self.positions(key).nth(index) else {
            return Ok(None);
        };
        let value = &self.records[position].value;
        if buffer.len() < value.len() {
            return Err(Error::NoBufs);
        }
        buffer[..value.len()].copy_from_slice(value);
        Ok(Some(value.len()))
    }

    fn set(&mut self, key: SettingsKey, value: &[u8]) -> Result<()> {
        let value = Vec::from_slice(value).map_err(|_| Error::NoBufs)?;
        let existing = self.positions(key).count();
        if existing == 0 && self.records.is_full() {
            return Err(Error::NoBufs);
        }
        self.records.retain(|r| r.key != key);
        self.records
            .push(Record { key, value })
            .map_err(|_| Error::NoBufs)
    }

    fn add(&mut self, key: SettingsKey, value: &[u8]) -> Result<()> {
        let value = Vec::from_slice(value).map_err(|_| Error::NoBufs)?;
        self.records
            .push(Record { key, value })
            .map_err(|_| Error::NoBufs)
    }

    fn delete(&mut self, key: SettingsKey, index: Option<usize>) -> Result<()> {
        match index {
            Some(index) => {
                let position = self.positions(key).nth(index).ok_or(Error::NoAddress)?;
                self.records.remove(position);
            }
            None => {
                if self.positions(key).next().is_none() {
                    return Err(Error::NoAddress);
                }
                self.records.retain(|r| r.key != key);
            }
        }
        Ok(())
    }

    fn wipe(&mut self) {
        self.records.clear();
    }
}

/// Persisted network identity and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub role: Role,
    pub device_mode: DeviceMode,
    pub rloc16: u16,
    pub key_sequence: u32,
    pub mle_frame_counter: u32,
    pub mac_frame_counter: u32,
    pub mesh_local_iid: [u8; 8],
    pub extended_pan_id: [u8; 8],
    pub network_name: [u8; 16],
}

impl NetworkInfo {
    pub const LEN: usize = 48;

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut b = [0u8; Self::LEN];
        b[0] = self.role as u8;
        b[1] = self.device_mode.bits();
        b[2..4].copy_from_slice(&self.rloc16.to_le_bytes());
        b[4..8].copy_from_slice(&self.key_sequence.to_le_bytes());
        b[8..12].copy_from_slice(&self.mle_frame_counter.to_le_bytes());
        b[12..16].copy_from_slice(&self.mac_frame_counter.to_le_bytes());
        b[16..24].copy_from_slice(&self.mesh_local_iid);
        b[24..32].copy_from_slice(&self.extended_pan_id);
        b[32..48].copy_from_slice(&self.network_name);
        b
    }

    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() != Self::LEN {
            return Err(Error::Parse);
        }
        let u32_at = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        let mut mesh_local_iid = [0u8; 8];
        mesh_local_iid.copy_from_slice(&b[16..24]);
        let mut extended_pan_id = [0u8; 8];
        extended_pan_id.copy_from_slice(&b[24..32]);
        let mut network_name = [0u8; 16];
        network_name.copy_from_slice(&b[32..48]);

        Ok(Self {
            role: Role::from_u8(b[0]).ok_or(Error::Parse)?,
            device_mode: DeviceMode::from_bits(b[1]).ok_or(Error::Parse)?,
            rloc16: u16::from_le_bytes([b[2], b[3]]),
            key_sequence: u32_at(4),
            mle_frame_counter: u32_at(8),
            mac_frame_counter: u32_at(12),
            mesh_local_iid,
            extended_pan_id,
            network_name,
        })
    }
}

/// Frame counters persisted ahead of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounterInfo {
    pub key_sequence: u32,
    pub mac_frame_counter: u32,
    pub mle_frame_counter: u32,
}

impl FrameCounterInfo {
    pub const LEN: usize = 12;

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut b = [0u8; Self::LEN];
        b[0..4].copy_from_slice(&self.key_sequence.to_le_bytes());
        b[4..8].copy_from_slice(&self.mac_frame_counter.to_le_bytes());
        b[8..12].copy_from_slice(&self.mle_frame_counter.to_le_bytes());
        b
    }

    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() != Self::LEN {
            return Err(Error::Parse);
        }
        let u32_at = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        Ok(Self {
            key_sequence: u32_at(0),
            mac_frame_counter: u32_at(4),
            mle_frame_counter: u32_at(8),
        })
    }
}

/// Persisted parent of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentInfo {
    pub ext_address: ExtAddress,
}

impl ParentInfo {
    pub const LEN: usize = 8;

    pub fn emit(&self) -> [u8; Self::LEN] {
        *self.ext_address.as_bytes()
    }

    pub fn parse(b: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = b.try_into().map_err(|_| Error::Parse)?;
        Ok(Self {
            ext_address: ExtAddress::new(bytes),
        })
    }
}

/// Persisted child of a parent, one value per child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildInfo {
    pub ext_address: ExtAddress,
    pub timeout: u32,
    pub rloc16: u16,
    pub mode: DeviceMode,
}

impl ChildInfo {
    pub const LEN: usize = 15;

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut b = [0u8; Self::LEN];
        b[..8].copy_from_slice(self.ext_address.as_bytes());
        b[8..12].copy_from_slice(&self.timeout.to_le_bytes());
        b[12..14].copy_from_slice(&self.rloc16.to_le_bytes());
        b[14] = self.mode.bits();
        b
    }

    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() != Self::LEN {
            return Err(Error::Parse);
        }
        let mut ext = [0u8; 8];
        ext.copy_from_slice(&b[..8]);
        Ok(Self {
            ext_address: ExtAddress::new(ext),
            timeout: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            rloc16: u16::from_le_bytes([b[12], b[13]]),
            mode: DeviceMode::from_bits(b[14]).ok_or(Error::Parse)?,
        })
    }
}
