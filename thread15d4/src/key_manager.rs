//! Network key management.
//!
//! MAC and MLE keys are derived from the network master key and the key
//! sequence with HMAC-SHA-256 over `key_sequence (big-endian) || "Thread"`:
//! the first 16 bytes of the digest are the MLE key, the last 16 the MAC
//! key. The keys of the previous, current and next key sequence are
//! accepted on reception.

use crate::crypto::{hmac_sha256, Key, KEY_LEN};
use crate::{Error, Result};

const KEY_DERIVATION_STRING: &[u8] = b"Thread";

/// The MLE and MAC keys of one key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySet {
    pub key_sequence: u32,
    pub mle: Key,
    pub mac: Key,
}

impl KeySet {
    /// Derive the key set of `key_sequence` from `master_key`.
    pub fn derive(master_key: &Key, key_sequence: u32) -> Result<Self> {
        let digest = hmac_sha256(
            master_key,
            &[&key_sequence.to_be_bytes(), KEY_DERIVATION_STRING],
        )?;
        let mut mle = [0u8; KEY_LEN];
        let mut mac = [0u8; KEY_LEN];
        mle.copy_from_slice(&digest[..KEY_LEN]);
        mac.copy_from_slice(&digest[KEY_LEN..]);
        Ok(Self {
            key_sequence,
            mle,
            mac,
        })
    }
}

/// Key index carried in frames for a key sequence.
pub const fn key_index(key_sequence: u32) -> u8 {
    ((key_sequence & 0x7f) + 1) as u8
}

/// Master key, key sequence, derived keys and local frame counters.
pub struct KeyManager {
    master_key: Key,
    current: KeySet,
    mac_frame_counter: u32,
    mle_frame_counter: u32,
    stored_mac_frame_counter: u32,
    stored_mle_frame_counter: u32,
}

impl KeyManager {
    pub fn new() -> Self {
        let master_key = [0u8; KEY_LEN];
        let current = KeySet {
            key_sequence: 0,
            mle: [0; KEY_LEN],
            mac: [0; KEY_LEN],
        };
        let mut manager = Self {
            master_key,
            current,
            mac_frame_counter: 0,
            mle_frame_counter: 0,
            stored_mac_frame_counter: 0,
            stored_mle_frame_counter: 0,
        };
        // Cannot fail: HMAC accepts keys of any length.
        if let Ok(keys) = KeySet::derive(&master_key, 0) {
            manager.current = keys;
        }
        manager
    }

    pub fn master_key(&self) -> &Key {
        &self.master_key
    }

    /// Set the master key. Shorter keys are zero padded; keys longer than 16
    /// bytes are rejected. The frame counters restart from zero.
    pub fn set_master_key(&mut self, key: &[u8]) -> Result<()> {
        if key.len() > KEY_LEN {
            return Err(Error::InvalidArgs);
        }
        let mut master_key = [0u8; KEY_LEN];
        master_key[..key.len()].copy_from_slice(key);

        let current = KeySet::derive(&master_key, self.current.key_sequence)?;
        self.master_key = master_key;
        self.current = current;
        self.reset_frame_counters();
        Ok(())
    }

    pub fn key_sequence(&self) -> u32 {
        self.current.key_sequence
    }

    /// Switch to `key_sequence`, recomputing the keys and restarting the
    /// local frame counters.
    pub fn set_key_sequence(&mut self, key_sequence: u32) -> Result<()> {
        if key_sequence == self.current.key_sequence {
            return Ok(());
        }
        self.current = KeySet::derive(&self.master_key, key_sequence)?;
        self.reset_frame_counters();
        Ok(())
    }

    fn reset_frame_counters(&mut self) {
        self.mac_frame_counter = 0;
        self.mle_frame_counter = 0;
        self.stored_mac_frame_counter = 0;
        self.stored_mle_frame_counter = 0;
    }

    pub fn current_keys(&self) -> &KeySet {
        &self.current
    }

    /// Return the keys of `key_sequence`, derived on demand when it is not
    /// the current one.
    pub fn keys(&self, key_sequence: u32) -> Result<KeySet> {
        if key_sequence == self.current.key_sequence {
            Ok(self.current)
        } else {
            KeySet::derive(&self.master_key, key_sequence)
        }
    }

    /// Map a received key index to the previous, current or next key
    /// sequence.
    pub fn key_sequence_for_index(&self, index: u8) -> Option<u32> {
        let current = self.current.key_sequence;
        [current, current.wrapping_sub(1), current.wrapping_add(1)]
            .into_iter()
            .find(|seq| key_index(*seq) == index)
    }

    /// Check that a received key sequence is within one of the current one.
    pub fn is_acceptable(&self, key_sequence: u32) -> bool {
        let current = self.current.key_sequence;
        key_sequence == current
            || key_sequence == current.wrapping_sub(1)
            || key_sequence == current.wrapping_add(1)
    }

    pub fn mac_frame_counter(&self) -> u32 {
        self.mac_frame_counter
    }

    pub fn mle_frame_counter(&self) -> u32 {
        self.mle_frame_counter
    }

    /// Return the MAC frame counter to use and advance it.
    pub fn next_mac_frame_counter(&mut self) -> u32 {
        let fc = self.mac_frame_counter;
        self.mac_frame_counter = self.mac_frame_counter.saturating_add(1);
        fc
    }

    /// Return the MLE frame counter to use and advance it.
    pub fn next_mle_frame_counter(&mut self) -> u32 {
        let fc = self.mle_frame_counter;
        self.mle_frame_counter = self.mle_frame_counter.saturating_add(1);
        fc
    }

    /// Return `true` when a frame counter reached its persisted value and
    /// the counters must be stored again.
    pub fn needs_store(&self) -> bool {
        self.mac_frame_counter >= self.stored_mac_frame_counter
            || self.mle_frame_counter >= self.stored_mle_frame_counter
    }

    /// Compute the counters to persist, `ahead` above the current values,
    /// and remember them as stored. Returns `(mac, mle)`.
    pub fn frame_counters_to_store(&mut self, ahead: u32) -> (u32, u32) {
        self.stored_mac_frame_counter = self.mac_frame_counter.saturating_add(ahead);
        self.stored_mle_frame_counter = self.mle_frame_counter.saturating_add(ahead);
        (self.stored_mac_frame_counter, self.stored_mle_frame_counter)
    }

    /// Restore persisted state: the counters resume from the stored values,
    /// which are never below anything sent before the restart.
    pub fn restore(&mut self, key_sequence: u32, mac_frame_counter: u32, mle_frame_counter: u32) -> Result<()> {
        self.current = KeySet::derive(&self.master_key, key_sequence)?;
        self.mac_frame_counter = mac_frame_counter;
        self.mle_frame_counter = mle_frame_counter;
        self.stored_mac_frame_counter = mac_frame_counter;
        self.stored_mle_frame_counter = mle_frame_counter;
        Ok(())
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> std::vec::Vec<u8> {
        hex::decode("00112233445566778899aabbccddeeff").unwrap()
    }

    #[test]
    fn derivation() {
        let mut keys = KeyManager::new();
        keys.set_master_key(&master()).unwrap();
        assert_eq!(
            hex::encode(keys.current_keys().mle),
            "5445f4158fd75912175809f8b57a66a4"
        );
        assert_eq!(
            hex::encode(keys.current_keys().mac),
            "de89c53af382b421e0fde5a9bae3bef0"
        );

        let next = keys.keys(1).unwrap();
        assert_eq!(hex::encode(next.mle), "8f4cd1a27d95c07d12db8974bd615c13");
        assert_eq!(hex::encode(next.mac), "9be0d1af7bd87350deabcdd07febb9d5");
    }

    #[test]
    fn master_key_length() {
        let mut keys = KeyManager::new();
        assert_eq!(keys.set_master_key(&[0u8; 17]), Err(Error::InvalidArgs));
        keys.set_master_key(&[0x42; 4]).unwrap();
        assert_eq!(&keys.master_key()[..5], &[0x42, 0x42, 0x42, 0x42, 0]);
    }

    #[test]
    fn rotation_resets_counters() {
        let mut keys = KeyManager::new();
        keys.set_master_key(&master()).unwrap();
        assert_eq!(keys.next_mac_frame_counter(), 0);
        assert_eq!(keys.next_mac_frame_counter(), 1);
        assert_eq!(keys.next_mle_frame_counter(), 0);

        keys.set_key_sequence(1).unwrap();
        assert_eq!(keys.key_sequence(), 1);
        assert_eq!(keys.mac_frame_counter(), 0);
        assert_eq!(keys.mle_frame_counter(), 0);
        assert_eq!(keys.current_keys(), &keys.keys(1).unwrap());
    }

    #[test]
    fn key_index_mapping() {
        let mut keys = KeyManager::new();
        keys.set_key_sequence(0x80).unwrap();
        assert_eq!(key_index(0x80), 1);
        assert_eq!(keys.key_sequence_for_index(1), Some(0x80));
        assert_eq!(keys.key_sequence_for_index(0x80), Some(0x7f));
        assert_eq!(keys.key_sequence_for_index(2), Some(0x81));
        assert_eq!(keys.key_sequence_for_index(5), None);
        assert!(keys.is_acceptable(0x81));
        assert!(!keys.is_acceptable(0x82));
    }

    #[test]
    fn store_ahead() {
        let mut keys = KeyManager::new();
        assert!(keys.needs_store());
        assert_eq!(keys.frame_counters_to_store(1000), (1000, 1000));
        assert!(!keys.needs_store());

        keys.restore(0, 1000, 1000).unwrap();
        assert_eq!(keys.next_mac_frame_counter(), 1000);
        assert!(keys.needs_store());
    }
}
