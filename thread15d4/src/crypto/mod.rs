//! Cryptographic primitives: AES-128 ECB, CCM* and HMAC-SHA-256.

mod aes_ecb;
pub use aes_ecb::AesEcb;

mod ccm;
pub use ccm::{CcmStar, NONCE_LEN};

mod hmac_sha256;
pub use hmac_sha256::hmac_sha256;

/// Length of an AES-128 key.
pub const KEY_LEN: usize = 16;

/// An AES-128 key.
pub type Key = [u8; KEY_LEN];
