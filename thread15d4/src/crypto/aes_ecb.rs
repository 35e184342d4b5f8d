use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

use super::Key;

/// AES-128 in ECB mode, one block at a time.
#[derive(Clone)]
pub struct AesEcb {
    cipher: Aes128,
}

impl AesEcb {
    pub fn new(key: &Key) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&key[..])),
        }
    }

    /// Encrypt one block in place.
    pub fn encrypt(&self, block: &mut [u8; 16]) {
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(&mut block[..]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fips_197_vector() {
        // FIPS-197 Appendix C.1
        let key: Key = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let mut block: [u8; 16] = hex::decode("00112233445566778899aabbccddeeff")
            .unwrap()
            .try_into()
            .unwrap();
        AesEcb::new(&key).encrypt(&mut block);
        assert_eq!(hex::encode(block), "69c4e0d86a7b0430d8cdb78070b4c55a");
    }
}
