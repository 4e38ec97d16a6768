use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-128-CTR keystream over the encrypted region of a package.
///
/// The counter for a byte is the package IV plus that byte's block index
/// within the region, so callers always pass the absolute region offset.
/// Calls may be split at arbitrary boundaries, start mid-block, or jump
/// backwards for out-of-order peeks; the keystream depends only on the
/// offset.
pub struct PkgCipher {
    cipher: Aes128,
    iv: u128,
}

impl PkgCipher {
    /// Creates a cipher from the derived package key and the header IV.
    #[must_use]
    pub fn new(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(&(*key).into()),
            iv: u128::from_be_bytes(*iv),
        }
    }

    /// Decrypts `buf` in place as if it started `offset` bytes into the
    /// encrypted region.
    pub fn decrypt_at(&self, offset: u64, buf: &mut [u8]) {
        let mut counter = self
            .iv
            .wrapping_add(u128::from(offset / AES_BLOCK_SIZE as u64));
        let mut skip = (offset % AES_BLOCK_SIZE as u64) as usize;
        let mut pos = 0;

        while pos < buf.len() {
            let mut block: aes::Block = counter.to_be_bytes().into();
            self.cipher.encrypt_block(&mut block);

            let take = (AES_BLOCK_SIZE - skip).min(buf.len() - pos);
            for (out, key) in buf[pos..pos + take].iter_mut().zip(&block[skip..]) {
                *out ^= key;
            }

            pos += take;
            skip = 0;
            counter = counter.wrapping_add(1);
        }
    }

    /// CTR encryption and decryption are the same keystream XOR.
    pub fn encrypt_at(&self, offset: u64, buf: &mut [u8]) {
        self.decrypt_at(offset, buf);
    }
}
