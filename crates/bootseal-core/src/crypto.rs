//! Block cipher helpers shared by the bundle and readback formats
//!
//! Both formats are built from AES-256 alone:
//!
//! - **CFB-128** for confidentiality. Length preserving; a trailing partial
//!   block uses a prefix of the final keystream block.
//! - **CBC chain tag** for integrity. The input is zero-padded to a block
//!   multiple, CBC-encrypted under a zero IV and the last ciphertext block
//!   is the tag.
//!
//! # Security caveat
//!
//! The CBC chain tag is *not* a standards-compliant MAC. Plain CBC-MAC is
//! only sound for fixed-length messages and zero padding makes messages
//! that differ only in trailing zeros collide. Every tagged message in this
//! system has a fixed length, and the target bootloader computes exactly
//! this construction, so it is kept bit-for-bit.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// Integrity tag produced by [`cbc_tag`]
pub type Tag = [u8; BLOCK_SIZE];

fn cipher(key: &[u8]) -> Result<Aes256> {
    Aes256::new_from_slice(key).map_err(|_| Error::InvalidKeyLength)
}

fn cfb(key: &[u8], iv: &[u8], data: &mut [u8], decrypt: bool) -> Result<()> {
    let cipher = cipher(key)?;
    let mut register: [u8; BLOCK_SIZE] = iv.try_into().map_err(|_| Error::InvalidKeyLength)?;

    for chunk in data.chunks_mut(BLOCK_SIZE) {
        let mut keystream = Block::clone_from_slice(&register);
        cipher.encrypt_block(&mut keystream);

        let len = chunk.len();
        // The feedback register always takes the ciphertext
        if decrypt {
            register[..len].copy_from_slice(chunk);
        }
        for (byte, k) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= k;
        }
        if !decrypt {
            register[..len].copy_from_slice(chunk);
        }
    }

    Ok(())
}

/// Encrypt `data` in place with AES-256 in CFB-128 mode
pub fn cfb_encrypt(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    cfb(key, iv, data, false)
}

/// Decrypt `data` in place with AES-256 in CFB-128 mode
pub fn cfb_decrypt(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    cfb(key, iv, data, true)
}

/// Compute the CBC chain tag of `data` under `key`
///
/// Empty input yields the all-zero tag.
pub fn cbc_tag(key: &[u8], data: &[u8]) -> Result<Tag> {
    let cipher = cipher(key)?;
    let mut state = Block::default();

    for chunk in data.chunks(BLOCK_SIZE) {
        for (s, b) in state.iter_mut().zip(chunk.iter()) {
            *s ^= b;
        }
        // Bytes past the end of a short chunk are XORed with zero padding
        cipher.encrypt_block(&mut state);
    }

    let mut tag = [0u8; BLOCK_SIZE];
    tag.copy_from_slice(&state);
    Ok(tag)
}

/// Compare two tags, hashes or passwords without leaking where they differ
pub fn ct_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 appendix C.3
    const FIPS_KEY: [u8; 32] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
        0x1e, 0x1f,
    ];
    const FIPS_PT: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];
    const FIPS_CT: [u8; 16] = [
        0x8e, 0xa2, 0xb7, 0xca, 0x51, 0x67, 0x45, 0xbf, 0xea, 0xfc, 0x49, 0x90, 0x4b, 0x49, 0x60,
        0x89,
    ];

    #[test]
    fn test_single_block_tag_is_raw_aes() {
        // One block under a zero IV is just the block cipher
        assert_eq!(cbc_tag(&FIPS_KEY, &FIPS_PT).unwrap(), FIPS_CT);
    }

    #[test]
    fn test_cfb_first_block_keystream() {
        // With IV = P, the first keystream block is E(P)
        let mut data = [0u8; 16];
        cfb_encrypt(&FIPS_KEY, &FIPS_PT, &mut data).unwrap();
        assert_eq!(data, FIPS_CT);
    }

    #[test]
    fn test_cfb_roundtrip_partial_block() {
        let key = [0x42u8; 32];
        let iv = [0x24u8; 16];
        let original: [u8; 37] = core::array::from_fn(|i| i as u8);
        let mut data = original;

        cfb_encrypt(&key, &iv, &mut data).unwrap();
        assert_ne!(data, original);
        cfb_decrypt(&key, &iv, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_tag_zero_pads_short_input() {
        let key = [7u8; 32];
        let short = [1u8, 2, 3];
        let mut padded = [0u8; 16];
        padded[..3].copy_from_slice(&short);
        assert_eq!(cbc_tag(&key, &short).unwrap(), cbc_tag(&key, &padded).unwrap());
    }

    #[test]
    fn test_tag_chains_blocks() {
        let key = [9u8; 32];
        let data = [0xA5u8; 64];
        let first = cbc_tag(&key, &data[..32]).unwrap();
        let full = cbc_tag(&key, &data).unwrap();
        assert_ne!(first, full);
    }

    #[test]
    fn test_bad_key_length() {
        let mut data = [0u8; 4];
        assert_eq!(
            cfb_encrypt(&[0u8; 16], &[0u8; 16], &mut data),
            Err(Error::InvalidKeyLength)
        );
        assert_eq!(cbc_tag(&[0u8; 31], &data), Err(Error::InvalidKeyLength));
    }

    #[test]
    fn test_ct_equal() {
        assert!(ct_equal(&[1, 2, 3], &[1, 2, 3]));
        assert!(!ct_equal(&[1, 2, 3], &[1, 2, 4]));
        assert!(!ct_equal(&[1, 2, 3], &[1, 2]));
    }
}
