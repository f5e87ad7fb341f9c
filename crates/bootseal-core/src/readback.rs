//! Authenticated readback request framing
//!
//! A request is the readback password followed by the start address and
//! byte count (both big-endian `u32`), encrypted with `RB_KEY` / `RB_IV` and
//! followed by a tag over the ciphertext under `RBH_KEY`:
//!
//! ```text
//! +------------------------------------------+---------------+
//! | CFB( RB_PW[24] | start BE | count BE )   | tag (RBH_KEY) |
//! +------------------------------------------+---------------+
//!   32 bytes                                   16 bytes
//! ```
//!
//! The target answers with `count` bytes of memory encrypted under the same
//! key and IV.

use zeroize::Zeroizing;

use crate::crypto::{self, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::secrets::{KeyName, SecretKeySet};

const PASSWORD_SIZE: usize = 24;

/// Size of the plaintext request body
pub const BODY_SIZE: usize = PASSWORD_SIZE + 4 + 4;

/// Size of a sealed request on the wire
pub const REQUEST_SIZE: usize = BODY_SIZE + BLOCK_SIZE;

/// A range of target memory to read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackRequest {
    /// First address to read
    pub start: u32,
    /// Number of bytes to read
    pub count: u32,
}

impl ReadbackRequest {
    /// Create a request for `count` bytes starting at `start`
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// One past the last address requested, if it does not overflow
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.count)
    }

    /// Encrypt and tag the request for transmission
    pub fn seal(&self, keys: &SecretKeySet) -> Result<[u8; REQUEST_SIZE]> {
        let mut body = Zeroizing::new([0u8; BODY_SIZE]);
        body[..PASSWORD_SIZE].copy_from_slice(keys.get(KeyName::RbPw));
        body[PASSWORD_SIZE..PASSWORD_SIZE + 4].copy_from_slice(&self.start.to_be_bytes());
        body[PASSWORD_SIZE + 4..].copy_from_slice(&self.count.to_be_bytes());

        crypto::cfb_encrypt(keys.get(KeyName::RbKey), keys.get(KeyName::RbIv), &mut body[..])?;
        let tag = crypto::cbc_tag(keys.get(KeyName::RbhKey), &body[..])?;

        let mut sealed = [0u8; REQUEST_SIZE];
        sealed[..BODY_SIZE].copy_from_slice(&body[..]);
        sealed[BODY_SIZE..].copy_from_slice(&tag);
        Ok(sealed)
    }

    /// Check and decrypt a sealed request, as the target does
    ///
    /// The tag is checked before anything is decrypted. A wrong size, tag
    /// or password all yield [`Error::ReadbackRejected`].
    pub fn unseal(sealed: &[u8], keys: &SecretKeySet) -> Result<Self> {
        if sealed.len() != REQUEST_SIZE {
            return Err(Error::ReadbackRejected);
        }

        let (ciphertext, tag) = sealed.split_at(BODY_SIZE);
        let expected = crypto::cbc_tag(keys.get(KeyName::RbhKey), ciphertext)?;
        if !crypto::ct_equal(&expected, tag) {
            log::debug!("Readback request tag mismatch");
            return Err(Error::ReadbackRejected);
        }

        let mut body = Zeroizing::new([0u8; BODY_SIZE]);
        body.copy_from_slice(ciphertext);
        crypto::cfb_decrypt(keys.get(KeyName::RbKey), keys.get(KeyName::RbIv), &mut body[..])?;

        if !crypto::ct_equal(&body[..PASSWORD_SIZE], keys.get(KeyName::RbPw)) {
            log::debug!("Readback request password mismatch");
            return Err(Error::ReadbackRejected);
        }

        let word = |at: usize| {
            u32::from_be_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
        };
        Ok(Self {
            start: word(PASSWORD_SIZE),
            count: word(PASSWORD_SIZE + 4),
        })
    }
}

/// Encrypt memory contents for a readback response, as the target does
pub fn encrypt_response(data: &mut [u8], keys: &SecretKeySet) -> Result<()> {
    crypto::cfb_encrypt(keys.get(KeyName::RbKey), keys.get(KeyName::RbIv), data)
}

/// Decrypt a readback response in place
pub fn decrypt_response(data: &mut [u8], keys: &SecretKeySet) -> Result<()> {
    crypto::cfb_decrypt(keys.get(KeyName::RbKey), keys.get(KeyName::RbIv), data)
}
