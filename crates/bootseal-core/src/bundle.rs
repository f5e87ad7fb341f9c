//! Sealed firmware bundle format
//!
//! A bundle is exactly [`BUNDLE_SIZE`] bytes (126 pages of 256 bytes):
//!
//! ```text
//! plaintext, 125 pages, encrypted with FW_KEY / FW_IV (AES-256 CFB-128)
//! +--------+-------------+-----------------+-------------------+---------+
//! | 0..2   | 2..256      | 256..1280       | 1280..1280+n      | ..32000 |
//! | ver BE | random fill | release message | flash payload     | 0x00    |
//! +--------+-------------+-----------------+-------------------+---------+
//! tag page
//! +----------------------------+------------------------------+
//! | 32000..32016               | 32016..32256                 |
//! | CBC tag of ciphertext (H)  | 0x06                         |
//! +----------------------------+------------------------------+
//! ```
//!
//! The release message field is NUL-terminated and zero-padded; messages
//! longer than [`MAX_MESSAGE_LEN`] bytes are truncated with a warning.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use rand_core::{CryptoRng, RngCore};
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::crypto::{self, Tag, BLOCK_SIZE};
use crate::error::Error;
use crate::hex::{FlashImage, ERASED_VALUE};
use crate::secrets::{KeyName, SecretKeySet};

/// Flash page size of the target, and the transfer frame size
pub const PAGE_SIZE: usize = 256;

/// Size of the random filler after the version
pub const FILLER_SIZE: usize = 254;

/// Width of the release message field
pub const MESSAGE_FIELD_SIZE: usize = 1024;

/// Longest release message that still leaves room for the terminator
pub const MAX_MESSAGE_LEN: usize = MESSAGE_FIELD_SIZE - 1;

/// Offset of the flash payload in the plaintext
pub const HEADER_SIZE: usize = 2 + FILLER_SIZE + MESSAGE_FIELD_SIZE;

/// Size of the encrypted region
pub const PLAINTEXT_SIZE: usize = 125 * PAGE_SIZE;

/// Largest flash payload a bundle can carry
pub const MAX_PAYLOAD_SIZE: usize = PLAINTEXT_SIZE - HEADER_SIZE;

/// Total size of a sealed bundle
pub const BUNDLE_SIZE: usize = 126 * PAGE_SIZE;

/// Filler after the tag, the same byte as the transfer ACK
pub const TAG_PAGE_FILL: u8 = 0x06;

/// Region the bootloader measures during the configure handshake (32 pages)
pub const FLASH_HASH_REGION: usize = 32 * PAGE_SIZE;

/// Fixed-layout plaintext header
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
struct BundleHeader {
    version: U16<BigEndian>,
    filler: [u8; FILLER_SIZE],
    message: [u8; MESSAGE_FIELD_SIZE],
}

/// Errors from building or opening a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleError {
    /// The version does not fit in 16 bits
    VersionOutOfRange(u32),
    /// The payload does not fit in the bundle
    Overflow {
        /// Payload size in bytes
        size: usize,
        /// Space available in bytes
        capacity: usize,
    },
    /// A bundle file has the wrong size
    WrongSize(usize),
    /// The bundle's tag does not match its ciphertext
    TagMismatch,
    /// Encryption or tagging failed
    Crypto(Error),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionOutOfRange(v) => write!(f, "version {} does not fit in 16 bits", v),
            Self::Overflow { size, capacity } => write!(
                f,
                "payload of {} bytes exceeds bundle capacity of {} bytes",
                size, capacity
            ),
            Self::WrongSize(size) => write!(
                f,
                "bundle is {} bytes, expected {}",
                size, BUNDLE_SIZE
            ),
            Self::TagMismatch => write!(f, "bundle tag mismatch"),
            Self::Crypto(e) => write!(f, "bundle crypto failed: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BundleError {}

impl From<Error> for BundleError {
    fn from(e: Error) -> Self {
        BundleError::Crypto(e)
    }
}

/// A sealed bundle, always exactly [`BUNDLE_SIZE`] bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareBundle(Vec<u8>);

impl FirmwareBundle {
    /// Wrap bytes read back from a bundle file
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, BundleError> {
        if data.len() != BUNDLE_SIZE {
            return Err(BundleError::WrongSize(data.len()));
        }
        Ok(Self(data))
    }

    /// Get the raw bundle bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the bundle and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Decrypted contents of a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleContents {
    /// Firmware version (0 marks a debug build)
    pub version: u16,
    /// The full release message field, terminator and padding included
    pub message_field: Vec<u8>,
    /// The payload region, zero padding included
    pub payload: Vec<u8>,
}

impl BundleContents {
    /// Release message up to its NUL terminator
    pub fn message(&self) -> &[u8] {
        let end = self
            .message_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.message_field.len());
        &self.message_field[..end]
    }
}

/// Seal a flash image into a bundle using `rng` for the filler bytes
pub fn build_with_rng<R: RngCore + CryptoRng>(
    image: &FlashImage,
    version: u32,
    message: impl AsRef<[u8]>,
    keys: &SecretKeySet,
    rng: &mut R,
) -> Result<FirmwareBundle, BundleError> {
    let version = u16::try_from(version).map_err(|_| BundleError::VersionOutOfRange(version))?;

    let mut message = message.as_ref();
    if message.len() > MAX_MESSAGE_LEN {
        log::warn!(
            "Release message is {} bytes, truncating to {}",
            message.len(),
            MAX_MESSAGE_LEN
        );
        message = &message[..MAX_MESSAGE_LEN];
    }

    if image.len() > MAX_PAYLOAD_SIZE {
        return Err(BundleError::Overflow {
            size: image.len(),
            capacity: MAX_PAYLOAD_SIZE,
        });
    }

    let mut header = BundleHeader {
        version: U16::new(version),
        filler: [0; FILLER_SIZE],
        message: [0; MESSAGE_FIELD_SIZE],
    };
    rng.fill_bytes(&mut header.filler);
    header.message[..message.len()].copy_from_slice(message);

    let mut sealed = vec![0u8; PLAINTEXT_SIZE];
    sealed[..HEADER_SIZE].copy_from_slice(header.as_bytes());
    sealed[HEADER_SIZE..HEADER_SIZE + image.len()].copy_from_slice(image.as_bytes());

    crypto::cfb_encrypt(
        keys.get(KeyName::FwKey),
        keys.get(KeyName::FwIv),
        &mut sealed,
    )?;
    let tag = crypto::cbc_tag(keys.get(KeyName::HKey), &sealed)?;

    sealed.extend_from_slice(&tag);
    sealed.resize(BUNDLE_SIZE, TAG_PAGE_FILL);

    log::debug!(
        "Sealed {} byte payload, version {}, {} byte message",
        image.len(),
        version,
        message.len()
    );
    Ok(FirmwareBundle(sealed))
}

/// Seal a flash image into a bundle
#[cfg(feature = "std")]
pub fn build(
    image: &FlashImage,
    version: u32,
    message: impl AsRef<[u8]>,
    keys: &SecretKeySet,
) -> Result<FirmwareBundle, BundleError> {
    build_with_rng(image, version, message, keys, &mut rand::rngs::OsRng)
}

/// Verify and decrypt a bundle
pub fn open(bundle: &[u8], keys: &SecretKeySet) -> Result<BundleContents, BundleError> {
    if bundle.len() != BUNDLE_SIZE {
        return Err(BundleError::WrongSize(bundle.len()));
    }

    let (ciphertext, rest) = bundle.split_at(PLAINTEXT_SIZE);
    let tag = crypto::cbc_tag(keys.get(KeyName::HKey), ciphertext)?;
    if !crypto::ct_equal(&tag, &rest[..BLOCK_SIZE]) {
        return Err(BundleError::TagMismatch);
    }

    let mut plain = ciphertext.to_vec();
    crypto::cfb_decrypt(
        keys.get(KeyName::FwKey),
        keys.get(KeyName::FwIv),
        &mut plain,
    )?;

    let (header, payload) =
        BundleHeader::read_from_prefix(&plain).map_err(|_| BundleError::WrongSize(plain.len()))?;

    Ok(BundleContents {
        version: header.version.get(),
        message_field: header.message.to_vec(),
        payload: payload.to_vec(),
    })
}

/// Compute the hash the bootloader reports during the configure handshake
///
/// The image is padded with the erase value to `region_size` bytes, as
/// unwritten flash reads back, then tagged with `H_KEY`.
pub fn flash_hash(
    image: &[u8],
    region_size: usize,
    keys: &SecretKeySet,
) -> Result<Tag, BundleError> {
    if image.len() > region_size {
        return Err(BundleError::Overflow {
            size: image.len(),
            capacity: region_size,
        });
    }

    let mut region = image.to_vec();
    region.resize(region_size, ERASED_VALUE);
    Ok(crypto::cbc_tag(keys.get(KeyName::HKey), &region)?)
}
