//! Intel-HEX flash payload extraction
//!
//! Only what is needed to turn a compiler's `.hex` output into the raw
//! bytes that go into a firmware bundle:
//!
//! - Data records (type 00) are decoded and concatenated in file order.
//! - Extended segment (02) and extended linear (04) address records move
//!   the address base for the data records that follow.
//! - End-of-file (01) stops processing; every other record is dropped.
//!
//! Records must be contiguous. A record that starts past the end of the
//! previous one is a gap, resolved by the extractor's [`GapPolicy`]. A
//! record that starts before the end of the previous one can never be
//! placed and is always an error.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Record types understood by the extractor
mod record {
    pub const DATA: u8 = 0x00;
    pub const EOF: u8 = 0x01;
    pub const EXT_SEGMENT: u8 = 0x02;
    pub const EXT_LINEAR: u8 = 0x04;
}

/// Value of unprogrammed flash
pub const ERASED_VALUE: u8 = 0xFF;

/// Default upper bound on an extracted image (128 KiB, the whole device)
pub const DEFAULT_SIZE_LIMIT: usize = 128 * 1024;

/// What to do when a data record does not follow the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    /// Fill the gap with the given byte (normally the flash erase value)
    Fill(u8),
    /// Fail with [`HexError::Discontinuity`]
    Reject,
}

impl Default for GapPolicy {
    fn default() -> Self {
        GapPolicy::Fill(ERASED_VALUE)
    }
}

/// Errors from parsing an Intel-HEX image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// A line is not a well-formed record
    Syntax {
        /// 1-based line number
        line: usize,
    },
    /// A record's checksum does not match its contents
    Checksum {
        /// 1-based line number
        line: usize,
    },
    /// A data record starts past the end of the previous one
    Discontinuity {
        /// Address the next record was expected at
        expected: u32,
        /// Address the record actually starts at
        found: u32,
    },
    /// A data record starts before the end of the previous one
    Overlap {
        /// Address the next record was expected at
        expected: u32,
        /// Address the record actually starts at
        found: u32,
    },
    /// The image grew past the extractor's size limit
    TooLarge {
        /// The configured limit in bytes
        limit: usize,
    },
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { line } => write!(f, "invalid hex record on line {}", line),
            Self::Checksum { line } => write!(f, "bad record checksum on line {}", line),
            Self::Discontinuity { expected, found } => write!(
                f,
                "hex image is not contiguous: expected 0x{:08X}, found 0x{:08X}",
                expected, found
            ),
            Self::Overlap { expected, found } => write!(
                f,
                "hex record at 0x{:08X} overlaps data ending at 0x{:08X}",
                found, expected
            ),
            Self::TooLarge { limit } => write!(f, "hex image exceeds {} bytes", limit),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HexError {}

/// Flash contents reconstructed from an Intel-HEX file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlashImage {
    /// Address of the first byte
    pub base: u32,
    /// Contiguous flash bytes
    pub data: Vec<u8>,
}

impl FlashImage {
    /// Wrap raw bytes that start at address 0
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            base: 0,
            data: data.into(),
        }
    }

    /// Number of bytes in the image
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Intel-HEX to [`FlashImage`] converter
#[derive(Debug, Clone, Copy)]
pub struct HexExtractor {
    policy: GapPolicy,
    limit: usize,
}

impl Default for HexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HexExtractor {
    /// Create an extractor that fills gaps with the erase value
    pub fn new() -> Self {
        Self {
            policy: GapPolicy::default(),
            limit: DEFAULT_SIZE_LIMIT,
        }
    }

    /// Set the gap policy
    pub fn with_policy(mut self, policy: GapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the maximum image size in bytes
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Extract the flash payload from Intel-HEX text
    pub fn extract(&self, text: &str) -> Result<FlashImage, HexError> {
        let mut image = FlashImage::default();
        let mut expected: Option<u32> = None;
        let mut base: u32 = 0;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let bytes = decode_record(raw, line)?;
            let rtype = bytes[3];
            let payload = &bytes[4..bytes.len() - 1];

            match rtype {
                record::DATA => {}
                record::EOF => break,
                record::EXT_SEGMENT | record::EXT_LINEAR => {
                    if payload.len() != 2 {
                        return Err(HexError::Syntax { line });
                    }
                    let value = u16::from_be_bytes([payload[0], payload[1]]) as u32;
                    base = if rtype == record::EXT_SEGMENT {
                        value << 4
                    } else {
                        value << 16
                    };
                    continue;
                }
                _ => {
                    log::trace!("hex: skipping record type 0x{:02X} on line {}", rtype, line);
                    continue;
                }
            }

            if payload.is_empty() {
                continue;
            }

            let offset = u16::from_be_bytes([bytes[1], bytes[2]]) as u32;
            let addr = base.wrapping_add(offset);

            match expected {
                None => image.base = addr,
                Some(next) if addr == next => {}
                Some(next) if addr < next => {
                    return Err(HexError::Overlap {
                        expected: next,
                        found: addr,
                    })
                }
                Some(next) => match self.policy {
                    GapPolicy::Fill(fill) => {
                        let gap = (addr - next) as usize;
                        self.check_limit(image.len() + gap)?;
                        log::debug!(
                            "hex: filling {} byte gap at 0x{:08X} with 0x{:02X}",
                            gap,
                            next,
                            fill
                        );
                        image.data.extend(core::iter::repeat(fill).take(gap));
                    }
                    GapPolicy::Reject => {
                        return Err(HexError::Discontinuity {
                            expected: next,
                            found: addr,
                        })
                    }
                },
            }

            self.check_limit(image.len() + payload.len())?;
            image.data.extend_from_slice(payload);
            expected = Some(addr.wrapping_add(payload.len() as u32));
        }

        log::debug!(
            "hex: extracted {} bytes at 0x{:08X}",
            image.len(),
            image.base
        );
        Ok(image)
    }

    fn check_limit(&self, size: usize) -> Result<(), HexError> {
        if size > self.limit {
            Err(HexError::TooLarge { limit: self.limit })
        } else {
            Ok(())
        }
    }
}

/// Decode one `:LLAAAATT...CC` record and verify its checksum
fn decode_record(raw: &str, line: usize) -> Result<Vec<u8>, HexError> {
    let digits = raw
        .strip_prefix(':')
        .ok_or(HexError::Syntax { line })?
        .as_bytes();

    if digits.len() % 2 != 0 {
        return Err(HexError::Syntax { line });
    }

    let mut bytes = vec![0u8; digits.len() / 2];
    for (out, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
        let hi = nibble(pair[0]).ok_or(HexError::Syntax { line })?;
        let lo = nibble(pair[1]).ok_or(HexError::Syntax { line })?;
        *out = (hi << 4) | lo;
    }

    // length + address (2) + type + checksum
    if bytes.len() < 5 || bytes.len() != 5 + bytes[0] as usize {
        return Err(HexError::Syntax { line });
    }

    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        return Err(HexError::Checksum { line });
    }

    Ok(bytes)
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}
