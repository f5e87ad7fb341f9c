//! Error types for bootseal-core
//!
//! This module provides the no_std compatible error type returned by the
//! serial protocols and the cipher helpers. Secret file, hex and bundle
//! errors live next to the code that produces them.

use core::fmt;

/// Protocol and transport error - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Channel errors
    /// I/O error on the underlying channel
    IoError,
    /// The channel timed out while a fixed-length read was pending
    Timeout,

    // Transfer errors
    /// The target answered a frame with something other than OK
    TransferRejected {
        /// 1-based number of the rejected frame
        frame: usize,
        /// The byte received instead of OK
        response: u8,
    },
    /// No acknowledgment arrived for a frame before the ack timeout
    AckTimeout {
        /// 1-based number of the unacknowledged frame
        frame: usize,
    },
    /// The target rejected the bundle after the end-of-transfer marker
    UpdateRejected {
        /// The byte received instead of OK
        response: u8,
    },

    // Readback errors
    /// Fewer response bytes than requested arrived before the timeout
    ReadbackTimeout {
        /// Number of bytes requested
        expected: usize,
        /// Number of bytes received before the channel went silent
        received: usize,
    },
    /// The target refused the readback request (bad tag or password)
    ReadbackRejected,

    // Crypto errors
    /// A key or IV has the wrong length for AES-256
    InvalidKeyLength,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error"),
            Self::Timeout => write!(f, "channel timed out"),
            Self::TransferRejected { frame, response } => write!(
                f,
                "target rejected frame {} with 0x{:02X}",
                frame, response
            ),
            Self::AckTimeout { frame } => {
                write!(f, "no acknowledgment for frame {}", frame)
            }
            Self::UpdateRejected { response } => {
                write!(f, "target rejected the update with 0x{:02X}", response)
            }
            Self::ReadbackTimeout { expected, received } => write!(
                f,
                "readback timed out after {} of {} bytes",
                received, expected
            ),
            Self::ReadbackRejected => write!(f, "target rejected the readback request"),
            Self::InvalidKeyLength => write!(f, "invalid key or IV length"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
