//! Post-flash configure handshake
//!
//! After the bootloader is flashed it measures its own image and reports
//! the hash. The host answers ACK only if that hash equals the one it
//! computed from the image it built:
//!
//! ```text
//! target          host
//!   'C'   ----->
//!         <-----  0x06
//!   hash  ----->           16 bytes
//!         <-----  0x06 / 0x15
//! ```

use super::{wait_for_sentinel, ACK, NAK, SENTINEL_CONFIGURE};
use crate::crypto::{self, Tag, BLOCK_SIZE};
use crate::error::Result;
use crate::transport::Transport;

/// Result of comparing the target's hash with the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Hashes matched and ACK was sent
    Verified,
    /// Hashes differed and NAK was sent
    Mismatch,
}

impl HandshakeOutcome {
    /// Whether the target's image was verified
    pub fn is_verified(self) -> bool {
        self == HandshakeOutcome::Verified
    }
}

/// Run the configure handshake against `expected`
///
/// A mismatch is not an error: the NAK has been delivered and the caller
/// decides what to do with the outcome.
pub fn verify_flash<T: Transport>(
    transport: &mut T,
    expected: &Tag,
    poll_ms: u32,
) -> Result<HandshakeOutcome> {
    wait_for_sentinel(transport, SENTINEL_CONFIGURE, poll_ms)?;
    transport.write(&[ACK])?;
    transport.flush()?;

    let mut reported = [0u8; BLOCK_SIZE];
    transport.read(&mut reported)?;
    log::debug!("Target reported flash hash");

    let outcome = if crypto::ct_equal(&reported, expected) {
        HandshakeOutcome::Verified
    } else {
        HandshakeOutcome::Mismatch
    };

    let reply = match outcome {
        HandshakeOutcome::Verified => ACK,
        HandshakeOutcome::Mismatch => NAK,
    };
    transport.write(&[reply])?;
    transport.flush()?;

    match outcome {
        HandshakeOutcome::Verified => log::info!("Flash hash verified"),
        HandshakeOutcome::Mismatch => log::warn!("Flash hash mismatch, sent NAK"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::ScriptedTransport;
    use crate::Error;

    const HASH: Tag = [
        0x10, 0x21, 0x32, 0x43, 0x54, 0x65, 0x76, 0x87, 0x98, 0xA9, 0xBA, 0xCB, 0xDC, 0xED, 0xFE,
        0x0F,
    ];

    #[test]
    fn test_matching_hash_is_acked() {
        let mut t = ScriptedTransport::new(b"xC").then(&HASH);
        assert_eq!(
            verify_flash(&mut t, &HASH, 10),
            Ok(HandshakeOutcome::Verified)
        );
        assert_eq!(t.written, [ACK, ACK]);
    }

    #[test]
    fn test_last_byte_difference_is_nakked() {
        let mut reported = HASH;
        reported[15] ^= 0x01;
        let mut t = ScriptedTransport::new(b"C").then(&reported);
        assert_eq!(
            verify_flash(&mut t, &HASH, 10),
            Ok(HandshakeOutcome::Mismatch)
        );
        assert_eq!(t.written, [ACK, NAK]);
    }

    #[test]
    fn test_first_byte_difference_is_nakked() {
        let mut reported = HASH;
        reported[0] = 0;
        let mut t = ScriptedTransport::new(b"C").then(&reported);
        let outcome = verify_flash(&mut t, &HASH, 10).unwrap();
        assert!(!outcome.is_verified());
        assert_eq!(t.written, [ACK, NAK]);
    }

    #[test]
    fn test_short_hash_times_out() {
        let mut t = ScriptedTransport::new(b"C").then(&HASH[..8]).then_silence();
        assert_eq!(verify_flash(&mut t, &HASH, 10), Err(Error::Timeout));
        assert_eq!(t.written, [ACK]);
    }
}
