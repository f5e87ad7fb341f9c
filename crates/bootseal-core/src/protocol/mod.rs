//! Serial protocols spoken by the bootloader
//!
//! Each protocol starts the same way: the target announces the mode it is
//! in by repeatedly emitting a single sentinel byte, and the host discards
//! everything until it sees that byte. All three exchanges are strictly
//! synchronous and never retry mid-flight; any failure aborts the whole
//! operation and the caller must start again from the sentinel.
//!
//! | Mode      | Sentinel | Module        |
//! |-----------|----------|---------------|
//! | update    | `'U'`    | [`update`]    |
//! | configure | `'C'`    | [`configure`] |
//! | readback  | `'R'`    | [`readback`]  |

pub mod configure;
pub mod readback;
pub mod update;

use crate::error::Result;
use crate::transport::Transport;

/// Sentinel announcing the firmware update mode
pub const SENTINEL_UPDATE: u8 = b'U';
/// Sentinel announcing the configure handshake
pub const SENTINEL_CONFIGURE: u8 = b'C';
/// Sentinel announcing the readback mode
pub const SENTINEL_READBACK: u8 = b'R';

/// Positive acknowledgment
pub const ACK: u8 = 0x06;
/// Negative acknowledgment
pub const NAK: u8 = 0x15;

/// Size of one update frame
pub const FRAME_SIZE: usize = crate::bundle::PAGE_SIZE;

/// Zero-length frame header that ends a transfer
pub const END_MARKER: [u8; 2] = 0u16.to_be_bytes();

/// Default per-read timeout, matching the bootloader's UART pacing
pub const DEFAULT_TIMEOUT_MS: u32 = 2000;

/// Discard incoming bytes until `sentinel` arrives
///
/// Each poll waits up to `poll_ms`; a poll that times out is retried, so
/// this only returns early on a channel error.
pub fn wait_for_sentinel<T: Transport>(transport: &mut T, sentinel: u8, poll_ms: u32) -> Result<()> {
    log::debug!("Waiting for sentinel '{}'", sentinel as char);
    let mut byte = [0u8; 1];
    let mut discarded = 0usize;

    loop {
        if transport.read_nonblock(&mut byte, poll_ms)? == 0 {
            log::trace!("No data within {} ms, still waiting", poll_ms);
            continue;
        }
        if byte[0] == sentinel {
            log::debug!(
                "Got sentinel '{}' after discarding {} bytes",
                sentinel as char,
                discarded
            );
            return Ok(());
        }
        log::trace!("Discarding 0x{:02X}", byte[0]);
        discarded += 1;
    }
}
