//! Authenticated memory readback
//!
//! The host waits for `'R'`, sends a sealed [`ReadbackRequest`] and reads
//! exactly `count` encrypted bytes back. Bounds checking of the requested
//! range is done by the target.

use alloc::vec::Vec;

use super::{wait_for_sentinel, FRAME_SIZE, NAK, SENTINEL_READBACK};
use crate::error::{Error, Result};
use crate::readback::{decrypt_response, ReadbackRequest};
use crate::secrets::SecretKeySet;
use crate::transport::Transport;

/// Largest response buffer reserved up front
const MAX_PREALLOC: usize = 64 * 1024;

/// Read `request.count` bytes of target memory
///
/// Each read waits up to `timeout_ms` for more data. A target that answers
/// with a lone NAK and then goes quiet has refused the request.
pub fn request<T: Transport>(
    transport: &mut T,
    request: &ReadbackRequest,
    keys: &SecretKeySet,
    timeout_ms: u32,
) -> Result<Vec<u8>> {
    let sealed = request.seal(keys)?;

    wait_for_sentinel(transport, SENTINEL_READBACK, timeout_ms)?;
    transport.write(&sealed)?;
    transport.flush()?;
    log::debug!(
        "Requested {} bytes from 0x{:08X}",
        request.count,
        request.start
    );

    let expected = request.count as usize;
    // Capacity is capped; the buffer grows with the response.
    let mut data = Vec::with_capacity(expected.min(MAX_PREALLOC));
    let mut chunk = [0u8; FRAME_SIZE];

    while data.len() < expected {
        let want = (expected - data.len()).min(chunk.len());
        let n = transport.read_nonblock(&mut chunk[..want], timeout_ms)?;
        if n == 0 {
            if data[..] == [NAK] {
                log::debug!("Target answered the request with NAK");
                return Err(Error::ReadbackRejected);
            }
            return Err(Error::ReadbackTimeout {
                expected,
                received: data.len(),
            });
        }
        data.extend_from_slice(&chunk[..n]);
        log::trace!("Received {}/{} bytes", data.len(), expected);
    }

    decrypt_response(&mut data, keys)?;
    log::info!("Read back {} bytes from 0x{:08X}", expected, request.start);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::ScriptedTransport;
    use crate::readback::{encrypt_response, REQUEST_SIZE};

    fn keys() -> SecretKeySet {
        SecretKeySet::generate().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let keys = keys();
        let memory: Vec<u8> = (0..40u8).collect();
        let mut response = memory.clone();
        encrypt_response(&mut response, &keys).unwrap();

        let mut t = ScriptedTransport::new(b"..R").then(&response);
        let req = ReadbackRequest::new(0x200, 40);
        assert_eq!(request(&mut t, &req, &keys, 10).unwrap(), memory);

        assert_eq!(t.written.len(), REQUEST_SIZE);
        assert_eq!(ReadbackRequest::unseal(&t.written, &keys), Ok(req));
    }

    #[test]
    fn test_short_response() {
        let keys = keys();
        let mut t = ScriptedTransport::new(b"R").then(&[1, 2, 3]).then_silence();
        assert_eq!(
            request(&mut t, &ReadbackRequest::new(0, 8), &keys, 10),
            Err(Error::ReadbackTimeout {
                expected: 8,
                received: 3
            })
        );
    }

    #[test]
    fn test_lone_nak_is_rejection() {
        let keys = keys();
        let mut t = ScriptedTransport::new(b"R").then(&[NAK]).then_silence();
        assert_eq!(
            request(&mut t, &ReadbackRequest::new(0, 8), &keys, 10),
            Err(Error::ReadbackRejected)
        );
    }

    #[test]
    fn test_oversized_count_times_out_without_preallocating() {
        let keys = keys();
        let mut t = ScriptedTransport::new(b"R").then(&[9; 300]).then_silence();
        assert_eq!(
            request(&mut t, &ReadbackRequest::new(0, u32::MAX), &keys, 10),
            Err(Error::ReadbackTimeout {
                expected: u32::MAX as usize,
                received: 300
            })
        );
    }

    #[test]
    fn test_empty_request() {
        let keys = keys();
        let mut t = ScriptedTransport::new(b"R");
        assert_eq!(
            request(&mut t, &ReadbackRequest::new(0x100, 0), &keys, 10),
            Ok(Vec::new())
        );
        assert_eq!(t.written.len(), REQUEST_SIZE);
    }
}
