//! Byte channel abstraction for the bootloader protocols
//!
//! The protocols in [`crate::protocol`] are written against this trait so
//! they run unchanged over a serial port, an emulated bootloader or a test
//! double.

use crate::error::Result;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write all of `data` to the channel
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    ///
    /// Fails with [`crate::Error::Timeout`] if the channel's own timeout
    /// expires first.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read with timeout
    ///
    /// Reads up to `buf.len()` bytes, waiting up to `timeout_ms` milliseconds.
    /// Returns the number of bytes read, or 0 on timeout.
    fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }

    fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        (**self).read_nonblock(buf, timeout_ms)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Loopback over a small fixed buffer
    struct Loopback {
        buf: [u8; 8],
        len: usize,
        flushed: bool,
    }

    impl Transport for Loopback {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            let end = self.len + data.len();
            if end > self.buf.len() {
                return Err(Error::IoError);
            }
            self.buf[self.len..end].copy_from_slice(data);
            self.len = end;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.read_nonblock(buf, 0)? != buf.len() {
                return Err(Error::Timeout);
            }
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
            let n = buf.len().min(self.len);
            buf[..n].copy_from_slice(&self.buf[..n]);
            self.buf.copy_within(n..self.len, 0);
            self.len -= n;
            Ok(n)
        }

        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn exchange<T: Transport>(mut transport: T) -> Result<[u8; 3]> {
        transport.write(b"UCR")?;
        transport.flush()?;
        let mut out = [0u8; 3];
        transport.read(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_borrowed_transport_forwards() {
        let mut lb = Loopback {
            buf: [0; 8],
            len: 0,
            flushed: false,
        };
        assert_eq!(exchange(&mut lb), Ok(*b"UCR"));
        assert!(lb.flushed);

        let mut empty = [0u8; 2];
        assert_eq!((&mut lb).read_nonblock(&mut empty, 10), Ok(0));
        assert_eq!((&mut lb).read(&mut empty), Err(Error::Timeout));
    }
}
