//! Serial port implementation of the bootloader [`Transport`]

use std::io::{Read, Write};
use std::time::Duration;

use bootseal_core::transport::Transport;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Result, SerialError};

/// Serial port transport
///
/// The port is closed when the transport is dropped.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `device` at `baud`, 8N1 without flow control
    ///
    /// `timeout_ms` bounds every fixed-length read.
    pub fn open(device: &str, baud: u32, timeout_ms: u32) -> Result<Self> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(timeout_ms as u64))
            .open()?;

        log::info!("Opened serial port {} at {} baud", device, baud);

        Ok(Self { port })
    }

    /// Read into `buf` under a temporary timeout, restoring the port's
    /// own timeout afterwards
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let old_timeout = self.port.timeout();
        self.port
            .set_timeout(Duration::from_millis(timeout_ms as u64))?;

        let result = match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::from(e)),
        };

        self.port.set_timeout(old_timeout)?;
        result
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> bootseal_core::Result<()> {
        self.port.write_all(data).map_err(SerialError::from)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> bootseal_core::Result<()> {
        self.port.read_exact(buf).map_err(SerialError::from)?;
        Ok(())
    }

    fn read_nonblock(&mut self, buf: &mut [u8], timeout_ms: u32) -> bootseal_core::Result<usize> {
        Ok(self.read_with_timeout(buf, timeout_ms)?)
    }

    fn flush(&mut self) -> bootseal_core::Result<()> {
        self.port.flush().map_err(SerialError::from)?;
        Ok(())
    }
}
