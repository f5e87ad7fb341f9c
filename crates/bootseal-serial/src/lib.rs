//! bootseal-serial - Serial port transport
//!
//! Connects the bootloader protocols in `bootseal-core` to a real UART.
//!
//! # Example
//!
//! ```no_run
//! use bootseal_core::protocol::configure::verify_flash;
//! use bootseal_serial::SerialConnection;
//!
//! let conn = SerialConnection::parse("dev=/dev/ttyUSB0:115200")?;
//! let mut transport = conn.open(2000)?;
//! let outcome = verify_flash(&mut transport, &[0u8; 16], 2000)?;
//! println!("{:?}", outcome);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod transport;

pub use error::{Result, SerialError};
pub use transport::SerialTransport;

/// Default baud rate of the bootloader UART
pub const DEFAULT_BAUD: u32 = bootseal_core::config::DEFAULT_BAUD;

/// A serial device and its baud rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConnection {
    /// Device path (e.g., "/dev/ttyUSB0" or "COM1")
    pub device: String,
    /// Baud rate (None for the default)
    pub baud: Option<u32>,
}

impl SerialConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyUSB0` - default baud
    /// - `dev=/dev/ttyUSB0:115200` - explicit baud
    /// - `/dev/ttyUSB0` - bare device path, default baud
    pub fn parse(s: &str) -> Result<Self> {
        let dev = s.strip_prefix("dev=").unwrap_or(s);
        if dev.is_empty() {
            return Err(SerialError::InvalidConnection(s.to_string()));
        }

        match dev.rsplit_once(':') {
            // A trailing numeric suffix is a baud rate; anything else is part of the path
            Some((device, baud_str))
                if !device.is_empty() && baud_str.bytes().all(|b| b.is_ascii_digit()) =>
            {
                let baud = baud_str.parse().map_err(|_| {
                    SerialError::InvalidConnection(format!("Invalid baud rate: {}", baud_str))
                })?;
                Ok(Self {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            }
            _ => Ok(Self {
                device: dev.to_string(),
                baud: None,
            }),
        }
    }

    /// Baud rate, or the default
    pub fn baud_or_default(&self) -> u32 {
        self.baud.unwrap_or(DEFAULT_BAUD)
    }

    /// Open the port
    pub fn open(&self, timeout_ms: u32) -> Result<SerialTransport> {
        SerialTransport::open(&self.device, self.baud_or_default(), timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_baud() {
        let conn = SerialConnection::parse("dev=/dev/ttyUSB0:57600").unwrap();
        assert_eq!(conn.device, "/dev/ttyUSB0");
        assert_eq!(conn.baud, Some(57600));
    }

    #[test]
    fn test_parse_default_baud() {
        let conn = SerialConnection::parse("dev=/dev/ttyACM1").unwrap();
        assert_eq!(conn.device, "/dev/ttyACM1");
        assert_eq!(conn.baud_or_default(), 115_200);
    }

    #[test]
    fn test_parse_bare_path() {
        let conn = SerialConnection::parse("COM3").unwrap();
        assert_eq!(conn.device, "COM3");
        assert_eq!(conn.baud, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(SerialConnection::parse("dev=").is_err());
        assert!(SerialConnection::parse("").is_err());
        assert!(matches!(
            SerialConnection::parse("dev=/dev/ttyUSB0:99999999999"),
            Err(SerialError::InvalidConnection(_))
        ));
    }

    #[test]
    fn test_timeout_maps_to_core_timeout() {
        let err = SerialError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(bootseal_core::Error::from(err), bootseal_core::Error::Timeout);

        let err = SerialError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(bootseal_core::Error::from(err), bootseal_core::Error::IoError);
    }
}
