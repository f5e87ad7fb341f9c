//! Error types for the serial transport

use thiserror::Error;

/// Serial transport errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// The connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    InvalidConnection(String),

    /// No serial port was given on the command line or in the profile
    #[error("No serial port specified")]
    NoPort,

    /// Opening or configuring the port failed
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for serial operations
pub type Result<T> = core::result::Result<T, SerialError>;

impl From<SerialError> for bootseal_core::Error {
    fn from(e: SerialError) -> Self {
        log::debug!("Serial transport failure: {}", e);
        match e {
            SerialError::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => {
                bootseal_core::Error::Timeout
            }
            _ => bootseal_core::Error::IoError,
        }
    }
}
