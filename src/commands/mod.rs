//! CLI command implementations
//!
//! Offline commands (`secrets`, `protect`, `inspect`) work on files only.
//! Target-facing commands (`update`, `configure`, `readback`) open one
//! serial connection, run one protocol exchange and drop the port on every
//! exit path.

pub mod configure;
pub mod inspect;
pub mod protect;
pub mod readback;
pub mod secrets;
pub mod update;

use crate::cli::SerialArgs;
use bootseal_core::config::Profile;
use bootseal_serial::{SerialConnection, SerialError, SerialTransport};

/// Open the serial port named on the command line or in the profile
pub fn open_serial(
    args: &SerialArgs,
    profile: &Profile,
) -> Result<SerialTransport, Box<dyn std::error::Error>> {
    let port = args
        .port
        .as_deref()
        .or(profile.serial.port.as_deref())
        .ok_or(SerialError::NoPort)?;

    let mut conn = SerialConnection::parse(port)?;
    // An explicit --baud wins over a baud rate in the connection string
    if let Some(baud) = args.baud.or(conn.baud).or(profile.serial.baud) {
        conn.baud = Some(baud);
    }

    Ok(conn.open(timeout_ms(args, profile))?)
}

/// Per-read timeout from the command line, the profile or the default
pub fn timeout_ms(args: &SerialArgs, profile: &Profile) -> u32 {
    args.timeout_ms.unwrap_or_else(|| profile.timeout_ms())
}
