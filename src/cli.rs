//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "bootseal")]
#[command(author, version, about = "Secure bootloader provisioning and firmware update tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// TOML profile with serial and secret file defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Serial port selection shared by the target-facing commands
#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial port (e.g., /dev/ttyUSB0 or dev=/dev/ttyUSB0:115200)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Per-read timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the per-build secret set
    #[command(subcommand)]
    Secrets(SecretsCommands),

    /// Seal an Intel-HEX firmware image into an encrypted bundle
    Protect {
        /// Input Intel-HEX file
        #[arg(short, long)]
        infile: PathBuf,

        /// Output bundle file
        #[arg(short, long)]
        outfile: PathBuf,

        /// Firmware version (0 marks a debug build)
        #[arg(long)]
        version: u32,

        /// Release message embedded in the bundle
        #[arg(short, long, default_value = "")]
        message: String,

        /// Build secret file
        #[arg(long)]
        secrets: Option<PathBuf>,

        /// Fail on address gaps instead of filling them with 0xFF
        #[arg(long)]
        reject_gaps: bool,
    },

    /// Send a sealed bundle to a target in update mode
    Update {
        /// Sealed bundle file
        #[arg(short, long)]
        firmware: PathBuf,

        #[command(flatten)]
        serial: SerialArgs,

        /// Per-frame acknowledgment timeout in milliseconds
        #[arg(long)]
        ack_timeout_ms: Option<u32>,

        /// Wait for the target to accept or reject the bundle
        #[arg(long)]
        await_verdict: bool,
    },

    /// Verify a freshly flashed bootloader and promote the field secrets
    Configure {
        /// Bootloader image that was flashed (.hex or raw binary)
        #[arg(short, long)]
        image: PathBuf,

        #[command(flatten)]
        serial: SerialArgs,

        /// Build secret file
        #[arg(long)]
        secrets: Option<PathBuf>,

        /// Field-configuration secret file to write
        #[arg(long)]
        field_secrets: Option<PathBuf>,

        /// Skip promoting the build secrets after a verified handshake
        #[arg(long)]
        no_promote: bool,
    },

    /// Read back a range of target memory
    Readback {
        #[command(flatten)]
        serial: SerialArgs,

        /// First address to read (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to read
        #[arg(short, long, value_parser = parse_hex_u32)]
        num_bytes: u32,

        /// Also write the raw bytes to this file
        #[arg(long)]
        datafile: Option<PathBuf>,

        /// Field-configuration secret file
        #[arg(long)]
        secrets: Option<PathBuf>,
    },

    /// Verify and decrypt a sealed bundle
    Inspect {
        /// Sealed bundle file
        #[arg(short, long)]
        firmware: PathBuf,

        /// Build secret file
        #[arg(long)]
        secrets: Option<PathBuf>,

        /// Write the decrypted payload region to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SecretsCommands {
    /// Generate a fresh secret set
    Generate {
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing secret file
        #[arg(long)]
        force: bool,
    },

    /// List the entries of a secret file
    Show {
        /// Secret file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the values instead of redacting them
        #[arg(long)]
        reveal: bool,
    },

    /// Copy the build secrets to the field-configuration file
    Promote {
        /// Build secret file
        #[arg(long)]
        build: Option<PathBuf>,

        /// Field-configuration secret file
        #[arg(long)]
        field: Option<PathBuf>,
    },
}
