//! bootseal-core - Core library for secure bootloader provisioning
//!
//! This crate holds everything needed to prepare and talk to a bootloader
//! that only accepts sealed firmware: the per-build secret set, Intel-HEX
//! payload extraction, the fixed-layout encrypted firmware bundle, and the
//! three serial protocols (firmware transfer, post-flash handshake and
//! authenticated memory readback).
//!
//! It is designed to be `no_std` compatible so the same bundle and MAC code
//! can be shared with target-side tooling.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`): secret
//!   file persistence, OS entropy, and the TOML profile.
//! - `alloc` - Enable heap allocation (bundles, hex images, secret sets)
//!
//! # Example
//!
//! ```ignore
//! use bootseal_core::{bundle, hex::HexExtractor, secrets::SecretKeySet};
//!
//! let keys = SecretKeySet::load("secret_build_output.txt")?;
//! let image = HexExtractor::new().extract(&std::fs::read_to_string("fw.hex")?)?;
//! let sealed = bundle::build(&image, 3, "rel", &keys)?;
//! std::fs::write("fw.bin", sealed.as_bytes())?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod crypto;
pub mod error;
#[cfg(feature = "alloc")]
pub mod protocol;
pub mod transport;

#[cfg(feature = "alloc")]
pub mod bundle;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "alloc")]
pub mod hex;
#[cfg(feature = "alloc")]
pub mod readback;
#[cfg(feature = "alloc")]
pub mod secrets;

pub use error::{Error, Result};
