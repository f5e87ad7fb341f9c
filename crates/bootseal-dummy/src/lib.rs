//! bootseal-dummy - In-memory bootloader emulator for testing
//!
//! This crate provides a [`Transport`] that plays the target's side of the
//! update, configure and readback protocols. It holds the same secret set
//! as the real bootloader and a flash array, so the host tools can be
//! exercised end to end without hardware.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use bootseal_core::bundle::{self, BundleContents, FLASH_HASH_REGION};
use bootseal_core::error::{Error, Result};
use bootseal_core::protocol::{
    ACK, FRAME_SIZE, NAK, SENTINEL_CONFIGURE, SENTINEL_READBACK, SENTINEL_UPDATE,
};
use bootseal_core::readback::{self, ReadbackRequest, REQUEST_SIZE};
use bootseal_core::secrets::SecretKeySet;
use bootseal_core::transport::Transport;

/// Which protocol the emulated target is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Firmware update (`'U'`)
    Update,
    /// Post-flash configure handshake (`'C'`)
    Configure,
    /// Memory readback (`'R'`)
    Readback,
}

impl Mode {
    fn sentinel(self) -> u8 {
        match self {
            Mode::Update => SENTINEL_UPDATE,
            Mode::Configure => SENTINEL_CONFIGURE,
            Mode::Readback => SENTINEL_READBACK,
        }
    }
}

/// Configuration for the emulated bootloader
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Flash size in bytes
    pub flash_size: usize,
    /// Frames the target expects before the end marker
    pub expected_frames: usize,
    /// Version currently installed; older bundles are refused
    pub installed_version: u16,
    /// Answer this frame (1-based) with NAK
    pub nak_frame: Option<usize>,
    /// Never answer this frame (1-based)
    pub mute_frame: Option<usize>,
    /// Flip this byte of the hash reported during the handshake
    pub corrupt_hash_byte: Option<usize>,
    /// Bytes printed before the first sentinel
    pub banner: &'static [u8],
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            flash_size: 128 * 1024,
            expected_frames: 126,
            installed_version: 0,
            nak_frame: None,
            mute_frame: None,
            corrupt_hash_byte: None,
            banner: b"",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ReceivingFrames,
    AwaitEndMarker,
    AwaitHostAck,
    AwaitVerdict,
    AwaitRequest,
    Finished,
}

/// Emulated bootloader
pub struct EmulatedBootloader {
    config: EmulatorConfig,
    keys: SecretKeySet,
    mode: Mode,
    phase: Phase,
    flash: Vec<u8>,
    announcing: bool,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    frames_received: usize,
    bundle: Vec<u8>,
    installed: Option<BundleContents>,
    host_verdict: Option<u8>,
    rejected_requests: usize,
}

impl EmulatedBootloader {
    /// Create a target in `mode`, its flash erased
    pub fn new(mode: Mode, keys: SecretKeySet, config: EmulatorConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        let mut outbox: VecDeque<u8> = config.banner.iter().copied().collect();
        outbox.push_back(mode.sentinel());

        let phase = match mode {
            Mode::Update => Phase::ReceivingFrames,
            Mode::Configure => Phase::AwaitHostAck,
            Mode::Readback => Phase::AwaitRequest,
        };

        Self {
            config,
            keys,
            mode,
            phase,
            flash,
            announcing: true,
            inbox: Vec::new(),
            outbox,
            frames_received: 0,
            bundle: Vec::new(),
            installed: None,
            host_verdict: None,
            rejected_requests: 0,
        }
    }

    /// Create a target with default configuration
    pub fn new_default(mode: Mode, keys: SecretKeySet) -> Self {
        Self::new(mode, keys, EmulatorConfig::default())
    }

    /// Program `data` into flash at `offset`, as a factory programmer would
    pub fn with_flash(mut self, offset: usize, data: &[u8]) -> Self {
        self.flash[offset..offset + data.len()].copy_from_slice(data);
        self
    }

    /// Mode the target was started in
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Number of frames received so far
    pub fn frames_received(&self) -> usize {
        self.frames_received
    }

    /// Contents of the last bundle accepted and installed
    pub fn installed(&self) -> Option<&BundleContents> {
        self.installed.as_ref()
    }

    /// Byte the host sent to conclude the handshake
    pub fn host_verdict(&self) -> Option<u8> {
        self.host_verdict
    }

    /// Number of readback requests refused
    pub fn rejected_requests(&self) -> usize {
        self.rejected_requests
    }

    /// Hash of the measured region, as the bootloader reports it
    fn measured_hash(&self) -> Result<[u8; 16]> {
        let region = &self.flash[..FLASH_HASH_REGION.min(self.flash.len())];
        bundle::flash_hash(region, FLASH_HASH_REGION, &self.keys).map_err(|e| {
            log::error!("Emulator failed to hash flash: {}", e);
            Error::IoError
        })
    }

    fn process(&mut self) -> Result<()> {
        loop {
            let progressed = match self.phase {
                Phase::ReceivingFrames => self.take_frame(),
                Phase::AwaitEndMarker => self.take_end_marker(),
                Phase::AwaitHostAck => self.take_host_ack()?,
                Phase::AwaitVerdict => self.take_verdict(),
                Phase::AwaitRequest => self.take_request()?,
                Phase::Finished => {
                    if !self.inbox.is_empty() {
                        log::trace!("Emulator ignoring {} bytes", self.inbox.len());
                        self.inbox.clear();
                    }
                    false
                }
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    fn take(&mut self, len: usize) -> Option<Vec<u8>> {
        if self.inbox.len() < len {
            return None;
        }
        Some(self.inbox.drain(..len).collect())
    }

    fn take_frame(&mut self) -> bool {
        let Some(frame) = self.take(FRAME_SIZE) else {
            return false;
        };
        self.frames_received += 1;
        let number = self.frames_received;

        if self.config.nak_frame == Some(number) {
            log::debug!("Emulator rejecting frame {}", number);
            self.outbox.push_back(NAK);
            self.phase = Phase::Finished;
            return true;
        }
        if self.config.mute_frame == Some(number) {
            log::debug!("Emulator ignoring frame {}", number);
            self.phase = Phase::Finished;
            return true;
        }

        self.bundle.extend_from_slice(&frame);
        self.outbox.push_back(ACK);
        if number == self.config.expected_frames {
            self.phase = Phase::AwaitEndMarker;
        }
        true
    }

    fn take_end_marker(&mut self) -> bool {
        let Some(marker) = self.take(2) else {
            return false;
        };
        self.phase = Phase::Finished;
        if marker != [0, 0] {
            log::debug!("Emulator expected end marker, got {:02X?}", marker);
            self.outbox.push_back(NAK);
            return true;
        }

        let verdict = match bundle::open(&self.bundle, &self.keys) {
            Ok(contents) if self.accepts_version(contents.version) => {
                self.install(contents);
                ACK
            }
            Ok(contents) => {
                log::debug!("Emulator refusing rollback to version {}", contents.version);
                NAK
            }
            Err(e) => {
                log::debug!("Emulator refusing bundle: {}", e);
                NAK
            }
        };
        self.outbox.push_back(verdict);
        true
    }

    fn accepts_version(&self, version: u16) -> bool {
        version == 0 || version >= self.config.installed_version
    }

    fn install(&mut self, contents: BundleContents) {
        let len = contents.payload.len().min(self.flash.len());
        self.flash[..len].copy_from_slice(&contents.payload[..len]);
        if contents.version != 0 {
            self.config.installed_version = contents.version;
        }
        log::debug!("Emulator installed version {}", contents.version);
        self.installed = Some(contents);
    }

    fn take_host_ack(&mut self) -> Result<bool> {
        let Some(reply) = self.take(1) else {
            return Ok(false);
        };
        if reply[0] != ACK {
            log::debug!("Emulator expected ACK, got 0x{:02X}", reply[0]);
            self.phase = Phase::Finished;
            return Ok(true);
        }

        let mut hash = self.measured_hash()?;
        if let Some(byte) = self.config.corrupt_hash_byte {
            hash[byte] ^= 0x01;
        }
        self.outbox.extend(hash);
        self.phase = Phase::AwaitVerdict;
        Ok(true)
    }

    fn take_verdict(&mut self) -> bool {
        let Some(reply) = self.take(1) else {
            return false;
        };
        self.host_verdict = Some(reply[0]);
        self.phase = Phase::Finished;
        true
    }

    fn take_request(&mut self) -> Result<bool> {
        let Some(sealed) = self.take(REQUEST_SIZE) else {
            return Ok(false);
        };

        let request = match ReadbackRequest::unseal(&sealed, &self.keys) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Emulator refusing readback: {}", e);
                self.reject_request();
                return Ok(true);
            }
        };

        let range = request
            .end()
            .map(|end| request.start as usize..end as usize)
            .filter(|range| range.end <= self.flash.len());
        let Some(range) = range else {
            log::debug!("Emulator refusing out-of-range readback");
            self.reject_request();
            return Ok(true);
        };

        let mut data = self.flash[range].to_vec();
        readback::encrypt_response(&mut data, &self.keys)?;
        self.outbox.extend(data);
        self.phase = Phase::Finished;
        Ok(true)
    }

    fn reject_request(&mut self) {
        self.rejected_requests += 1;
        self.outbox.push_back(NAK);
        self.phase = Phase::Finished;
    }
}

impl Transport for EmulatedBootloader {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.announcing = false;
        self.inbox.extend_from_slice(data);
        self.process()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.outbox.len() < buf.len() {
            return Err(Error::Timeout);
        }
        for slot in buf.iter_mut() {
            *slot = self.outbox.pop_front().ok_or(Error::Timeout)?;
        }
        Ok(())
    }

    fn read_nonblock(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
        if self.outbox.is_empty() && self.announcing {
            // The target repeats its sentinel until the host speaks
            self.outbox.push_back(self.mode.sentinel());
        }
        let n = buf.len().min(self.outbox.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.outbox.pop_front().ok_or(Error::Timeout)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
