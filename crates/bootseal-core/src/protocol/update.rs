//! Firmware transfer
//!
//! ```text
//! target                      host
//!   | 'U' 'U' ...               |
//!   |-------------------------->|   AwaitReady
//!   |          frame 1 (256 B)  |
//!   |<--------------------------|   SendFrames
//!   | 0x06                      |
//!   |-------------------------->|
//!   |            ...            |
//!   |          0x00 0x00        |
//!   |<--------------------------|   Finalize
//!   | 0x06 (optional verdict)   |
//!   |-------------------------->|   Done
//! ```
//!
//! A frame is only sent once the previous one has been acknowledged. Any
//! reply other than ACK fails the transfer; nothing is retried.

use alloc::vec::Vec;

use super::{wait_for_sentinel, ACK, DEFAULT_TIMEOUT_MS, END_MARKER, FRAME_SIZE, SENTINEL_UPDATE};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Progress callbacks for a transfer
pub trait TransferProgress {
    /// Called once the target is ready, with the number of frames to send
    fn started(&mut self, total_frames: usize);

    /// Called after each frame is acknowledged (1-based)
    fn frame_acked(&mut self, frame: usize);

    /// Called after the end marker is sent
    fn finished(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn started(&mut self, _total_frames: usize) {}
    fn frame_acked(&mut self, _frame: usize) {}
    fn finished(&mut self) {}
}

/// Transfer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Poll interval while waiting for the sentinel
    pub poll_ms: u32,
    /// How long to wait for each frame's acknowledgment
    pub ack_timeout_ms: u32,
    /// Wait for the target's accept/reject byte after the end marker
    pub await_verdict: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_TIMEOUT_MS,
            await_verdict: false,
        }
    }
}

/// Where a transfer currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for the update sentinel
    AwaitReady,
    /// Sending frames; `next` is the 0-based index of the next frame
    SendFrames {
        /// Index of the next frame to send
        next: usize,
    },
    /// All frames acknowledged, end marker pending
    Finalize,
    /// Transfer complete
    Done,
    /// Transfer aborted
    Failed(Error),
}

/// A single firmware transfer over `transport`
pub struct Transfer<'a, T: Transport> {
    transport: T,
    frames: Vec<&'a [u8]>,
    options: TransferOptions,
    state: TransferState,
}

impl<'a, T: Transport> Transfer<'a, T> {
    /// Prepare to send `bundle`
    pub fn new(transport: T, bundle: &'a [u8], options: TransferOptions) -> Self {
        Self {
            transport,
            frames: bundle.chunks(FRAME_SIZE).collect(),
            options,
            state: TransferState::AwaitReady,
        }
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Number of frames in the bundle
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Advance the state machine by one step
    pub fn step<P: TransferProgress>(&mut self, progress: &mut P) -> TransferState {
        self.state = match self.advance(progress) {
            Ok(next) => next,
            Err(e) => {
                log::debug!("Transfer failed: {}", e);
                TransferState::Failed(e)
            }
        };
        self.state
    }

    /// Drive the transfer to completion
    ///
    /// Returns the number of frames sent.
    pub fn run<P: TransferProgress>(mut self, progress: &mut P) -> Result<usize> {
        loop {
            match self.step(progress) {
                TransferState::Done => return Ok(self.frames.len()),
                TransferState::Failed(e) => return Err(e),
                _ => {}
            }
        }
    }

    fn advance<P: TransferProgress>(&mut self, progress: &mut P) -> Result<TransferState> {
        match self.state {
            TransferState::AwaitReady => {
                wait_for_sentinel(&mut self.transport, SENTINEL_UPDATE, self.options.poll_ms)?;
                log::info!("Target ready, sending {} frames", self.frames.len());
                progress.started(self.frames.len());
                Ok(TransferState::SendFrames { next: 0 })
            }
            TransferState::SendFrames { next } if next >= self.frames.len() => {
                Ok(TransferState::Finalize)
            }
            TransferState::SendFrames { next } => {
                let number = next + 1;
                self.send_frame(self.frames[next], number)?;
                progress.frame_acked(number);
                Ok(TransferState::SendFrames { next: number })
            }
            TransferState::Finalize => {
                self.transport.write(&END_MARKER)?;
                self.transport.flush()?;
                progress.finished();
                if self.options.await_verdict {
                    self.await_verdict()?;
                }
                log::info!("Transfer complete");
                Ok(TransferState::Done)
            }
            state @ (TransferState::Done | TransferState::Failed(_)) => Ok(state),
        }
    }

    fn send_frame(&mut self, frame: &[u8], number: usize) -> Result<()> {
        if frame.len() == FRAME_SIZE {
            self.transport.write(frame)?;
        } else {
            let mut padded = [0u8; FRAME_SIZE];
            padded[..frame.len()].copy_from_slice(frame);
            self.transport.write(&padded)?;
        }
        self.transport.flush()?;

        let mut reply = [0u8; 1];
        if self
            .transport
            .read_nonblock(&mut reply, self.options.ack_timeout_ms)?
            == 0
        {
            return Err(Error::AckTimeout { frame: number });
        }
        if reply[0] != ACK {
            return Err(Error::TransferRejected {
                frame: number,
                response: reply[0],
            });
        }
        log::debug!("Frame {}/{} acknowledged", number, self.frames.len());
        Ok(())
    }

    fn await_verdict(&mut self) -> Result<()> {
        let mut reply = [0u8; 1];
        if self
            .transport
            .read_nonblock(&mut reply, self.options.ack_timeout_ms)?
            == 0
        {
            return Err(Error::Timeout);
        }
        if reply[0] != ACK {
            return Err(Error::UpdateRejected { response: reply[0] });
        }
        log::info!("Target accepted the update");
        Ok(())
    }
}

/// Send a sealed bundle to a target in update mode
///
/// Returns the number of frames sent.
pub fn send_bundle<T: Transport, P: TransferProgress>(
    transport: T,
    bundle: &[u8],
    options: TransferOptions,
    progress: &mut P,
) -> Result<usize> {
    Transfer::new(transport, bundle, options).run(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::ScriptedTransport;
    use crate::protocol::NAK;
    use alloc::vec;

    #[derive(Default)]
    struct Recorder {
        total: usize,
        acked: Vec<usize>,
        finished: bool,
    }

    impl TransferProgress for Recorder {
        fn started(&mut self, total_frames: usize) {
            self.total = total_frames;
        }
        fn frame_acked(&mut self, frame: usize) {
            self.acked.push(frame);
        }
        fn finished(&mut self) {
            self.finished = true;
        }
    }

    fn numbered_frames(count: usize) -> Vec<u8> {
        (0..count).flat_map(|i| vec![i as u8; FRAME_SIZE]).collect()
    }

    #[test]
    fn test_full_transfer() {
        let bundle = numbered_frames(4);
        let mut t = ScriptedTransport::new(b"..U").then(&[ACK; 4]);
        let mut progress = Recorder::default();

        let sent = send_bundle(&mut t, &bundle, TransferOptions::default(), &mut progress).unwrap();
        assert_eq!(sent, 4);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.acked, vec![1, 2, 3, 4]);
        assert!(progress.finished);

        let mut expected = bundle.clone();
        expected.extend_from_slice(&[0, 0]);
        assert_eq!(t.written, expected);
    }

    #[test]
    fn test_nak_on_third_frame_aborts() {
        let bundle = numbered_frames(10);
        let mut t = ScriptedTransport::new(b"U").then(&[ACK, ACK, NAK]);

        let result = send_bundle(&mut t, &bundle, TransferOptions::default(), &mut NoProgress);
        assert_eq!(
            result,
            Err(Error::TransferRejected {
                frame: 3,
                response: NAK
            })
        );
        assert_eq!(t.written.len(), 3 * FRAME_SIZE);
        assert_eq!(t.written[2 * FRAME_SIZE], 2);
    }

    #[test]
    fn test_missing_ack_times_out() {
        let bundle = numbered_frames(2);
        let mut t = ScriptedTransport::new(b"U").then(&[ACK]).then_silence();

        let result = send_bundle(&mut t, &bundle, TransferOptions::default(), &mut NoProgress);
        assert_eq!(result, Err(Error::AckTimeout { frame: 2 }));
    }

    #[test]
    fn test_short_final_frame_is_zero_padded() {
        let bundle = vec![0xAAu8; FRAME_SIZE + 10];
        let mut t = ScriptedTransport::new(b"U").then(&[ACK, ACK]);

        send_bundle(&mut t, &bundle, TransferOptions::default(), &mut NoProgress).unwrap();
        assert_eq!(t.written.len(), 2 * FRAME_SIZE + 2);
        assert!(t.written[FRAME_SIZE..FRAME_SIZE + 10].iter().all(|&b| b == 0xAA));
        assert!(t.written[FRAME_SIZE + 10..2 * FRAME_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_verdict() {
        let bundle = numbered_frames(1);
        let options = TransferOptions {
            await_verdict: true,
            ..Default::default()
        };

        let mut ok = ScriptedTransport::new(b"U").then(&[ACK, ACK]);
        assert_eq!(send_bundle(&mut ok, &bundle, options, &mut NoProgress), Ok(1));

        let mut rejected = ScriptedTransport::new(b"U").then(&[ACK, NAK]);
        assert_eq!(
            send_bundle(&mut rejected, &bundle, options, &mut NoProgress),
            Err(Error::UpdateRejected { response: NAK })
        );
    }

    #[test]
    fn test_state_progression() {
        let bundle = numbered_frames(1);
        let mut t = ScriptedTransport::new(b"U").then(&[ACK]);
        let mut transfer = Transfer::new(&mut t, &bundle, TransferOptions::default());

        assert_eq!(transfer.state(), TransferState::AwaitReady);
        assert_eq!(
            transfer.step(&mut NoProgress),
            TransferState::SendFrames { next: 0 }
        );
        assert_eq!(
            transfer.step(&mut NoProgress),
            TransferState::SendFrames { next: 1 }
        );
        assert_eq!(transfer.step(&mut NoProgress), TransferState::Finalize);
        assert_eq!(transfer.step(&mut NoProgress), TransferState::Done);
        assert_eq!(transfer.step(&mut NoProgress), TransferState::Done);
    }
}
