//! Update command implementation

use bootseal_core::bundle::FirmwareBundle;
use bootseal_core::protocol::update::{send_bundle, TransferOptions, TransferProgress};
use bootseal_core::transport::Transport;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Progress reporter that draws a frame counter with indicatif
struct IndicatifProgress {
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self { bar: None }
    }
}

impl TransferProgress for IndicatifProgress {
    fn started(&mut self, total_frames: usize) {
        let pb = ProgressBar::new(total_frames as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        self.bar = Some(pb);
    }

    fn frame_acked(&mut self, frame: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(frame as u64);
        }
    }

    fn finished(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("Transfer complete");
        }
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        // Leave the bar where it stopped if the transfer failed
        if let Some(pb) = self.bar.take() {
            pb.abandon();
        }
    }
}

/// Send a sealed bundle file over `transport`
pub fn run_update<T: Transport>(
    transport: T,
    firmware: &Path,
    options: TransferOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = FirmwareBundle::from_bytes(std::fs::read(firmware)?)?;

    println!("Waiting for bootloader to enter update mode...");
    let mut progress = IndicatifProgress::new();
    let frames = send_bundle(transport, bundle.as_bytes(), options, &mut progress)?;

    if options.await_verdict {
        println!("Sent {} frames; bootloader accepted the update", frames);
    } else {
        println!("Sent {} frames", frames);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootseal_core::bundle;
    use bootseal_core::hex::FlashImage;
    use bootseal_core::secrets::SecretKeySet;
    use bootseal_dummy::{EmulatedBootloader, Mode};

    #[test]
    fn test_update_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        let keys = SecretKeySet::generate().unwrap();
        let image = FlashImage::from_bytes(vec![0x42u8; 1000]);
        let sealed = bundle::build(&image, 9, "field fix", &keys).unwrap();
        std::fs::write(&path, sealed.as_bytes()).unwrap();

        let mut target = EmulatedBootloader::new_default(Mode::Update, keys);
        let options = TransferOptions {
            await_verdict: true,
            ..Default::default()
        };
        run_update(&mut target, &path, options).unwrap();
        assert_eq!(target.installed().unwrap().version, 9);
    }

    #[test]
    fn test_update_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        std::fs::write(&path, [0u8; 1000]).unwrap();

        let keys = SecretKeySet::generate().unwrap();
        let mut target = EmulatedBootloader::new_default(Mode::Update, keys);
        assert!(run_update(&mut target, &path, TransferOptions::default()).is_err());
        assert_eq!(target.frames_received(), 0);
    }
}
