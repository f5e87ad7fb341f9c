//! Configure command implementation

use bootseal_core::bundle::{self, FLASH_HASH_REGION};
use bootseal_core::hex::HexExtractor;
use bootseal_core::protocol::configure::{verify_flash, HandshakeOutcome};
use bootseal_core::secrets::{self, SecretKeySet};
use bootseal_core::transport::Transport;
use std::path::Path;

/// Load the flashed bootloader image, from Intel-HEX or raw binary
fn load_image(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let is_hex = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("ihx"));
    if is_hex {
        let text = std::fs::read_to_string(path)?;
        Ok(HexExtractor::new().extract(&text)?.data)
    } else {
        Ok(std::fs::read(path)?)
    }
}

/// Run the post-flash handshake and promote the field secrets on success
pub fn run_configure<T: Transport>(
    mut transport: T,
    image: &Path,
    build_secrets: &Path,
    field_secrets: Option<&Path>,
    poll_ms: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = SecretKeySet::load(build_secrets)?;
    let image = load_image(image)?;
    let expected = bundle::flash_hash(&image, FLASH_HASH_REGION, &keys)?;
    log::debug!("Expected flash hash {}", hex::encode(expected));

    println!("Waiting for bootloader to enter configure mode...");
    match verify_flash(&mut transport, &expected, poll_ms)? {
        HandshakeOutcome::Verified => println!("Bootloader flash hash verified"),
        HandshakeOutcome::Mismatch => {
            return Err("bootloader flash hash mismatch; target was sent NAK".into())
        }
    }

    if let Some(field) = field_secrets {
        secrets::promote_file(build_secrets, field)?;
        println!("Field secrets written to {}", field.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootseal_dummy::{EmulatedBootloader, EmulatorConfig, Mode};

    #[test]
    fn test_configure_promotes_on_match() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build.txt");
        let field = dir.path().join("field.txt");
        let image_path = dir.path().join("bootloader.bin");

        let keys = SecretKeySet::generate().unwrap();
        keys.persist(&build).unwrap();
        let image: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
        std::fs::write(&image_path, &image).unwrap();

        let mut target =
            EmulatedBootloader::new_default(Mode::Configure, keys).with_flash(0, &image);
        run_configure(&mut target, &image_path, &build, Some(&field), 10).unwrap();

        assert_eq!(target.host_verdict(), Some(0x06));
        assert_eq!(std::fs::read(&build).unwrap(), std::fs::read(&field).unwrap());
    }

    #[test]
    fn test_configure_mismatch_does_not_promote() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build.txt");
        let field = dir.path().join("field.txt");
        let image_path = dir.path().join("bootloader.bin");

        let keys = SecretKeySet::generate().unwrap();
        keys.persist(&build).unwrap();
        std::fs::write(&image_path, [0xA5u8; 64]).unwrap();

        let config = EmulatorConfig {
            corrupt_hash_byte: Some(15),
            ..Default::default()
        };
        let mut target =
            EmulatedBootloader::new(Mode::Configure, keys, config).with_flash(0, &[0xA5u8; 64]);
        assert!(run_configure(&mut target, &image_path, &build, Some(&field), 10).is_err());

        assert_eq!(target.host_verdict(), Some(0x15));
        assert!(!field.exists());
    }

    #[test]
    fn test_load_hex_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootloader.hex");
        std::fs::write(&path, ":0400000001020304F2\n:00000001FF\n").unwrap();
        assert_eq!(load_image(&path).unwrap(), vec![1, 2, 3, 4]);
    }
}
