//! Inspect command implementation

use bootseal_core::bundle;
use bootseal_core::secrets::SecretKeySet;
use std::path::Path;

/// Verify a bundle's tag and print its header
pub fn run_inspect(
    firmware: &Path,
    secrets: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = SecretKeySet::load(secrets)?;
    let data = std::fs::read(firmware)?;
    let contents = bundle::open(&data, &keys)?;

    println!("Bundle:   {}", firmware.display());
    println!("Tag:      valid");
    if contents.version == 0 {
        println!("Version:  0 (debug build)");
    } else {
        println!("Version:  {}", contents.version);
    }
    println!(
        "Message:  {}",
        String::from_utf8_lossy(contents.message())
    );

    let used = contents
        .payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    println!(
        "Payload:  {} bytes used of {}",
        used,
        contents.payload.len()
    );

    if let Some(path) = output {
        std::fs::write(path, &contents.payload)?;
        println!("Wrote payload region to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::protect::run_protect;

    #[test]
    fn test_protect_then_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.txt");
        let hex_file = dir.path().join("fw.hex");
        let bundle_file = dir.path().join("fw.bin");
        let payload_file = dir.path().join("payload.bin");

        SecretKeySet::generate().unwrap().persist(&secrets).unwrap();
        std::fs::write(
            &hex_file,
            ":0400000001020304F2\n:00000001FF\n",
        )
        .unwrap();

        run_protect(&hex_file, &bundle_file, 3, "rel", &secrets, false).unwrap();
        assert_eq!(
            std::fs::metadata(&bundle_file).unwrap().len(),
            bundle::BUNDLE_SIZE as u64
        );

        run_inspect(&bundle_file, &secrets, Some(&payload_file)).unwrap();
        let payload = std::fs::read(&payload_file).unwrap();
        assert_eq!(&payload[..4], &[1, 2, 3, 4]);
        assert_eq!(payload.len(), bundle::MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_inspect_with_wrong_secrets_fails() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.txt");
        let bundle_file = dir.path().join("fw.bin");

        let keys = SecretKeySet::generate().unwrap();
        let image = bootseal_core::hex::FlashImage::from_bytes(vec![0u8; 10]);
        let sealed = bundle::build(&image, 1, "", &keys).unwrap();
        std::fs::write(&bundle_file, sealed.as_bytes()).unwrap();

        SecretKeySet::generate().unwrap().persist(&secrets).unwrap();
        assert!(run_inspect(&bundle_file, &secrets, None).is_err());
    }
}
