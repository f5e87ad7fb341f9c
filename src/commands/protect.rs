//! Protect command implementation

use bootseal_core::bundle;
use bootseal_core::hex::{GapPolicy, HexExtractor};
use bootseal_core::secrets::SecretKeySet;
use std::path::Path;

/// Seal an Intel-HEX image into a bundle file
pub fn run_protect(
    infile: &Path,
    outfile: &Path,
    version: u32,
    message: &str,
    secrets: &Path,
    reject_gaps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = SecretKeySet::load(secrets)?;

    let policy = if reject_gaps {
        GapPolicy::Reject
    } else {
        GapPolicy::default()
    };
    let text = std::fs::read_to_string(infile)?;
    let image = HexExtractor::new().with_policy(policy).extract(&text)?;
    log::info!(
        "Extracted {} bytes at 0x{:08X} from {}",
        image.len(),
        image.base,
        infile.display()
    );

    let sealed = bundle::build(&image, version, message, &keys)?;
    std::fs::write(outfile, sealed.as_bytes())?;

    println!(
        "Sealed {} byte image as version {} into {} ({} bytes)",
        image.len(),
        version,
        outfile.display(),
        sealed.as_bytes().len()
    );
    Ok(())
}
