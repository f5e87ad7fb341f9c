//! Readback command implementation

use bootseal_core::protocol::readback::request;
use bootseal_core::readback::ReadbackRequest;
use bootseal_core::secrets::SecretKeySet;
use bootseal_core::transport::Transport;
use std::path::Path;

/// Read back target memory, print it hex encoded and optionally save it
pub fn run_readback<T: Transport>(
    mut transport: T,
    address: u32,
    num_bytes: u32,
    secrets: &Path,
    datafile: Option<&Path>,
    timeout_ms: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let req = ReadbackRequest::new(address, num_bytes);
    if req.end().is_none() {
        return Err(format!(
            "range 0x{:08X} + {} overflows the 32-bit address space",
            address, num_bytes
        )
        .into());
    }

    let keys = SecretKeySet::load(secrets)?;

    println!("Waiting for bootloader to enter readback mode...");
    let data = request(&mut transport, &req, &keys, timeout_ms)?;
    println!("{}", hex::encode(&data));

    if let Some(path) = datafile {
        std::fs::write(path, &data)?;
        log::info!("Wrote {} bytes to {}", data.len(), path.display());
    }
    Ok(())
}
