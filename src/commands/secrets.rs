//! Secret set commands

use bootseal_core::secrets::{self, SecretKeySet};
use std::path::Path;

/// Generate and persist a fresh secret set
pub fn cmd_generate(output: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if output.exists() && !force {
        return Err(format!(
            "{} already exists; every tool of this build reads it. Use --force to replace it",
            output.display()
        )
        .into());
    }

    let set = SecretKeySet::generate()?;
    set.persist(output)?;
    println!("Generated new secrets in {}", output.display());
    Ok(())
}

/// Print the entries of a secret file
pub fn cmd_show(file: &Path, reveal: bool) -> Result<(), Box<dyn std::error::Error>> {
    let set = SecretKeySet::load(file)?;

    println!("Secrets in {}:", file.display());
    for (key, value) in set.iter() {
        if reveal {
            println!("  {:<10} {}", key.as_str(), hex::encode(value));
        } else {
            println!("  {:<10} <{} bytes>", key.as_str(), value.len());
        }
    }
    Ok(())
}

/// Copy the build secrets to the field-configuration file
pub fn cmd_promote(build: &Path, field: &Path) -> Result<(), Box<dyn std::error::Error>> {
    secrets::promote_file(build, field)?;
    println!("Promoted {} to {}", build.display(), field.display());
    Ok(())
}
