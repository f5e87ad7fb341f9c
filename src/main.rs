//! bootseal - Secure bootloader provisioning and firmware update tool
//!
//! Host side of a secure bootloader that only accepts sealed firmware.
//!
//! # Workflow
//!
//! 1. `secrets generate` draws the per-build key set that is compiled into
//!    the bootloader.
//! 2. `configure` checks the freshly flashed bootloader's self-measured hash
//!    and promotes the build secrets to field secrets.
//! 3. `protect` seals an application image into a fixed-size encrypted
//!    bundle; `update` streams it to the target frame by frame.
//! 4. `readback` dumps target memory through an authenticated request.

mod cli;
mod commands;

use bootseal_core::config::Profile;
use bootseal_core::protocol::update::TransferOptions;
use clap::Parser;
use cli::{Cli, Commands, SecretsCommands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let profile = match &cli.config {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    match cli.command {
        Commands::Secrets(subcmd) => match subcmd {
            SecretsCommands::Generate { output, force } => {
                let output = output.unwrap_or_else(|| profile.build_secrets());
                commands::secrets::cmd_generate(&output, force)
            }
            SecretsCommands::Show { file, reveal } => {
                let file = file.unwrap_or_else(|| profile.build_secrets());
                commands::secrets::cmd_show(&file, reveal)
            }
            SecretsCommands::Promote { build, field } => {
                let build = build.unwrap_or_else(|| profile.build_secrets());
                let field = field.unwrap_or_else(|| profile.field_secrets());
                commands::secrets::cmd_promote(&build, &field)
            }
        },
        Commands::Protect {
            infile,
            outfile,
            version,
            message,
            secrets,
            reject_gaps,
        } => {
            let secrets = secrets.unwrap_or_else(|| profile.build_secrets());
            commands::protect::run_protect(
                &infile,
                &outfile,
                version,
                &message,
                &secrets,
                reject_gaps,
            )
        }
        Commands::Update {
            firmware,
            serial,
            ack_timeout_ms,
            await_verdict,
        } => {
            let options = TransferOptions {
                poll_ms: commands::timeout_ms(&serial, &profile),
                ack_timeout_ms: ack_timeout_ms.unwrap_or_else(|| profile.ack_timeout_ms()),
                await_verdict,
            };
            let transport = commands::open_serial(&serial, &profile)?;
            commands::update::run_update(transport, &firmware, options)
        }
        Commands::Configure {
            image,
            serial,
            secrets,
            field_secrets,
            no_promote,
        } => {
            let secrets = secrets.unwrap_or_else(|| profile.build_secrets());
            let field = if no_promote {
                None
            } else {
                Some(field_secrets.unwrap_or_else(|| profile.field_secrets()))
            };
            let transport = commands::open_serial(&serial, &profile)?;
            commands::configure::run_configure(
                transport,
                &image,
                &secrets,
                field.as_deref(),
                commands::timeout_ms(&serial, &profile),
            )
        }
        Commands::Readback {
            serial,
            address,
            num_bytes,
            datafile,
            secrets,
        } => {
            let secrets = secrets.unwrap_or_else(|| profile.field_secrets());
            let transport = commands::open_serial(&serial, &profile)?;
            commands::readback::run_readback(
                transport,
                address,
                num_bytes,
                &secrets,
                datafile.as_deref(),
                commands::timeout_ms(&serial, &profile),
            )
        }
        Commands::Inspect {
            firmware,
            secrets,
            output,
        } => {
            let secrets = secrets.unwrap_or_else(|| profile.build_secrets());
            commands::inspect::run_inspect(&firmware, &secrets, output.as_deref())
        }
    }
}
