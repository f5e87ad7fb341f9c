//! Man page generator for bootseal
//!
//! Writes `bootseal.1` plus one page per subcommand (`bootseal-secrets.1`,
//! `bootseal-secrets-generate.1`, `bootseal-update.1`, ...).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::{Command, CommandFactory};
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

const MANUAL: &str = "bootseal manual";

/// Render `cmd` and every visible subcommand below it
///
/// Returns `(file name, roff)` pairs, parent pages first.
fn render_pages(cmd: Command) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut cmd = cmd.disable_help_subcommand(true);
    cmd.build();

    let mut pages = Vec::new();
    render_into(&cmd, &mut pages)?;
    Ok(pages)
}

fn render_into(cmd: &Command, pages: &mut Vec<(String, Vec<u8>)>) -> std::io::Result<()> {
    let man = clap_mangen::Man::new(cmd.clone()).manual(MANUAL);
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    pages.push((man.get_filename(), buffer));

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        render_into(sub, pages)?;
    }
    Ok(())
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let pages = render_pages(cli::Cli::command())?;
    for (name, roff) in &pages {
        fs::write(output_dir.join(name), roff)?;
    }

    let main_page = output_dir.join("bootseal.1");
    println!(
        "Generated {} man pages in {}",
        pages.len(),
        output_dir.display()
    );
    println!("\nTo view the main page:");
    println!("  man -l {}", main_page.display());
    println!("\nTo install system-wide (requires sudo):");
    println!(
        "  sudo cp {}/*.1 /usr/local/share/man/man1/",
        output_dir.display()
    );
    println!("  sudo mandb");

    Ok(())
}
