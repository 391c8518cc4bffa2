//! cartflash - A flash cartridge programmer
//!
//! Reads, writes and erases the NOR flash inside handheld game cartridges
//! and moves save data in and out of them.
//!
//! # Architecture
//!
//! The CLI opens a programmer by name through `cartflash-flash`, which
//! identifies every flash die on the cartridge and hands back a
//! `CartridgeHandle`. Every command below is a thin wrapper around one
//! handle operation, so the same commands work with any programmer.

mod cli;
mod commands;

use cartflash_flash::{open_cartridge, CartridgeHandle};
use clap::Parser;
use cli::{Cli, Commands, TargetArgs};

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

    match cli.command {
        Commands::Info { target } => {
            let handle = open(&target)?;
            commands::run_info(&handle);
            Ok(())
        }
        Commands::Backup {
            target,
            output,
            offset,
            length,
        } => {
            let mut handle = open(&target)?;
            commands::run_backup(&mut handle, &output, offset, length)
        }
        Commands::Write {
            target,
            input,
            offset,
            no_verify,
        } => {
            let mut handle = open(&target)?;
            commands::run_write(&mut handle, &input, offset, !no_verify)
        }
        Commands::Verify {
            target,
            input,
            offset,
        } => {
            let mut handle = open(&target)?;
            commands::run_verify(&mut handle, &input, offset)
        }
        Commands::Erase { target, save_only } => {
            let mut handle = open(&target)?;
            commands::run_erase(&mut handle, save_only)
        }
        Commands::BackupSave { target, output } => {
            let mut handle = open(&target)?;
            commands::run_backup_save(&mut handle, &output)
        }
        Commands::RestoreSave { target, input } => {
            let mut handle = open(&target)?;
            commands::run_restore_save(&mut handle, &input)
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
        Commands::ListParts { vendor } => {
            commands::list_parts(vendor.as_deref());
            Ok(())
        }
    }
}

/// Open the programmer and detect the cartridge
fn open(target: &TargetArgs) -> Result<CartridgeHandle, Box<dyn std::error::Error>> {
    let handle = open_cartridge(&target.programmer, target.system.into())?;
    Ok(handle)
}
