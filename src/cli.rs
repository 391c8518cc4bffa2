//! CLI argument parsing

use cartflash_flash::System;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        cartflash_flash::programmer_names_short()
    )
}

/// Console family selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemArg {
    /// Neo Geo Pocket / Pocket Color
    Ngp,
    /// WonderSwan / WonderSwan Color
    Ws,
}

impl From<SystemArg> for System {
    fn from(arg: SystemArg) -> Self {
        match arg {
            SystemArg::Ngp => System::NeoGeoPocket,
            SystemArg::Ws => System::WonderSwan,
        }
    }
}

#[derive(Parser)]
#[command(name = "cartflash")]
#[command(author, version, about = "Flash cartridge programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Programmer and cartridge selection shared by every cartridge command
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Programmer to use
    #[arg(short, long, help = programmer_help())]
    pub programmer: String,

    /// Console family of the inserted cartridge
    #[arg(short, long, value_enum, default_value_t = SystemArg::Ngp)]
    pub system: SystemArg,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the detected cartridge and its block layout
    Info {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Read cartridge contents to file
    Backup {
        #[command(flatten)]
        target: TargetArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Cartridge address to start at (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Number of bytes to read (defaults to the rest of the cartridge)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Write file to the cartridge
    Write {
        #[command(flatten)]
        target: TargetArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Cartridge address to write at (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Skip the read-back comparison after writing
        #[arg(long)]
        no_verify: bool,
    },

    /// Compare cartridge contents against a file
    Verify {
        #[command(flatten)]
        target: TargetArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Cartridge address to compare from (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,
    },

    /// Erase the cartridge
    Erase {
        #[command(flatten)]
        target: TargetArgs,

        /// Only erase unprotected (save) blocks
        #[arg(long)]
        save_only: bool,
    },

    /// Store the save blocks in a save file
    BackupSave {
        #[command(flatten)]
        target: TargetArgs,

        /// Output save file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a save file back to the cartridge
    RestoreSave {
        #[command(flatten)]
        target: TargetArgs,

        /// Input save file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List available programmers
    ListProgrammers,

    /// List known flash parts
    ListParts {
        /// Filter by vendor name
        #[arg(long)]
        vendor: Option<String>,
    },
}
