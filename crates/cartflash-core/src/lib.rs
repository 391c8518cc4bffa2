//! cartflash-core - Core library for flash cartridge programming
//!
//! This crate drives the raw NOR flash dies inside handheld game
//! cartridges through a USB programmer. It is `no_std` compatible but
//! needs an allocator.
//!
//! The crate is split the same way the work is:
//!
//! - [`cartridge`] - static geometry: which chip and which block a flat
//!   cartridge address lands in
//! - [`task`] - progress reporting and cooperative cancellation for long
//!   transfers
//! - [`transport`] - the trait a programmer implements
//! - [`flash`] - the per-chip command state machine and the cartridge
//!   level operations built on it
//! - [`save`] - the save-game container file
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the error types
//!
//! # Example
//!
//! ```ignore
//! use cartflash_core::cartridge::System;
//! use cartflash_core::flash;
//!
//! let mut session = flash::detect(System::NeoGeoPocket, transport)?;
//! println!("Cartridge size: {} bytes", session.cartridge().size());
//! let image = flash::backup_save(&mut session, None)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod cartridge;
pub mod chip;
pub mod error;
pub mod flash;
pub mod save;
pub mod task;
pub mod transport;

pub use error::{Error, Result};
