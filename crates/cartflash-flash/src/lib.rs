//! High-level cartridge programming abstraction
//!
//! This crate opens a programmer by name, detects the cartridge behind it
//! and hands back a [`CartridgeHandle`]. The CLI only talks to this crate
//! and to the core types it re-exports, never to a transport directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CLI (bin/cartflash)                     │
//! │  - Only imports cartflash-flash and cartflash-core types     │
//! │  - Never sees a Transport                                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  cartflash-flash (this crate)                │
//! │  - CartridgeHandle: detected cartridge + boxed transport     │
//! │  - Registry: opens programmers by name                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │    cartflash-core        │   │  Programmer crates       │
//! │  - FlashChip driver      │   │  - dummy                 │
//! │  - Cartridge geometry    │   │  - Implement Transport   │
//! │  - Save container        │   │                          │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cartflash_flash::{open_cartridge, System};
//!
//! let mut handle = open_cartridge("dummy:chips=2,size=2M", System::NeoGeoPocket)?;
//! let mut buffer = vec![0u8; handle.size() as usize];
//! handle.read(0, &mut buffer, None)?;
//! ```

mod error;
mod handle;
mod registry;

pub use error::OpenError;
pub use handle::CartridgeHandle;
pub use registry::{
    available_programmers, open_cartridge, parse_programmer_params, parse_size,
    programmer_names_short, ProgrammerInfo, ProgrammerParams,
};

// Re-export core types that the CLI needs
pub use cartflash_core::cartridge::System;
pub use cartflash_core::save::SaveImage;
pub use cartflash_core::task::{Task, TaskStatus};
