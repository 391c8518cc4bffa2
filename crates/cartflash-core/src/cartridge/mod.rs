//! Cartridge address model
//!
//! Static geometry only, no I/O. A [`Cartridge`] is an ordered list of
//! [`Chip`]s laid out back to back from address 0; every chip owns an
//! ascending, gap-free list of [`Block`]s. Blocks need not be uniform:
//! Neo Geo Pocket parts split their topmost 64 KiB into smaller boot
//! blocks.
//!
//! All addresses handed to this module are flat cartridge addresses
//! (0 = first byte of the first chip) unless a function says otherwise.
//! [`Cartridge::to_console_address`] converts to the address the console
//! sees, which is what save files store.

mod layout;
mod system;
mod types;

pub use layout::{boot_block_layout, uniform_layout, MAIN_BLOCK_SIZE, NGP_BOOT_BLOCKS};
pub use system::{CommandSet, System};
pub use types::{Block, BlockRef, Cartridge, Chip, Location};
