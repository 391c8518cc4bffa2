//! CLI command implementations
//!
//! Every command works on a [`cartflash_flash::CartridgeHandle`] and
//! reports progress through an indicatif progress bar.

mod cartridge;
mod list;
mod progress;
mod save;

pub use cartridge::{run_backup, run_erase, run_info, run_verify, run_write};
pub use list::{list_parts, list_programmers};
pub use save::{run_backup_save, run_restore_save};
