//! Flash chip driver and cartridge-level operations
//!
//! [`FlashChip`] is the per-die command state machine. [`detect`] builds a
//! [`CartridgeSession`] holding one `FlashChip` per die together with the
//! cartridge geometry, and the free functions in this module run whole
//! cartridge transfers on top of it.

mod chip;
pub mod commands;
mod operations;
mod session;

pub use chip::{ChipMode, FlashChip, SharedTransport};
pub use operations::*;
pub use session::{detect, CartridgeSession};
