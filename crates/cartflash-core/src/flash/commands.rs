//! JEDEC-style flash command bytes
//!
//! Every command except the blank-check probe is a three-cycle sequence:
//! `UNLOCK1` to the first unlock address, `UNLOCK2` to the second, then
//! the command byte to the first unlock address again.

// ============================================================================
// Unlock handshake
// ============================================================================

/// First unlock cycle
pub const UNLOCK1: u8 = 0xAA;
/// Second unlock cycle
pub const UNLOCK2: u8 = 0x55;

// ============================================================================
// Commands
// ============================================================================

/// Return to read array mode
pub const RESET: u8 = 0xF0;
/// Enter autoselect (identification) mode
pub const AUTOSELECT: u8 = 0x90;
/// Program one word; the next bus cycle carries address and data
pub const PROGRAM: u8 = 0xA0;
/// Erase setup; must be followed by a second unlock and a confirm byte
pub const ERASE_SETUP: u8 = 0x80;
/// Erase confirm for the whole chip (sent to the first unlock address)
pub const CHIP_ERASE: u8 = 0x10;
/// Erase confirm for one block (sent to the block address)
pub const BLOCK_ERASE: u8 = 0x30;

// ============================================================================
// Erase status probe
// ============================================================================

/// Blank-check probe written to the erased address after the unlock
/// cycles; the following read returns 0 while the erase is running
pub const BLANK_CHECK: [u8; 5] = [0xEB, 0x76, 0x00, 0x00, 0x29];
