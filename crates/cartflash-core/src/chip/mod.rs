//! Flash part identification
//!
//! Maps the manufacturer/device ID pair read in autoselect mode to a
//! vendor name and a capacity. The capacity is what picks a chip's block
//! layout.

mod database;

pub use database::{lookup, vendor_name, FlashPart, DEVICES, VENDORS};

use core::fmt;

/// Manufacturer and device ID as read from the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipId {
    /// Manufacturer ID (autoselect offset 0)
    pub manufacturer: u8,
    /// Device ID (autoselect offset 2)
    pub device: u8,
}

impl ChipId {
    /// Create a chip ID
    pub const fn new(manufacturer: u8, device: u8) -> Self {
        Self {
            manufacturer,
            device,
        }
    }

    /// Whether nothing answered (floating or grounded bus)
    pub fn is_absent(&self) -> bool {
        matches!(self.manufacturer, 0x00 | 0xFF)
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}", self.manufacturer, self.device)
    }
}
