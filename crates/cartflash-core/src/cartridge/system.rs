//! Console families and their flash command constants

use alloc::vec::Vec;
use core::fmt;

use super::layout::{boot_block_layout, uniform_layout, MAIN_BLOCK_SIZE, NGP_BOOT_BLOCKS};
use super::types::Block;
use crate::error::Result;

/// Addresses and sizes a console's cartridges use for flash commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    /// First unlock address (receives 0xAA and the command byte)
    pub unlock1: u32,
    /// Second unlock address (receives 0x55)
    pub unlock2: u32,
    /// Erase sector size used when no block table is available
    pub sector_size: u32,
    /// Autoselect offset of the manufacturer ID
    pub manufacturer_offset: u32,
    /// Autoselect offset of the device ID
    pub device_offset: u32,
}

impl CommandSet {
    /// Round `address` down to its sector boundary
    pub fn sector_base(&self, address: u32) -> u32 {
        address & !(self.sector_size - 1)
    }
}

/// Console family a cartridge targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum System {
    /// SNK Neo Geo Pocket / Pocket Color
    NeoGeoPocket,
    /// Bandai WonderSwan / WonderSwan Color
    WonderSwan,
}

impl System {
    /// All supported systems
    pub const ALL: [System; 2] = [System::NeoGeoPocket, System::WonderSwan];

    /// Command constants for this system's cartridges
    pub const fn command_set(self) -> CommandSet {
        match self {
            System::NeoGeoPocket => CommandSet {
                unlock1: 0x5555,
                unlock2: 0x2AAA,
                sector_size: 0x1_0000,
                manufacturer_offset: 0x0000,
                device_offset: 0x0002,
            },
            System::WonderSwan => CommandSet {
                unlock1: 0x0AAA,
                unlock2: 0x0555,
                sector_size: 0x2_0000,
                manufacturer_offset: 0x0000,
                device_offset: 0x0002,
            },
        }
    }

    /// Where the cartridge appears in the console's address space
    pub const fn base_address(self) -> u32 {
        match self {
            System::NeoGeoPocket => 0x20_0000,
            System::WonderSwan => 0x00_0000,
        }
    }

    /// Maximum number of flash dies on one cartridge
    pub const fn max_chips(self) -> u8 {
        match self {
            System::NeoGeoPocket => 2,
            System::WonderSwan => 1,
        }
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            System::NeoGeoPocket => "Neo Geo Pocket",
            System::WonderSwan => "WonderSwan",
        }
    }

    /// Short name used on the command line
    pub const fn short_name(self) -> &'static str {
        match self {
            System::NeoGeoPocket => "ngp",
            System::WonderSwan => "ws",
        }
    }

    /// Look up a system by short or long name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|system| {
            name.eq_ignore_ascii_case(system.short_name())
                || name.eq_ignore_ascii_case(system.name())
        })
    }

    /// Block table for a chip of `chip_size` bytes on this system
    pub fn block_layout(self, chip_size: u32) -> Result<Vec<Block>> {
        match self {
            System::NeoGeoPocket => boot_block_layout(chip_size, MAIN_BLOCK_SIZE, &NGP_BOOT_BLOCKS),
            System::WonderSwan => uniform_layout(chip_size, self.command_set().sector_size),
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(System::from_name("ngp"), Some(System::NeoGeoPocket));
        assert_eq!(System::from_name("WS"), Some(System::WonderSwan));
        assert_eq!(System::from_name("neo geo pocket"), Some(System::NeoGeoPocket));
        assert_eq!(System::from_name("gba"), None);
    }

    #[test]
    fn test_sector_base() {
        let ngp = System::NeoGeoPocket.command_set();
        assert_eq!(ngp.sector_base(0x1_2345), 0x1_0000);
        let ws = System::WonderSwan.command_set();
        assert_eq!(ws.sector_base(0x1234), 0);
        assert_eq!(ws.sector_base(0x1_0000), 0);
        assert_eq!(ws.sector_base(0x2_0001), 0x2_0000);
    }

    #[test]
    fn test_ngp_layout_sizes() {
        let blocks = System::NeoGeoPocket.block_layout(0x20_0000).unwrap();
        // 31 main blocks plus 4 boot blocks
        assert_eq!(blocks.len(), 35);
        assert_eq!(blocks[30].size, 0x1_0000);
        assert_eq!(blocks[31].size, 0x8000);
        assert_eq!(blocks[34].size, 0x4000);
    }
}
