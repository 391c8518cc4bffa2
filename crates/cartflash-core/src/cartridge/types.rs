//! Cartridge, chip and block geometry

use alloc::vec::Vec;

use super::system::System;
use crate::error::{Error, Result};

/// An erase block inside a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Base address relative to the owning chip
    pub base: u32,
    /// Size in bytes
    pub size: u32,
    /// Whether the block is write protected (ROM rather than save data)
    pub protected: bool,
}

impl Block {
    /// Create an unprotected block
    pub const fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            size,
            protected: false,
        }
    }

    /// Exclusive end address (chip-relative), saturating at `u32::MAX`
    pub const fn end(&self) -> u32 {
        self.base.saturating_add(self.size)
    }

    /// Whether a chip-relative address falls in this block
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Static geometry of one flash die
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    base: u32,
    size: u32,
    blocks: Vec<Block>,
}

impl Chip {
    /// Create a chip from its block table
    ///
    /// The blocks must start at 0, be ascending and contiguous, and add up
    /// to `size`. The chip must end inside the 32-bit address space.
    pub fn new(base: u32, size: u32, blocks: Vec<Block>) -> Result<Self> {
        if base.checked_add(size).is_none() {
            return Err(Error::OutOfRange {
                value: base,
                limit: u32::MAX - size,
            });
        }

        let mut expected = 0u32;
        for block in &blocks {
            if block.base != expected || block.size == 0 {
                return Err(Error::OutOfRange {
                    value: block.base,
                    limit: size,
                });
            }
            expected = block.base.checked_add(block.size).ok_or(Error::OutOfRange {
                value: block.base,
                limit: size,
            })?;
        }
        if expected != size {
            return Err(Error::OutOfRange {
                value: expected,
                limit: size,
            });
        }

        Ok(Self { base, size, blocks })
    }

    /// Base address inside the cartridge
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end address inside the cartridge
    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Whether a cartridge address falls in this chip
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.end()
    }

    /// The block table
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block at `index`
    pub fn block(&self, index: usize) -> Result<&Block> {
        self.blocks.get(index).ok_or(Error::OutOfRange {
            value: index as u32,
            limit: self.blocks.len() as u32,
        })
    }

    /// Index of the block containing a chip-relative address
    pub fn block_index_for_address(&self, address: u32) -> Result<usize> {
        if address >= self.size {
            return Err(Error::OutOfRange {
                value: address,
                limit: self.size,
            });
        }
        // Blocks are ascending and gap-free, so the containing block is the
        // last one starting at or below the address.
        let index = self.blocks.partition_point(|block| block.base <= address);
        Ok(index - 1)
    }

    /// Chip-relative base address of block `index`
    pub fn block_base_address(&self, index: usize) -> Result<u32> {
        Ok(self.block(index)?.base)
    }

    /// Size of block `index`
    pub fn block_size(&self, index: usize) -> Result<u32> {
        Ok(self.block(index)?.size)
    }

    /// Mark a block as protected or not
    pub fn set_block_protected(&mut self, index: usize, protected: bool) -> Result<()> {
        let limit = self.blocks.len() as u32;
        let block = self.blocks.get_mut(index).ok_or(Error::OutOfRange {
            value: index as u32,
            limit,
        })?;
        block.protected = protected;
        Ok(())
    }
}

/// Where a cartridge address lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Chip index
    pub chip: usize,
    /// Block index inside the chip
    pub block: usize,
    /// Address relative to the chip
    pub chip_offset: u32,
}

/// A block seen from the cartridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// Chip index
    pub chip: usize,
    /// Block index inside the chip
    pub index: usize,
    /// Flat cartridge address of the block
    pub address: u32,
    /// Size in bytes
    pub size: u32,
    /// Whether the block is protected
    pub protected: bool,
}

impl BlockRef {
    /// Exclusive end address in the cartridge
    pub fn end(&self) -> u32 {
        self.address.saturating_add(self.size)
    }
}

/// A cartridge made of one or more flash dies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cartridge {
    system: System,
    chips: Vec<Chip>,
    size: u32,
}

impl Cartridge {
    /// Create a cartridge from its chips
    ///
    /// Chips must be listed in address order starting at 0 with no gaps,
    /// and the whole cartridge must fit the console's address space.
    pub fn new(system: System, chips: Vec<Chip>) -> Result<Self> {
        let mut expected = 0u32;
        for chip in &chips {
            if chip.base() != expected {
                return Err(Error::OutOfRange {
                    value: chip.base(),
                    limit: expected,
                });
            }
            expected = chip.end();
        }
        if system.base_address().checked_add(expected).is_none() {
            return Err(Error::OutOfRange {
                value: expected,
                limit: u32::MAX - system.base_address(),
            });
        }

        Ok(Self {
            system,
            chips,
            size: expected,
        })
    }

    /// Build a cartridge from chip capacities using the system's block
    /// layout
    pub fn from_chip_sizes(system: System, sizes: &[u32]) -> Result<Self> {
        let mut chips = Vec::with_capacity(sizes.len());
        let mut base = 0u32;
        for &size in sizes {
            chips.push(Chip::new(base, size, system.block_layout(size)?)?);
            base = base.checked_add(size).ok_or(Error::OutOfRange {
                value: base,
                limit: u32::MAX - size,
            })?;
        }
        Self::new(system, chips)
    }

    /// Console family
    pub fn system(&self) -> System {
        self.system
    }

    /// Total addressable size
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Base of the cartridge in the console's address space
    pub fn base_address(&self) -> u32 {
        self.system.base_address()
    }

    /// The chips in address order
    pub fn chips(&self) -> &[Chip] {
        &self.chips
    }

    /// Mutable access to the chips (used while detecting protection)
    pub fn chips_mut(&mut self) -> &mut [Chip] {
        &mut self.chips
    }

    /// Number of chips
    pub fn chip_count(&self) -> usize {
        self.chips.len()
    }

    /// Chip at `index`
    pub fn chip(&self, index: usize) -> Result<&Chip> {
        self.chips.get(index).ok_or(Error::OutOfRange {
            value: index as u32,
            limit: self.chips.len() as u32,
        })
    }

    /// Index of the chip containing a cartridge address
    pub fn chip_for_address(&self, address: u32) -> Result<usize> {
        if address >= self.size {
            return Err(Error::OutOfRange {
                value: address,
                limit: self.size,
            });
        }
        let index = self.chips.partition_point(|chip| chip.base() <= address);
        Ok(index - 1)
    }

    /// Block index of a cartridge address within chip `chip`
    pub fn block_index_for_address(&self, chip: usize, address: u32) -> Result<usize> {
        let chip = self.chip(chip)?;
        if !chip.contains(address) {
            return Err(Error::OutOfRange {
                value: address,
                limit: chip.end(),
            });
        }
        chip.block_index_for_address(address - chip.base())
    }

    /// Cartridge address of block `block` in chip `chip`
    pub fn block_base_address(&self, chip: usize, block: usize) -> Result<u32> {
        let chip = self.chip(chip)?;
        Ok(chip.base() + chip.block_base_address(block)?)
    }

    /// Resolve a cartridge address to chip, block and chip offset
    pub fn locate(&self, address: u32) -> Result<Location> {
        let chip = self.chip_for_address(address)?;
        let chip_offset = address - self.chips[chip].base();
        let block = self.chips[chip].block_index_for_address(chip_offset)?;
        Ok(Location {
            chip,
            block,
            chip_offset,
        })
    }

    /// Every block on the cartridge in address order
    pub fn blocks(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.chips.iter().enumerate().flat_map(|(chip_index, chip)| {
            chip.blocks()
                .iter()
                .enumerate()
                .map(move |(index, block)| BlockRef {
                    chip: chip_index,
                    index,
                    address: chip.base() + block.base,
                    size: block.size,
                    protected: block.protected,
                })
        })
    }

    /// Blocks that may be erased and written
    pub fn unprotected_blocks(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.blocks().filter(|block| !block.protected)
    }

    /// Blocks overlapping `[address, address + len)`
    pub fn blocks_in_range(&self, address: u32, len: u32) -> Result<Vec<BlockRef>> {
        let end = self.check_range(address, len)?;
        Ok(self
            .blocks()
            .filter(|block| block.address < end && block.end() > address)
            .collect())
    }

    /// Check `[address, address + len)` lies inside the cartridge and
    /// return the exclusive end
    pub fn check_range(&self, address: u32, len: u32) -> Result<u32> {
        match address.checked_add(len) {
            Some(end) if end <= self.size => Ok(end),
            _ => Err(Error::OutOfRange {
                value: address.saturating_add(len),
                limit: self.size,
            }),
        }
    }

    /// Convert a cartridge address to a console address
    pub fn to_console_address(&self, address: u32) -> u32 {
        self.base_address() + address
    }

    /// Convert a console address back to a cartridge address
    pub fn from_console_address(&self, address: u32) -> Result<u32> {
        address
            .checked_sub(self.base_address())
            .filter(|&flat| flat < self.size)
            .ok_or(Error::OutOfRange {
                value: address,
                limit: self.base_address() + self.size,
            })
    }
}
