//! Block table construction
//!
//! Block layouts are a function of chip capacity. They are built once
//! when a chip is identified and never change afterwards.

use alloc::vec::Vec;

use super::types::Block;
use crate::error::{Error, Result};

/// Size of a regular (non-boot) block
pub const MAIN_BLOCK_SIZE: u32 = 0x1_0000;

/// Boot block split of the topmost 64 KiB on Neo Geo Pocket parts
pub const NGP_BOOT_BLOCKS: [u32; 4] = [0x8000, 0x2000, 0x2000, 0x4000];

/// Split a chip into equal blocks
pub fn uniform_layout(chip_size: u32, block_size: u32) -> Result<Vec<Block>> {
    if block_size == 0 || chip_size == 0 || chip_size % block_size != 0 {
        return Err(Error::InvalidLength {
            len: chip_size as usize,
        });
    }

    Ok((0..chip_size / block_size)
        .map(|i| Block::new(i * block_size, block_size))
        .collect())
}

/// Regular blocks followed by smaller boot blocks at the top of the chip
///
/// The boot blocks are listed in ascending address order and occupy the
/// end of the chip; everything below them is split into `main_block_size`
/// blocks.
pub fn boot_block_layout(
    chip_size: u32,
    main_block_size: u32,
    boot_blocks: &[u32],
) -> Result<Vec<Block>> {
    let boot_total = boot_blocks
        .iter()
        .try_fold(0u32, |acc, &size| {
            if size == 0 {
                None
            } else {
                acc.checked_add(size)
            }
        })
        .ok_or(Error::InvalidLength {
            len: chip_size as usize,
        })?;

    if boot_total > chip_size {
        return Err(Error::InvalidLength {
            len: chip_size as usize,
        });
    }

    let main_total = chip_size - boot_total;
    let mut blocks = if main_total == 0 {
        Vec::new()
    } else {
        uniform_layout(main_total, main_block_size)?
    };

    let mut base = main_total;
    for &size in boot_blocks {
        blocks.push(Block::new(base, size));
        base += size;
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(blocks: &[Block], chip_size: u32) {
        let mut expected_base = 0;
        for block in blocks {
            assert_eq!(block.base, expected_base, "blocks must be contiguous");
            assert!(block.size > 0);
            expected_base += block.size;
        }
        assert_eq!(expected_base, chip_size, "blocks must cover the chip");
    }

    #[test]
    fn test_uniform() {
        let blocks = uniform_layout(0x8_0000, 0x1_0000).unwrap();
        assert_eq!(blocks.len(), 8);
        assert_well_formed(&blocks, 0x8_0000);
    }

    #[test]
    fn test_uniform_rejects_partial_block() {
        assert!(uniform_layout(0x1_8000, 0x1_0000).is_err());
        assert!(uniform_layout(0x1_0000, 0).is_err());
    }

    #[test]
    fn test_ngp_4mbit() {
        let blocks = boot_block_layout(0x8_0000, MAIN_BLOCK_SIZE, &NGP_BOOT_BLOCKS).unwrap();
        assert_eq!(blocks.len(), 7 + 4);
        assert_eq!(blocks[7].base, 0x7_0000);
        assert_eq!(blocks[8].base, 0x7_8000);
        assert_eq!(blocks[9].base, 0x7_A000);
        assert_eq!(blocks[10].base, 0x7_C000);
        assert_well_formed(&blocks, 0x8_0000);
    }

    #[test]
    fn test_generated_layouts_cover_chip() {
        let boot_splits: [&[u32]; 5] = [
            &[],
            &[0x8000, 0x2000, 0x2000, 0x4000],
            &[0x4000, 0x2000, 0x2000, 0x8000],
            &[0x2000; 8],
            &[0x1_0000],
        ];

        for shift in 16..=23 {
            let chip_size = 1u32 << shift;
            for split in boot_splits {
                let boot_total: u32 = split.iter().sum();
                if boot_total > chip_size {
                    continue;
                }
                let blocks = boot_block_layout(chip_size, MAIN_BLOCK_SIZE, split).unwrap();
                assert_well_formed(&blocks, chip_size);
                assert_eq!(
                    blocks.len() as u32,
                    (chip_size - boot_total) / MAIN_BLOCK_SIZE + split.len() as u32
                );
            }
        }
    }

    #[test]
    fn test_boot_blocks_larger_than_chip() {
        assert!(boot_block_layout(0x8000, MAIN_BLOCK_SIZE, &NGP_BOOT_BLOCKS).is_err());
    }

    #[test]
    fn test_zero_sized_boot_block() {
        assert!(boot_block_layout(0x2_0000, MAIN_BLOCK_SIZE, &[0x8000, 0]).is_err());
    }
}
