//! Whole-cartridge commands: info, backup, write, verify, erase

use cartflash_flash::CartridgeHandle;
use std::fs;
use std::path::Path;

use super::progress::IndicatifProgress;

/// Print cartridge size information
fn print_cartridge_size(handle: &CartridgeHandle) {
    println!(
        "Cartridge size: {} bytes ({} KiB, {} chip(s))",
        handle.size(),
        handle.size() / 1024,
        handle.chip_count()
    );
}

/// Read file contents into a Vec
pub(super) fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Show the detected parts and block layout
pub fn run_info(handle: &CartridgeHandle) {
    let cartridge = handle.cartridge();

    println!("Cartridge Information");
    println!("=====================");
    println!();
    println!("System:          {}", handle.system());
    println!(
        "Size:            {} bytes ({} KiB)",
        handle.size(),
        handle.size() / 1024
    );
    println!("Console address: 0x{:06X}", cartridge.base_address());
    println!("Chips:           {}", handle.chip_count());

    for (index, (part, chip)) in handle.parts().iter().zip(cartridge.chips()).enumerate() {
        println!();
        println!(
            "Chip {}: {} {} (ID {}) at 0x{:06X}",
            index,
            part.vendor,
            part.name,
            part.id,
            chip.base()
        );
        println!("  {:<4} {:>10} {:>10}  {}", "#", "Address", "Size", "State");
        for (block_index, block) in chip.blocks().iter().enumerate() {
            println!(
                "  {:<4} 0x{:08X} {:>10}  {}",
                block_index,
                chip.base() + block.base,
                block.size,
                if block.protected { "protected" } else { "writable" }
            );
        }
    }
}

/// Read `length` bytes from `offset` into a file
pub fn run_backup(
    handle: &mut CartridgeHandle,
    output: &Path,
    offset: u32,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    print_cartridge_size(handle);

    let length = match length {
        Some(length) => length,
        None => handle.size().checked_sub(offset).ok_or_else(|| {
            format!(
                "Offset 0x{:X} is beyond the cartridge (0x{:X} bytes)",
                offset,
                handle.size()
            )
        })?,
    };

    let mut data = vec![0u8; length as usize];
    let mut progress = IndicatifProgress::new("Reading");
    handle.read(offset, &mut data, Some(&mut progress))?;

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Compare cartridge contents against `expected`
fn verify_data(
    handle: &mut CartridgeHandle,
    offset: u32,
    expected: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Verifying");
    handle.verify(offset, expected, Some(&mut progress))?;
    Ok(())
}

/// Write a file at `offset`, then read it back unless told otherwise
pub fn run_write(
    handle: &mut CartridgeHandle,
    input: &Path,
    offset: u32,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    print_cartridge_size(handle);
    let data = read_file(input)?;

    let available = handle.size().saturating_sub(offset) as usize;
    if data.len() > available {
        return Err(format!(
            "File size ({} bytes) exceeds cartridge space at 0x{:X} ({} bytes)",
            data.len(),
            offset,
            available
        )
        .into());
    }

    let mut progress = IndicatifProgress::new("Writing");
    handle.write(offset, &data, Some(&mut progress))?;

    if verify {
        verify_data(handle, offset, &data)?;
        println!("Verification passed!");
    }
    Ok(())
}

/// Compare a file against the cartridge
pub fn run_verify(
    handle: &mut CartridgeHandle,
    input: &Path,
    offset: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    print_cartridge_size(handle);
    let expected = read_file(input)?;
    verify_data(handle, offset, &expected)?;
    println!("Verification passed!");
    Ok(())
}

/// Erase the whole cartridge, or only its save blocks
pub fn run_erase(
    handle: &mut CartridgeHandle,
    save_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    print_cartridge_size(handle);

    let mut progress = IndicatifProgress::new("Erasing");
    if save_only {
        let erased = handle.erase_save_area(Some(&mut progress))?;
        println!("Erased {} save block(s)", erased);
    } else {
        handle.erase(Some(&mut progress))?;
        println!("Cartridge erased");
    }
    Ok(())
}
