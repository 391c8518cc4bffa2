//! Save file commands

use cartflash_flash::{CartridgeHandle, SaveImage};
use std::fs;
use std::path::Path;

use super::cartridge::read_file;
use super::progress::IndicatifProgress;

/// Capture the save blocks into a save file
pub fn run_backup_save(
    handle: &mut CartridgeHandle,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Reading save");
    let image = handle.backup_save(Some(&mut progress))?;

    if image.is_empty() {
        log::warn!("No save data found, writing an empty save file");
    }
    for block in image.blocks() {
        println!(
            "  0x{:06X} - 0x{:06X} ({} bytes)",
            block.address,
            block.end() - 1,
            block.data.len()
        );
    }

    let bytes = image.to_bytes()?;
    fs::write(output, &bytes)?;
    println!(
        "Wrote {} save block(s) ({} bytes) to {:?}",
        image.len(),
        bytes.len(),
        output
    );
    Ok(())
}

/// Write a save file back to the cartridge
pub fn run_restore_save(
    handle: &mut CartridgeHandle,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_file(input)?;
    let image = SaveImage::parse(&bytes)?;
    println!(
        "Save file holds {} block(s), {} bytes of data",
        image.len(),
        image.payload_len()
    );

    let mut progress = IndicatifProgress::new("Restoring save");
    handle.restore_save(&image, Some(&mut progress))?;

    println!("Save restored");
    Ok(())
}
