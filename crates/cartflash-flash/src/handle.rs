//! CartridgeHandle - a detected cartridge behind an open programmer
//!
//! The handle owns the transport (type-erased) together with the cartridge
//! geometry found during detection, so callers only deal in cartridge
//! addresses.

use cartflash_core::cartridge::{Cartridge, System};
use cartflash_core::chip::FlashPart;
use cartflash_core::error::Result;
use cartflash_core::flash::{self, CartridgeSession};
use cartflash_core::save::SaveImage;
use cartflash_core::task::Task;
use cartflash_core::transport::BoxedTransport;

/// Unified cartridge programming handle
///
/// Every operation takes an optional [`Task`] that receives progress in
/// bytes and may cancel the transfer.
pub struct CartridgeHandle {
    session: CartridgeSession<BoxedTransport>,
}

impl core::fmt::Debug for CartridgeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CartridgeHandle").finish_non_exhaustive()
    }
}

impl CartridgeHandle {
    pub(crate) fn new(session: CartridgeSession<BoxedTransport>) -> Self {
        Self { session }
    }

    /// Console family
    pub fn system(&self) -> System {
        self.session.cartridge().system()
    }

    /// Total cartridge size in bytes
    pub fn size(&self) -> u32 {
        self.session.cartridge().size()
    }

    /// Number of flash dies
    pub fn chip_count(&self) -> usize {
        self.session.cartridge().chip_count()
    }

    /// Cartridge geometry
    pub fn cartridge(&self) -> &Cartridge {
        self.session.cartridge()
    }

    /// Identified parts, one per chip
    pub fn parts(&self) -> &[FlashPart] {
        self.session.parts()
    }

    /// Read from the cartridge
    ///
    /// Returns the number of bytes read, short only if cancelled.
    pub fn read(
        &mut self,
        addr: u32,
        buf: &mut [u8],
        task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        flash::read_cartridge(&mut self.session, addr, buf, task)
    }

    /// Write to the cartridge, erasing the blocks the data touches
    pub fn write(&mut self, addr: u32, data: &[u8], task: Option<&mut dyn Task>) -> Result<()> {
        flash::write_cartridge(&mut self.session, addr, data, task)
    }

    /// Compare cartridge contents against `data`
    ///
    /// Returns the number of bytes compared, short only if cancelled.
    pub fn verify(&mut self, addr: u32, data: &[u8], task: Option<&mut dyn Task>) -> Result<usize> {
        flash::verify_cartridge(&mut self.session, addr, data, task)
    }

    /// Erase every chip
    pub fn erase(&mut self, task: Option<&mut dyn Task>) -> Result<()> {
        flash::erase_cartridge(&mut self.session, task)
    }

    /// Erase every unprotected block, returning how many were erased
    pub fn erase_save_area(&mut self, task: Option<&mut dyn Task>) -> Result<usize> {
        flash::erase_unprotected_blocks(&mut self.session, task)
    }

    /// Capture the save blocks
    pub fn backup_save(&mut self, task: Option<&mut dyn Task>) -> Result<SaveImage> {
        flash::backup_save(&mut self.session, task)
    }

    /// Write a save image back
    pub fn restore_save(&mut self, image: &SaveImage, task: Option<&mut dyn Task>) -> Result<()> {
        flash::restore_save(&mut self.session, image, task)
    }

    /// Return every chip to read mode
    pub fn reset(&mut self) -> Result<()> {
        self.session.reset()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::open_cartridge;
    use cartflash_core::task::{TaskProgress, TaskStatus};

    #[test]
    fn test_write_read_through_handle() {
        let mut handle = open_cartridge("dummy:size=512K", System::NeoGeoPocket).unwrap();
        let data: Vec<u8> = (0..0x100u32).map(|i| i as u8).collect();

        let mut progress = TaskProgress::new();
        handle.write(0x7_A000, &data, Some(&mut progress)).unwrap();
        assert_eq!(progress.status(), TaskStatus::Completed);
        assert_eq!(progress.progress(), 0x2000);

        let mut buf = vec![0u8; data.len()];
        assert_eq!(handle.read(0x7_A000, &mut buf, None).unwrap(), data.len());
        assert_eq!(buf, data);
        assert_eq!(handle.verify(0x7_A000, &data, None).unwrap(), data.len());
    }

    #[test]
    fn test_save_round_trip_through_handle() {
        let mut handle = open_cartridge("dummy:size=512K,protect=7", System::NeoGeoPocket).unwrap();
        handle.write(0x7_8000, &[0x12, 0x34], None).unwrap();

        let image = handle.backup_save(None).unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.blocks()[0].address, 0x27_8000);

        assert_eq!(handle.erase_save_area(None).unwrap(), 4);
        handle.restore_save(&image, None).unwrap();

        let mut buf = [0u8; 2];
        handle.read(0x7_8000, &mut buf, None).unwrap();
        assert_eq!(buf, [0x12, 0x34]);
    }
}
