//! Transport trait definitions

use alloc::boxed::Box;
use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::task::Task;

bitflags! {
    /// Transport capability flags
    ///
    /// Each flag promises that the matching optional method of
    /// [`Transport`] is implemented. Without the flag the driver falls back
    /// to issuing bus cycles one at a time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransportFeatures: u32 {
        /// `read_batch` is implemented
        const READ_BATCH            = 1 << 0;
        /// `program_batch` is implemented
        const PROGRAM_BATCH         = 1 << 1;
        /// `erase_chip_native` is implemented
        const NATIVE_CHIP_ERASE     = 1 << 2;
        /// `read_manufacturer_id` is implemented
        const READ_MANUFACTURER_ID  = 1 << 3;
        /// `read_device_id` is implemented
        const READ_DEVICE_ID        = 1 << 4;
        /// `read_block_protection` is implemented
        const READ_BLOCK_PROTECTION = 1 << 5;

        /// Shorthand for both batch transfers
        const BATCH = Self::READ_BATCH.bits() | Self::PROGRAM_BATCH.bits();
        /// Shorthand for both native ID reads
        const NATIVE_ID = Self::READ_MANUFACTURER_ID.bits() | Self::READ_DEVICE_ID.bits();
    }
}

impl Default for TransportFeatures {
    fn default() -> Self {
        TransportFeatures::empty()
    }
}

/// Bus access to the flash dies of one cartridge
///
/// All calls are blocking round-trips. The transport is shared by every
/// chip on the cartridge; `chip` selects the die.
///
/// Only `features`, `read_unit`, `write_unit` and `delay_us` are
/// required. The batch and native methods default to
/// `Error::Unsupported` and must be overridden when the matching
/// [`TransportFeatures`] flag is reported.
///
/// Batch and native methods receive the caller's task (already rescaled
/// by the driver) and may report progress in any unit after calling
/// `on_task_start`. Batch methods return the number of bytes transferred,
/// which is short of the request only when the task was cancelled. On
/// failure the returned error carries the number of bytes completed.
pub trait Transport {
    /// Capabilities of this transport
    fn features(&self) -> TransportFeatures;

    /// Read one byte from `address` on chip `chip`
    fn read_unit(&mut self, chip: u8, address: u32) -> Result<u8>;

    /// Write one bus word to `address` on chip `chip`
    ///
    /// Command cycles only use the low byte.
    fn write_unit(&mut self, chip: u8, address: u32, value: u16) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Read `buf.len()` bytes starting at `address`
    fn read_batch(
        &mut self,
        _chip: u8,
        _address: u32,
        _buf: &mut [u8],
        _task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Program `data` starting at `address` (the region must be erased)
    fn program_batch(
        &mut self,
        _chip: u8,
        _address: u32,
        _data: &[u8],
        _task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Start a whole-chip erase using the programmer's own sequence
    fn erase_chip_native(&mut self, _chip: u8, _task: Option<&mut dyn Task>) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Read the manufacturer ID without autoselect cycles
    fn read_manufacturer_id(&mut self, _chip: u8, _task: Option<&mut dyn Task>) -> Result<u8> {
        Err(Error::Unsupported)
    }

    /// Read the device ID without autoselect cycles
    fn read_device_id(&mut self, _chip: u8, _task: Option<&mut dyn Task>) -> Result<u8> {
        Err(Error::Unsupported)
    }

    /// Whether the block at chip-relative `address` is protected
    fn read_block_protection(&mut self, _chip: u8, _address: u32) -> Result<bool> {
        Err(Error::Unsupported)
    }

    /// Whether `read_batch` may be used
    fn supports_read_batch(&self) -> bool {
        self.features().contains(TransportFeatures::READ_BATCH)
    }

    /// Whether `program_batch` may be used
    fn supports_program_batch(&self) -> bool {
        self.features().contains(TransportFeatures::PROGRAM_BATCH)
    }

    /// Whether `erase_chip_native` may be used
    fn supports_native_chip_erase(&self) -> bool {
        self.features().contains(TransportFeatures::NATIVE_CHIP_ERASE)
    }

    /// Whether `read_manufacturer_id` may be used
    fn supports_read_manufacturer_id(&self) -> bool {
        self.features().contains(TransportFeatures::READ_MANUFACTURER_ID)
    }

    /// Whether `read_device_id` may be used
    fn supports_read_device_id(&self) -> bool {
        self.features().contains(TransportFeatures::READ_DEVICE_ID)
    }

    /// Whether `read_block_protection` may be used
    fn supports_block_protection(&self) -> bool {
        self.features().contains(TransportFeatures::READ_BLOCK_PROTECTION)
    }
}

/// Type-erased transport, as returned by the programmer registry
pub type BoxedTransport = Box<dyn Transport>;

// Blanket impl for boxed transports to allow trait objects
impl Transport for Box<dyn Transport> {
    fn features(&self) -> TransportFeatures {
        (**self).features()
    }

    fn read_unit(&mut self, chip: u8, address: u32) -> Result<u8> {
        (**self).read_unit(chip, address)
    }

    fn write_unit(&mut self, chip: u8, address: u32, value: u16) -> Result<()> {
        (**self).write_unit(chip, address, value)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn read_batch(
        &mut self,
        chip: u8,
        address: u32,
        buf: &mut [u8],
        task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        (**self).read_batch(chip, address, buf, task)
    }

    fn program_batch(
        &mut self,
        chip: u8,
        address: u32,
        data: &[u8],
        task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        (**self).program_batch(chip, address, data, task)
    }

    fn erase_chip_native(&mut self, chip: u8, task: Option<&mut dyn Task>) -> Result<()> {
        (**self).erase_chip_native(chip, task)
    }

    fn read_manufacturer_id(&mut self, chip: u8, task: Option<&mut dyn Task>) -> Result<u8> {
        (**self).read_manufacturer_id(chip, task)
    }

    fn read_device_id(&mut self, chip: u8, task: Option<&mut dyn Task>) -> Result<u8> {
        (**self).read_device_id(chip, task)
    }

    fn read_block_protection(&mut self, chip: u8, address: u32) -> Result<bool> {
        (**self).read_block_protection(chip, address)
    }
}
