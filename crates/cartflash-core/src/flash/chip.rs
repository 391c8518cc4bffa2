//! Per-die command state machine

use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use super::commands;
use crate::cartridge::{Chip, CommandSet};
use crate::chip::ChipId;
use crate::error::{Error, Result};
use crate::task::{ForwardingTask, Task, TaskStatus};
use crate::transport::Transport;

/// Transport handle shared by every chip on a cartridge
///
/// `Rc<RefCell<_>>` keeps the driver single-threaded by construction:
/// a `FlashChip` can be neither sent nor shared across threads.
pub type SharedTransport<T> = Rc<RefCell<T>>;

/// Operating mode of a flash die
///
/// Read is the safe default. Autoselect is only entered for
/// identification. Erase is entered by the erase commands and only left
/// once [`FlashChip::poll_erase_complete`] sees the erase finish; the
/// hardware cannot abort an erase once confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipMode {
    /// Array reads return stored data
    #[default]
    Read,
    /// Reads return identification bytes
    Autoselect,
    /// An erase is running
    Erase,
}

impl fmt::Display for ChipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Autoselect => write!(f, "autoselect"),
            Self::Erase => write!(f, "erase"),
        }
    }
}

/// Driver for one physical flash die
///
/// All addresses are relative to the chip. Operations on one instance
/// must be strictly sequential; the `&mut self` receivers and the
/// non-`Send` shared transport enforce that.
pub struct FlashChip<T: Transport> {
    transport: SharedTransport<T>,
    index: u8,
    commands: CommandSet,
    mode: ChipMode,
    last_erased_address: u32,
    geometry: Option<Chip>,
}

impl<T: Transport> FlashChip<T> {
    /// Create a driver for chip `index` behind `transport`
    ///
    /// The chip is assumed to be in read mode.
    pub fn new(transport: SharedTransport<T>, index: u8, commands: CommandSet) -> Self {
        Self {
            transport,
            index,
            commands,
            mode: ChipMode::Read,
            last_erased_address: 0,
            geometry: None,
        }
    }

    /// Attach the chip's block table
    ///
    /// With geometry attached, block erases snap to the real block
    /// boundaries and transfers are range checked.
    pub fn set_geometry(&mut self, geometry: Chip) {
        self.geometry = Some(geometry);
    }

    /// Chip index on the transport
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Current operating mode
    pub fn mode(&self) -> ChipMode {
        self.mode
    }

    /// Whether an erase is (possibly still) running
    pub fn is_erasing(&self) -> bool {
        self.mode == ChipMode::Erase
    }

    /// Address targeted by the most recent erase
    pub fn last_erased_address(&self) -> u32 {
        self.last_erased_address
    }

    /// Attached block table, if any
    pub fn geometry(&self) -> Option<&Chip> {
        self.geometry.as_ref()
    }

    /// Command constants in use
    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    /// Delay through the transport
    pub fn delay_us(&self, us: u32) {
        self.transport.borrow_mut().delay_us(us);
    }

    // =========================================================================
    // Bus cycles
    // =========================================================================

    fn write(&self, address: u32, value: u8) -> Result<()> {
        self.transport
            .borrow_mut()
            .write_unit(self.index, address, u16::from(value))
    }

    fn read(&self, address: u32) -> Result<u8> {
        self.transport.borrow_mut().read_unit(self.index, address)
    }

    fn unlock(&self) -> Result<()> {
        self.write(self.commands.unlock1, commands::UNLOCK1)?;
        self.write(self.commands.unlock2, commands::UNLOCK2)
    }

    fn send_command(&self, command: u8) -> Result<()> {
        log::trace!("chip {}: command 0x{:02X}", self.index, command);
        self.unlock()?;
        self.write(self.commands.unlock1, command)
    }

    // =========================================================================
    // Mode handling
    // =========================================================================

    fn ensure_not_erasing(&self) -> Result<()> {
        if self.mode == ChipMode::Erase {
            return Err(Error::IllegalState { mode: self.mode });
        }
        Ok(())
    }

    /// Reset the chip unless it is already in read mode
    pub fn ensure_read_mode(&mut self) -> Result<()> {
        if self.mode != ChipMode::Read {
            self.reset()?;
        }
        Ok(())
    }

    /// Without geometry a range only has to stay inside the 32-bit bus
    fn check_range(&self, address: u32, len: usize) -> Result<()> {
        let limit = self
            .geometry
            .as_ref()
            .map_or(1u64 << 32, |geometry| geometry.size() as u64);
        let end = address as u64 + len as u64;
        if end > limit {
            return Err(Error::OutOfRange {
                value: end.min(u32::MAX as u64) as u32,
                limit: limit.min(u32::MAX as u64) as u32,
            });
        }
        Ok(())
    }

    /// Return the chip to read mode
    ///
    /// Fails with `IllegalState` while an erase is running: it has to be
    /// polled to completion first.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_not_erasing()?;
        self.send_command(commands::RESET)?;
        if self.mode != ChipMode::Read {
            log::debug!("chip {}: {} -> read", self.index, self.mode);
        }
        self.mode = ChipMode::Read;
        Ok(())
    }

    /// Reset and enter autoselect mode
    pub fn enter_autoselect(&mut self) -> Result<()> {
        self.reset()?;
        self.send_command(commands::AUTOSELECT)?;
        log::debug!("chip {}: read -> autoselect", self.index);
        self.mode = ChipMode::Autoselect;
        Ok(())
    }

    // =========================================================================
    // Identification
    // =========================================================================

    fn autoselect_read(&mut self, offset: u32) -> Result<u8> {
        if self.mode != ChipMode::Autoselect {
            self.enter_autoselect()?;
        }
        self.read(offset)
    }

    /// Read the manufacturer ID
    ///
    /// Uses the transport's native ID read when available, which leaves
    /// the chip mode untouched. Otherwise the chip ends in autoselect mode.
    /// The task counts one unit for the ID.
    pub fn identify_manufacturer(&mut self, task: Option<&mut dyn Task>) -> Result<u8> {
        self.ensure_not_erasing()?;
        if self.transport.borrow().supports_read_manufacturer_id() {
            let index = self.index;
            let transport = &self.transport;
            return run_native(task, 1, |task| {
                transport.borrow_mut().read_manufacturer_id(index, task)
            });
        }
        let offset = self.commands.manufacturer_offset;
        run_native(task, 1, |_| self.autoselect_read(offset))
    }

    /// Read the device ID
    ///
    /// Same mode rules as [`identify_manufacturer`](Self::identify_manufacturer).
    pub fn identify_device(&mut self, task: Option<&mut dyn Task>) -> Result<u8> {
        self.ensure_not_erasing()?;
        if self.transport.borrow().supports_read_device_id() {
            let index = self.index;
            let transport = &self.transport;
            return run_native(task, 1, |task| {
                transport.borrow_mut().read_device_id(index, task)
            });
        }
        let offset = self.commands.device_offset;
        run_native(task, 1, |_| self.autoselect_read(offset))
    }

    /// Read both IDs
    pub fn identify(&mut self) -> Result<ChipId> {
        let manufacturer = self.identify_manufacturer(None)?;
        let device = self.identify_device(None)?;
        Ok(ChipId::new(manufacturer, device))
    }

    // =========================================================================
    // Program and erase
    // =========================================================================

    /// Program one word
    ///
    /// The chip must not be erasing; it is reset to read mode first if
    /// needed and stays in read mode.
    pub fn program_word(&mut self, address: u32, data: u16) -> Result<()> {
        self.ensure_not_erasing()?;
        self.ensure_read_mode()?;
        self.send_command(commands::PROGRAM)?;
        self.transport
            .borrow_mut()
            .write_unit(self.index, address, data)
    }

    fn begin_erase(&mut self) -> Result<()> {
        self.ensure_not_erasing()?;
        self.ensure_read_mode()?;
        self.send_command(commands::ERASE_SETUP)?;
        self.unlock()
    }

    /// Start erasing the whole chip
    ///
    /// Returns as soon as the erase is started; poll
    /// [`poll_erase_complete`](Self::poll_erase_complete) until it reports
    /// completion. The task counts the chip size in bytes (one unit
    /// without geometry) and only sees intermediate progress from a native
    /// erase.
    pub fn erase_chip(&mut self, task: Option<&mut dyn Task>) -> Result<()> {
        self.ensure_not_erasing()?;
        self.ensure_read_mode()?;
        self.last_erased_address = 0;
        let work = self
            .geometry
            .as_ref()
            .map_or(1, |geometry| geometry.size() as u64);

        if self.transport.borrow().supports_native_chip_erase() {
            let index = self.index;
            let transport = &self.transport;
            run_native(task, work, |task| {
                transport.borrow_mut().erase_chip_native(index, task)
            })?;
        } else {
            run_native(task, work, |_| {
                self.begin_erase()?;
                self.write(self.commands.unlock1, commands::CHIP_ERASE)
            })?;
        }

        log::debug!("chip {}: read -> erase (chip)", self.index);
        self.mode = ChipMode::Erase;
        Ok(())
    }

    /// Block base containing `address`
    ///
    /// Uses the block table when attached, the command set's uniform
    /// sector size otherwise.
    pub fn block_base(&self, address: u32) -> Result<u32> {
        match &self.geometry {
            Some(geometry) => {
                let index = geometry.block_index_for_address(address)?;
                geometry.block_base_address(index)
            }
            None => Ok(self.commands.sector_base(address)),
        }
    }

    /// Start erasing the block containing `address`
    ///
    /// The address is snapped down to its block boundary, which becomes
    /// the polling address.
    pub fn erase_block(&mut self, address: u32) -> Result<()> {
        self.ensure_not_erasing()?;
        let base = self.block_base(address)?;
        self.begin_erase()?;
        self.last_erased_address = base;
        self.write(base, commands::BLOCK_ERASE)?;

        log::debug!("chip {}: read -> erase (block 0x{:06X})", self.index, base);
        self.mode = ChipMode::Erase;
        Ok(())
    }

    /// Probe a running erase
    ///
    /// Returns `Ok(true)` while the erase is still running and `Ok(false)`
    /// once it has finished, at which point the chip is back in read mode.
    /// Also returns `Ok(false)`, without touching the bus, when no erase
    /// was running; check [`mode`](Self::mode) beforehand to tell the two
    /// apart. Never blocks: the caller owns the polling cadence.
    pub fn poll_erase_complete(&mut self) -> Result<bool> {
        if self.mode != ChipMode::Erase {
            return Ok(false);
        }

        let address = self.last_erased_address;
        self.unlock()?;
        for byte in commands::BLANK_CHECK {
            self.write(address, byte)?;
        }

        if self.read(address)? == 0 {
            return Ok(true);
        }

        log::debug!("chip {}: erase -> read", self.index);
        self.mode = ChipMode::Read;
        Ok(false)
    }

    /// Whether the block containing `address` is protected
    ///
    /// Asks the transport when it can tell; otherwise falls back to the
    /// attached block table, and to "unprotected" without one.
    pub fn block_protection(&mut self, address: u32) -> Result<bool> {
        self.ensure_not_erasing()?;
        let base = self.block_base(address)?;
        if self.transport.borrow().supports_block_protection() {
            return self
                .transport
                .borrow_mut()
                .read_block_protection(self.index, base);
        }
        match &self.geometry {
            Some(geometry) => {
                let index = geometry.block_index_for_address(address)?;
                Ok(geometry.block(index)?.protected)
            }
            None => Ok(false),
        }
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Read `buf.len()` bytes starting at `address`
    ///
    /// Delegates to the transport's batch read when it has one; otherwise
    /// reads one byte per bus cycle, checking for cancellation before
    /// each. Returns the number of bytes read, which is short only when
    /// the task was cancelled. The chip mode is not changed.
    pub fn read_bytes(
        &mut self,
        address: u32,
        buf: &mut [u8],
        task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        self.ensure_not_erasing()?;
        self.check_range(address, buf.len())?;

        if self.transport.borrow().supports_read_batch() {
            let count = buf.len();
            let index = self.index;
            let transport = &self.transport;
            return run_batch(task, count, |task| {
                transport
                    .borrow_mut()
                    .read_batch(index, address, buf, task)
            });
        }

        run_units(task, buf.len(), 1, |offset| {
            buf[offset] = self.read(address + offset as u32)?;
            Ok(())
        })
    }

    /// Program `data` starting at `address`
    ///
    /// The target region must be erased. `data` must have an even length:
    /// the bus programs 16-bit words assembled little-endian from byte
    /// pairs. Delegates to the transport's batch program when available.
    /// Returns the number of bytes programmed.
    pub fn program_bytes(
        &mut self,
        address: u32,
        data: &[u8],
        task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        self.ensure_not_erasing()?;
        if data.len() % 2 != 0 {
            return Err(Error::InvalidLength { len: data.len() });
        }
        self.check_range(address, data.len())?;
        self.ensure_read_mode()?;

        if self.transport.borrow().supports_program_batch() {
            let index = self.index;
            let transport = &self.transport;
            return run_batch(task, data.len(), |task| {
                transport
                    .borrow_mut()
                    .program_batch(index, address, data, task)
            });
        }

        run_units(task, data.len(), 2, |offset| {
            let word = u16::from_le_bytes([data[offset], data[offset + 1]]);
            self.program_word(address + offset as u32, word)
        })
    }
}

impl<T: Transport> fmt::Debug for FlashChip<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashChip")
            .field("index", &self.index)
            .field("mode", &self.mode)
            .field("last_erased_address", &self.last_erased_address)
            .finish_non_exhaustive()
    }
}

/// Delegate a transfer to the transport, bracketing the caller's task
///
/// The transport sees a forwarder scaled to `count`, so whatever unit it
/// reports in, the caller observes bytes.
fn run_batch<F>(task: Option<&mut dyn Task>, count: usize, transfer: F) -> Result<usize>
where
    F: FnOnce(Option<&mut dyn Task>) -> Result<usize>,
{
    let Some(task) = task else {
        return transfer(None);
    };

    task.on_task_start(count as u64);
    let result = {
        let mut forward = ForwardingTask::scaled(&mut *task, count as u64);
        transfer(Some(&mut forward as &mut dyn Task))
    };

    match result {
        Ok(done) => {
            let status = if done < count && task.is_task_cancelled() {
                log::warn!("transfer cancelled after {} of {} bytes", done, count);
                TaskStatus::Cancelled
            } else {
                TaskStatus::Completed
            };
            task.on_task_end(status, done as u64);
            Ok(done)
        }
        Err(e) => {
            task.on_task_end(TaskStatus::Error, e.completed().unwrap_or(0) as u64);
            Err(e)
        }
    }
}

/// Bracket a single call that may be delegated to the transport
///
/// The transport sees a forwarder scaled to `work`. A successful call
/// ends the caller's task with all of `work`, reported or not.
fn run_native<R, F>(task: Option<&mut dyn Task>, work: u64, call: F) -> Result<R>
where
    F: FnOnce(Option<&mut dyn Task>) -> Result<R>,
{
    let Some(task) = task else {
        return call(None);
    };

    task.on_task_start(work);
    let (result, forwarded) = {
        let mut forward = ForwardingTask::scaled(&mut *task, work);
        let result = call(Some(&mut forward as &mut dyn Task));
        (result, forward.forwarded())
    };

    match &result {
        Ok(_) => task.on_task_end(TaskStatus::Completed, work),
        Err(_) => task.on_task_end(TaskStatus::Error, forwarded),
    }
    result
}

/// Byte-by-byte (or word-by-word) transfer loop
///
/// `step` is called with the byte offset of each unit of `unit` bytes.
/// Cancellation is checked before every unit; a failing unit ends the
/// task with `Error` and the bytes completed before it.
fn run_units<F>(
    mut task: Option<&mut dyn Task>,
    count: usize,
    unit: usize,
    mut step: F,
) -> Result<usize>
where
    F: FnMut(usize) -> Result<()>,
{
    if let Some(task) = task.as_deref_mut() {
        task.on_task_start(count as u64);
    }

    let mut done = 0usize;
    while done < count {
        if let Some(task) = task.as_deref_mut() {
            if task.is_task_cancelled() {
                log::warn!("transfer cancelled after {} of {} bytes", done, count);
                task.on_task_update(TaskStatus::Stopping, 0);
                task.on_task_end(TaskStatus::Cancelled, done as u64);
                return Ok(done);
            }
        }

        if let Err(e) = step(done) {
            if let Some(task) = task.as_deref_mut() {
                task.on_task_end(TaskStatus::Error, done as u64);
            }
            return Err(e.with_completed(done));
        }

        done += unit;
        if let Some(task) = task.as_deref_mut() {
            task.on_task_update(TaskStatus::Running, unit as u64);
        }
    }

    if let Some(task) = task.as_deref_mut() {
        task.on_task_end(TaskStatus::Completed, count as u64);
    }
    Ok(count)
}
