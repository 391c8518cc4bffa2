//! Cartridge-level operations
//!
//! These spread a flat cartridge range over the chips it touches and run
//! each chip's share through its [`FlashChip`]. One caller task spans the
//! whole operation; every chip-level transfer reports into it through an
//! unscaled [`ForwardingTask`], so the caller sees one byte count from
//! start to end.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use super::chip::FlashChip;
use super::session::CartridgeSession;
use crate::cartridge::{BlockRef, Cartridge};
use crate::error::{Error, Result};
use crate::save::SaveImage;
use crate::task::{ForwardingTask, Task, TaskStatus};
use crate::transport::Transport;

/// The erased value for flash memory (all bits set)
const ERASED_VALUE: u8 = 0xFF;

/// How often and how long to poll a running erase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Delay between probes
    pub poll_delay_us: u32,
    /// Give up after this long
    pub timeout_us: u32,
}

impl PollTiming {
    /// Block erase: typically well under a second
    pub const BLOCK: PollTiming = PollTiming {
        poll_delay_us: 10_000,
        timeout_us: 10_000_000,
    };

    /// Chip erase: up to a couple of minutes on 16 Mbit parts
    pub const CHIP: PollTiming = PollTiming {
        poll_delay_us: 100_000,
        timeout_us: 200_000_000,
    };

    fn max_polls(&self) -> u32 {
        if self.poll_delay_us > 0 {
            (self.timeout_us / self.poll_delay_us).max(1)
        } else {
            // Fall back to polling once per microsecond
            self.timeout_us.max(1)
        }
    }
}

/// Poll a chip until its erase finishes
///
/// Returns immediately if the chip is not erasing. On `Timeout` the chip
/// stays in erase mode; a later successful poll clears it.
pub fn wait_erase_complete<T: Transport>(
    chip: &mut FlashChip<T>,
    timing: PollTiming,
) -> Result<()> {
    if !chip.is_erasing() {
        return Ok(());
    }

    for _ in 0..timing.max_polls() {
        if !chip.poll_erase_complete()? {
            return Ok(());
        }
        if timing.poll_delay_us > 0 {
            chip.delay_us(timing.poll_delay_us);
        }
    }

    log::warn!(
        "chip {}: erase at 0x{:06X} did not finish within {} ms",
        chip.index(),
        chip.last_erased_address(),
        timing.timeout_us / 1000
    );
    Err(Error::Timeout)
}

// =============================================================================
// Progress bookkeeping
// =============================================================================

/// Caller task plus the running byte count of one operation
struct Progress<'a> {
    task: Option<&'a mut dyn Task>,
    done: u64,
}

impl<'a> Progress<'a> {
    fn start(mut task: Option<&'a mut dyn Task>, expected: u64) -> Self {
        if let Some(task) = task.as_deref_mut() {
            task.on_task_start(expected);
        }
        Self { task, done: 0 }
    }

    fn is_cancelled(&self) -> bool {
        self.task
            .as_deref()
            .is_some_and(|task| task.is_task_cancelled())
    }

    /// Report work done outside a forwarded transfer
    fn update(&mut self, work: u64) {
        self.done += work;
        if let Some(task) = self.task.as_deref_mut() {
            task.on_task_update(TaskStatus::Running, work);
        }
    }

    /// Run a chip transfer reporting into the caller's task
    ///
    /// The transfer's returned byte count is added to the running total.
    fn forward<F>(&mut self, transfer: F) -> Result<usize>
    where
        F: FnOnce(Option<&mut dyn Task>) -> Result<usize>,
    {
        let result = match self.task.as_deref_mut() {
            Some(task) => {
                let mut forward = ForwardingTask::new(task);
                transfer(Some(&mut forward as &mut dyn Task))
            }
            None => transfer(None),
        };
        if let Ok(done) = result {
            self.done += done as u64;
        }
        result
    }

    /// Run a chip call whose own progress counts toward the operation
    ///
    /// Returns the work the call reported, which is already added to the
    /// running total.
    fn relay<F>(&mut self, call: F) -> Result<u64>
    where
        F: FnOnce(Option<&mut dyn Task>) -> Result<()>,
    {
        let (result, reported) = match self.task.as_deref_mut() {
            Some(task) => {
                let mut forward = ForwardingTask::new(task);
                let result = call(Some(&mut forward as &mut dyn Task));
                (result, forward.forwarded())
            }
            None => (call(None), 0),
        };
        self.done += reported;
        result.map(|()| reported)
    }

    fn finish(mut self, status: TaskStatus) {
        if status == TaskStatus::Cancelled {
            log::warn!("operation cancelled after {} bytes", self.done);
        }
        if let Some(task) = self.task.as_deref_mut() {
            task.on_task_end(status, self.done);
        }
    }

    fn cancel(mut self) {
        if let Some(task) = self.task.as_deref_mut() {
            task.on_task_update(TaskStatus::Stopping, 0);
        }
        self.finish(TaskStatus::Cancelled)
    }

    /// End with `Error`, folding a transport failure's partial count into
    /// the operation total
    fn fail(mut self, error: Error) -> Error {
        let done = self.done + error.completed().unwrap_or(0) as u64;
        self.done = done;
        self.finish(TaskStatus::Error);
        error.with_completed(done as usize)
    }
}

// =============================================================================
// Range helpers
// =============================================================================

/// The share of a cartridge range that falls on one chip
struct Segment {
    chip: usize,
    chip_offset: u32,
    data: Range<usize>,
}

fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidLength { len })
}

fn segments(cartridge: &Cartridge, address: u32, len: usize) -> Result<Vec<Segment>> {
    let end = cartridge.check_range(address, checked_len(len)?)?;
    let mut segments = Vec::new();
    let mut cursor = address;

    while cursor < end {
        let chip = cartridge.chip_for_address(cursor)?;
        let geometry = cartridge.chip(chip)?;
        let stop = end.min(geometry.end());
        segments.push(Segment {
            chip,
            chip_offset: cursor - geometry.base(),
            data: (cursor - address) as usize..(stop - address) as usize,
        });
        cursor = stop;
    }

    Ok(segments)
}

fn ensure_writable(blocks: &[BlockRef]) -> Result<()> {
    match blocks.iter().find(|block| block.protected) {
        Some(block) => Err(Error::Protected {
            address: block.address,
        }),
        None => Ok(()),
    }
}

fn erase_block<T: Transport>(chip: &mut FlashChip<T>, address: u32) -> Result<()> {
    chip.erase_block(address)?;
    wait_erase_complete(chip, PollTiming::BLOCK)
}

// =============================================================================
// Read / program / verify
// =============================================================================

fn read_into<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    buf: &mut [u8],
    progress: &mut Progress<'_>,
) -> Result<usize> {
    let (cartridge, chips) = session.split_mut();
    let mut total = 0;

    for segment in segments(cartridge, address, buf.len())? {
        let chip = &mut chips[segment.chip];
        chip.ensure_read_mode()?;
        let wanted = segment.data.len();
        let part = &mut buf[segment.data];
        let done = progress.forward(|task| chip.read_bytes(segment.chip_offset, part, task))?;
        total += done;
        if done < wanted {
            break;
        }
    }

    Ok(total)
}

fn program_from<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    data: &[u8],
    progress: &mut Progress<'_>,
) -> Result<usize> {
    let (cartridge, chips) = session.split_mut();
    let mut total = 0;

    for segment in segments(cartridge, address, data.len())? {
        let chip = &mut chips[segment.chip];
        let part = &data[segment.data];
        let done = progress.forward(|task| chip.program_bytes(segment.chip_offset, part, task))?;
        total += done;
        if done < part.len() {
            break;
        }
    }

    Ok(total)
}

/// Read `buf.len()` bytes starting at a cartridge address
///
/// Chip boundaries are handled transparently. Returns the number of bytes
/// read, which is short only if the task was cancelled.
pub fn read_cartridge<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    buf: &mut [u8],
    task: Option<&mut dyn Task>,
) -> Result<usize> {
    let mut progress = Progress::start(task, buf.len() as u64);
    match read_into(session, address, buf, &mut progress) {
        Ok(done) if done < buf.len() => {
            progress.cancel();
            Ok(done)
        }
        Ok(done) => {
            progress.finish(TaskStatus::Completed);
            Ok(done)
        }
        Err(e) => Err(progress.fail(e)),
    }
}

/// Program already-erased cartridge space
///
/// `data` must have an even length and start on an even address. Returns
/// the number of bytes programmed.
pub fn program_cartridge<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    data: &[u8],
    task: Option<&mut dyn Task>,
) -> Result<usize> {
    if data.len() % 2 != 0 || address % 2 != 0 {
        return Err(Error::InvalidLength { len: data.len() });
    }

    let mut progress = Progress::start(task, data.len() as u64);
    match program_from(session, address, data, &mut progress) {
        Ok(done) if done < data.len() => {
            progress.cancel();
            Ok(done)
        }
        Ok(done) => {
            progress.finish(TaskStatus::Completed);
            Ok(done)
        }
        Err(e) => Err(progress.fail(e)),
    }
}

/// Compare cartridge contents against `expected`
///
/// Fails with `VerifyMismatch` at the first differing byte, ending the
/// task with `Error`. Returns the number of bytes compared, short only if
/// the task was cancelled.
pub fn verify_cartridge<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    expected: &[u8],
    task: Option<&mut dyn Task>,
) -> Result<usize> {
    let mut progress = Progress::start(task, expected.len() as u64);
    let mut buf = vec![0u8; expected.len()];
    let done = match read_into(session, address, &mut buf, &mut progress) {
        Ok(done) => done,
        Err(e) => return Err(progress.fail(e)),
    };

    if let Some(offset) = buf[..done]
        .iter()
        .zip(&expected[..done])
        .position(|(found, want)| found != want)
    {
        let mismatch = Error::VerifyMismatch {
            address: address + offset as u32,
            expected: expected[offset],
            found: buf[offset],
        };
        return Err(progress.fail(mismatch));
    }

    if done < expected.len() {
        progress.cancel();
    } else {
        progress.finish(TaskStatus::Completed);
    }
    Ok(done)
}

// =============================================================================
// Erase and write
// =============================================================================

/// Erase every chip on the cartridge, protected blocks included
///
/// Progress is reported in bytes: whatever a native erase reports while
/// it starts, and the rest of the chip once it has finished.
pub fn erase_cartridge<T: Transport>(
    session: &mut CartridgeSession<T>,
    task: Option<&mut dyn Task>,
) -> Result<()> {
    let size = session.cartridge().size();
    let mut progress = Progress::start(task, size as u64);

    let (cartridge, chips) = session.split_mut();
    for (chip, geometry) in chips.iter_mut().zip(cartridge.chips()) {
        if progress.is_cancelled() {
            progress.cancel();
            return Ok(());
        }
        log::info!("Erasing chip {} ({} KiB)", chip.index(), geometry.size() / 1024);
        let result = progress.relay(|task| chip.erase_chip(task)).and_then(|reported| {
            wait_erase_complete(chip, PollTiming::CHIP)?;
            Ok(reported)
        });
        let reported = match result {
            Ok(reported) => reported,
            Err(e) => return Err(progress.fail(e)),
        };
        let remaining = (geometry.size() as u64).saturating_sub(reported);
        if remaining > 0 {
            progress.update(remaining);
        }
    }

    progress.finish(TaskStatus::Completed);
    Ok(())
}

/// Erase every unprotected block
///
/// Returns the number of blocks erased. Protected blocks are left alone.
pub fn erase_unprotected_blocks<T: Transport>(
    session: &mut CartridgeSession<T>,
    task: Option<&mut dyn Task>,
) -> Result<usize> {
    let blocks: Vec<BlockRef> = session.cartridge().unprotected_blocks().collect();
    let expected = blocks.iter().map(|block| block.size as u64).sum();
    let mut progress = Progress::start(task, expected);

    let (cartridge, chips) = session.split_mut();
    let mut erased = 0;
    for block in &blocks {
        if progress.is_cancelled() {
            progress.cancel();
            return Ok(erased);
        }
        let base = cartridge.chips()[block.chip].base();
        if let Err(e) = erase_block(&mut chips[block.chip], block.address - base) {
            return Err(progress.fail(e));
        }
        progress.update(block.size as u64);
        erased += 1;
    }

    progress.finish(TaskStatus::Completed);
    Ok(erased)
}

/// Blocks `write_region` will rewrite for a range
fn write_work(cartridge: &Cartridge, address: u32, len: usize) -> Result<Vec<BlockRef>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let blocks = cartridge.blocks_in_range(address, checked_len(len)?)?;
    ensure_writable(&blocks)?;
    Ok(blocks)
}

/// Rewrite every block `data` touches
///
/// Blocks only partly covered keep their bytes outside the range: they are
/// read back first and merged. Each block is erased and then programmed in
/// full. Returns `false` if cancelled.
fn write_region<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    data: &[u8],
    blocks: &[BlockRef],
    progress: &mut Progress<'_>,
) -> Result<bool> {
    let end = address + data.len() as u32;

    for block in blocks {
        if progress.is_cancelled() {
            return Ok(false);
        }

        let start = block.address.max(address);
        let stop = block.end().min(end);
        let source = &data[(start - address) as usize..(stop - address) as usize];

        let contents = if start == block.address && stop == block.end() {
            source.to_vec()
        } else {
            let mut current = vec![ERASED_VALUE; block.size as usize];
            let mut silent = Progress::start(None, 0);
            read_into(session, block.address, &mut current, &mut silent)?;
            current[(start - block.address) as usize..(stop - block.address) as usize]
                .copy_from_slice(source);
            current
        };

        log::debug!(
            "Writing block 0x{:06X}..0x{:06X}",
            block.address,
            block.end()
        );

        let (cartridge, chips) = session.split_mut();
        let chip = &mut chips[block.chip];
        let offset = block.address - cartridge.chips()[block.chip].base();
        erase_block(chip, offset)?;

        let wanted = contents.len();
        let done = progress.forward(|task| chip.program_bytes(offset, &contents, task))?;
        if done < wanted {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Write `data` at a cartridge address
///
/// Every block the data touches is erased and reprogrammed; bytes of those
/// blocks outside the range are preserved. Fails with `Protected` before
/// touching the cartridge if any of the blocks is protected. Progress
/// counts the bytes programmed, which is the size of the touched blocks.
pub fn write_cartridge<T: Transport>(
    session: &mut CartridgeSession<T>,
    address: u32,
    data: &[u8],
    task: Option<&mut dyn Task>,
) -> Result<()> {
    let blocks = write_work(session.cartridge(), address, data.len())?;
    let expected = blocks.iter().map(|block| block.size as u64).sum();
    let mut progress = Progress::start(task, expected);

    match write_region(session, address, data, &blocks, &mut progress) {
        Ok(true) => {
            progress.finish(TaskStatus::Completed);
            Ok(())
        }
        Ok(false) => {
            progress.cancel();
            Ok(())
        }
        Err(e) => Err(progress.fail(e)),
    }
}

// =============================================================================
// Save data
// =============================================================================

/// Capture the save area
///
/// Every unprotected block is read; blocks that are still blank are left
/// out. Entry addresses are console addresses. If the task is cancelled
/// the image holds the blocks read so far.
pub fn backup_save<T: Transport>(
    session: &mut CartridgeSession<T>,
    task: Option<&mut dyn Task>,
) -> Result<SaveImage> {
    let blocks: Vec<BlockRef> = session.cartridge().unprotected_blocks().collect();
    let expected = blocks.iter().map(|block| block.size as u64).sum();
    let mut progress = Progress::start(task, expected);
    let mut image = SaveImage::new();

    for block in &blocks {
        let mut data = vec![0u8; block.size as usize];
        let done = match read_into(session, block.address, &mut data, &mut progress) {
            Ok(done) => done,
            Err(e) => return Err(progress.fail(e)),
        };
        if done < data.len() {
            progress.cancel();
            return Ok(image);
        }

        if data.iter().all(|&b| b == ERASED_VALUE) {
            log::debug!("Skipping blank block at 0x{:06X}", block.address);
            continue;
        }
        let address = session.cartridge().to_console_address(block.address);
        image.push(address, data);
    }

    log::info!(
        "Captured {} save block(s), {} bytes",
        image.len(),
        image.payload_len()
    );
    progress.finish(TaskStatus::Completed);
    Ok(image)
}

/// Write a save image back to the cartridge
///
/// Every entry is checked before anything is erased: it must lie inside
/// the cartridge and touch only unprotected blocks.
pub fn restore_save<T: Transport>(
    session: &mut CartridgeSession<T>,
    image: &SaveImage,
    task: Option<&mut dyn Task>,
) -> Result<()> {
    let mut plan = Vec::with_capacity(image.len());
    for entry in image.blocks() {
        let cartridge = session.cartridge();
        let address = cartridge.from_console_address(entry.address)?;
        let blocks = write_work(cartridge, address, entry.data.len())?;
        plan.push((address, entry.data.as_slice(), blocks));
    }

    let expected = plan
        .iter()
        .flat_map(|(_, _, blocks)| blocks.iter())
        .map(|block| block.size as u64)
        .sum();
    let mut progress = Progress::start(task, expected);

    for (address, data, blocks) in &plan {
        match write_region(session, *address, data, blocks, &mut progress) {
            Ok(true) => {}
            Ok(false) => {
                progress.cancel();
                return Ok(());
            }
            Err(e) => return Err(progress.fail(e)),
        }
    }

    log::info!("Restored {} save block(s)", image.len());
    progress.finish(TaskStatus::Completed);
    Ok(())
}
