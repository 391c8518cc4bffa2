//! cartflash-dummy - In-memory flash cartridge emulator
//!
//! This crate provides a [`Transport`] that emulates the flash dies of a
//! cartridge in memory. It decodes the same unlock, program, erase,
//! autoselect and blank-check sequences real parts accept, so the driver
//! can be exercised end to end without hardware.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use cartflash_core::cartridge::{Block, CommandSet, System};
use cartflash_core::chip::DEVICES;
use cartflash_core::error::{Error, Result, TransportErrorKind};
use cartflash_core::flash::commands;
use cartflash_core::task::{Task, TaskStatus};
use cartflash_core::transport::{Transport, TransportFeatures};

/// Bytes per progress unit reported by the emulated batch transfers
pub const BATCH_PACKET_SIZE: usize = 64;

/// Value the blank-check read returns once an erase has finished
const READY_STATUS: u8 = 0xFF;

/// Configuration for the dummy cartridge
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Console family, selects the command addresses and block layout
    pub system: System,
    /// Number of flash dies
    pub chips: u8,
    /// Capacity of every die in bytes
    pub chip_size: u32,
    /// Manufacturer ID returned in autoselect mode
    pub manufacturer_id: u8,
    /// Device ID returned in autoselect mode
    pub device_id: u8,
    /// Capabilities to advertise
    pub features: TransportFeatures,
    /// Blank-check probes that report "busy" after every erase
    pub erase_polls: u32,
    /// Number of blocks, counted from the bottom of each chip, that are
    /// protected against program and erase
    pub protected_blocks: usize,
    /// Chip-relative address whose array access fails with a transport
    /// error (fault injection)
    pub fail_address: Option<u32>,
}

impl DummyConfig {
    /// Configuration for `chips` dies of `chip_size` bytes
    ///
    /// The device ID is taken from the part table when the size matches a
    /// known part.
    pub fn new(system: System, chips: u8, chip_size: u32) -> Self {
        let device_id = DEVICES
            .iter()
            .find(|(_, _, size)| *size == chip_size)
            .map(|(id, _, _)| *id)
            .unwrap_or(0x00);

        Self {
            system,
            chips,
            chip_size,
            manufacturer_id: 0x98, // Toshiba
            device_id,
            features: TransportFeatures::empty(),
            erase_polls: 2,
            protected_blocks: 0,
            fail_address: None,
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        // Single 16 Mbit die, the common Neo Geo Pocket flash cart
        Self::new(System::NeoGeoPocket, 1, 0x20_0000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Autoselect,
    Program,
    Erasing,
}

/// Command decoder state of one emulated die
#[derive(Debug, Clone)]
struct ChipState {
    mode: Mode,
    /// Unlock cycles seen so far (0..=2)
    step: u8,
    /// 0x80 was received, waiting for the confirm sequence
    erase_armed: bool,
    /// Blank-check bytes received after an unlock during an erase
    probe: usize,
    /// Busy probes left before the erase reports completion
    busy: u32,
    erase_address: u32,
}

impl ChipState {
    fn new() -> Self {
        Self {
            mode: Mode::Read,
            step: 0,
            erase_armed: false,
            probe: 0,
            busy: 0,
            erase_address: 0,
        }
    }
}

/// Emulated cartridge
///
/// Memory is kept as one flat array with the dies back to back. Program
/// cycles can only clear bits, as on real flash.
pub struct DummyCartridge {
    config: DummyConfig,
    commands: CommandSet,
    blocks: Vec<Block>,
    data: Vec<u8>,
    chips: Vec<ChipState>,
    erase_log: Vec<(u8, u32)>,
    delayed_us: u64,
}

impl DummyCartridge {
    /// Create a blank (all 0xFF) cartridge
    pub fn new(config: DummyConfig) -> Self {
        let blocks = config
            .system
            .block_layout(config.chip_size)
            .unwrap_or_else(|_| vec![Block::new(0, config.chip_size)]);
        let data = vec![0xFF; config.chips as usize * config.chip_size as usize];
        let chips = vec![ChipState::new(); config.chips as usize];

        Self {
            commands: config.system.command_set(),
            config,
            blocks,
            data,
            chips,
            erase_log: Vec::new(),
            delayed_us: 0,
        }
    }

    /// Create a cartridge with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a cartridge pre-filled with `initial_data` from address 0
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut cart = Self::new(config);
        let len = core::cmp::min(initial_data.len(), cart.data.len());
        cart.data[..len].copy_from_slice(&initial_data[..len]);
        cart
    }

    /// Flat cartridge memory
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable flat cartridge memory
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Confirmed erases as `(chip, address)`; chip erases log address 0
    pub fn erase_log(&self) -> &[(u8, u32)] {
        &self.erase_log
    }

    /// Total time requested through `delay_us`
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }

    /// Whether chip `chip` has an erase running
    pub fn is_erasing(&self, chip: u8) -> bool {
        self.chips
            .get(chip as usize)
            .is_some_and(|state| state.mode == Mode::Erasing)
    }

    fn block_at(&self, address: u32) -> Option<(usize, Block)> {
        let index = self.blocks.partition_point(|block| block.base <= address);
        let block = *self.blocks.get(index.checked_sub(1)?)?;
        block.contains(address).then_some((index - 1, block))
    }

    fn is_protected(&self, address: u32) -> bool {
        self.block_at(address)
            .is_some_and(|(index, _)| index < self.config.protected_blocks)
    }

    fn offset(&self, chip: u8, address: u32) -> Result<usize> {
        if address >= self.config.chip_size {
            return Err(Error::OutOfRange {
                value: address,
                limit: self.config.chip_size,
            });
        }
        Ok(chip as usize * self.config.chip_size as usize + address as usize)
    }

    fn check_fault(&self, address: u32) -> Result<()> {
        if self.config.fail_address == Some(address) {
            log::debug!("dummy: injected fault at 0x{:06X}", address);
            return Err(Error::transport(TransportErrorKind::Io));
        }
        Ok(())
    }

    fn erase_range(&mut self, chip: u8, base: u32, size: u32) -> Result<()> {
        let start = self.offset(chip, base)?;
        let end = base + size;
        for (index, block) in self.blocks.iter().enumerate() {
            if index < self.config.protected_blocks || block.end() <= base || block.base >= end {
                continue;
            }
            let from = start + (block.base.max(base) - base) as usize;
            let to = start + (block.end().min(end) - base) as usize;
            self.data[from..to].fill(0xFF);
        }
        Ok(())
    }

    fn start_erase(&mut self, chip: u8, address: u32) {
        let state = &mut self.chips[chip as usize];
        state.mode = Mode::Erasing;
        state.busy = self.config.erase_polls;
        state.probe = 0;
        state.erase_address = address;
        self.erase_log.push((chip, address));
    }

    fn program(&mut self, chip: u8, address: u32, word: u16) -> Result<()> {
        self.check_fault(address)?;
        if self.is_protected(address) {
            log::debug!("dummy: program to protected 0x{:06X} ignored", address);
            return Ok(());
        }
        let offset = self.offset(chip, address)?;
        let [lo, hi] = word.to_le_bytes();
        self.data[offset] &= lo;
        if address + 1 < self.config.chip_size {
            self.data[offset + 1] &= hi;
        }
        Ok(())
    }

    /// Decode one command cycle
    fn command(&mut self, chip: u8, address: u32, value: u8) -> Result<()> {
        let unlock1 = self.commands.unlock1;
        let unlock2 = self.commands.unlock2;
        let state = &mut self.chips[chip as usize];

        match state.step {
            0 => {
                if address == unlock1 && value == commands::UNLOCK1 {
                    state.step = 1;
                }
                return Ok(());
            }
            1 => {
                state.step = if address == unlock2 && value == commands::UNLOCK2 {
                    2
                } else {
                    0
                };
                return Ok(());
            }
            _ => state.step = 0,
        }

        if state.erase_armed {
            state.erase_armed = false;
            match value {
                commands::CHIP_ERASE if address == unlock1 => {
                    log::debug!("dummy: chip {} erase", chip);
                    self.erase_range(chip, 0, self.config.chip_size)?;
                    self.start_erase(chip, 0);
                }
                commands::BLOCK_ERASE => {
                    if let Some((_, block)) = self.block_at(address) {
                        log::debug!("dummy: chip {} block erase 0x{:06X}", chip, address);
                        self.erase_range(chip, block.base, block.size)?;
                    }
                    self.start_erase(chip, address);
                }
                _ => state.mode = Mode::Read,
            }
            return Ok(());
        }

        if address != unlock1 {
            return Ok(());
        }
        match value {
            commands::RESET => state.mode = Mode::Read,
            commands::AUTOSELECT => state.mode = Mode::Autoselect,
            commands::PROGRAM => state.mode = Mode::Program,
            commands::ERASE_SETUP => state.erase_armed = true,
            other => log::debug!("dummy: unknown command 0x{:02X}", other),
        }
        Ok(())
    }

    /// Decode a cycle received while an erase runs
    fn probe_cycle(&mut self, chip: u8, address: u32, value: u8) {
        let unlock1 = self.commands.unlock1;
        let unlock2 = self.commands.unlock2;
        let state = &mut self.chips[chip as usize];

        match state.step {
            0 if address == unlock1 && value == commands::UNLOCK1 => state.step = 1,
            1 if address == unlock2 && value == commands::UNLOCK2 => {
                state.step = 2;
                state.probe = 0;
            }
            2 if address == state.erase_address
                && state.probe < commands::BLANK_CHECK.len()
                && value == commands::BLANK_CHECK[state.probe] =>
            {
                state.probe += 1;
            }
            _ => {
                state.step = 0;
                state.probe = 0;
            }
        }
    }
}

impl Transport for DummyCartridge {
    fn features(&self) -> TransportFeatures {
        self.config.features
    }

    fn read_unit(&mut self, chip: u8, address: u32) -> Result<u8> {
        let Some(state) = self.chips.get_mut(chip as usize) else {
            // Nothing on the bus
            return Ok(0xFF);
        };

        match state.mode {
            Mode::Erasing => {
                let probed = state.step == 2 && state.probe == commands::BLANK_CHECK.len();
                state.step = 0;
                state.probe = 0;
                if !probed {
                    return Ok(0);
                }
                if state.busy > 0 {
                    state.busy -= 1;
                    return Ok(0);
                }
                state.mode = Mode::Read;
                Ok(READY_STATUS)
            }
            Mode::Autoselect => {
                if address == self.commands.manufacturer_offset {
                    Ok(self.config.manufacturer_id)
                } else if address == self.commands.device_offset {
                    Ok(self.config.device_id)
                } else {
                    Ok(0)
                }
            }
            Mode::Read | Mode::Program => {
                self.check_fault(address)?;
                let offset = self.offset(chip, address)?;
                Ok(self.data[offset])
            }
        }
    }

    fn write_unit(&mut self, chip: u8, address: u32, value: u16) -> Result<()> {
        let Some(state) = self.chips.get(chip as usize) else {
            return Ok(());
        };

        match state.mode {
            Mode::Erasing => {
                self.probe_cycle(chip, address, value as u8);
                Ok(())
            }
            Mode::Program if state.step == 0 => {
                self.chips[chip as usize].mode = Mode::Read;
                self.program(chip, address, value)
            }
            _ => self.command(chip, address, value as u8),
        }
    }

    fn delay_us(&mut self, us: u32) {
        // No real delay needed for in-memory operations
        self.delayed_us += us as u64;
    }

    fn read_batch(
        &mut self,
        chip: u8,
        address: u32,
        buf: &mut [u8],
        mut task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        if !self.config.features.contains(TransportFeatures::READ_BATCH) {
            return Err(Error::Unsupported);
        }
        if let Some(task) = task.as_deref_mut() {
            task.on_task_start(buf.len().div_ceil(BATCH_PACKET_SIZE) as u64);
        }

        let mut done = 0;
        for packet in buf.chunks_mut(BATCH_PACKET_SIZE) {
            if task.as_deref().is_some_and(|task| task.is_task_cancelled()) {
                break;
            }
            for (i, byte) in packet.iter_mut().enumerate() {
                let at = address + (done + i) as u32;
                self.check_fault(at).map_err(|e| e.with_completed(done + i))?;
                *byte = self.data[self.offset(chip, at)?];
            }
            done += packet.len();
            if let Some(task) = task.as_deref_mut() {
                task.on_task_update(TaskStatus::Running, 1);
            }
        }

        if let Some(task) = task.as_deref_mut() {
            task.on_task_end(TaskStatus::Completed, done as u64);
        }
        Ok(done)
    }

    fn program_batch(
        &mut self,
        chip: u8,
        address: u32,
        data: &[u8],
        mut task: Option<&mut dyn Task>,
    ) -> Result<usize> {
        if !self.config.features.contains(TransportFeatures::PROGRAM_BATCH) {
            return Err(Error::Unsupported);
        }
        if data.len() % 2 != 0 {
            return Err(Error::InvalidLength { len: data.len() });
        }
        if let Some(task) = task.as_deref_mut() {
            task.on_task_start(data.len().div_ceil(BATCH_PACKET_SIZE) as u64);
        }

        let mut done = 0;
        for packet in data.chunks(BATCH_PACKET_SIZE) {
            if task.as_deref().is_some_and(|task| task.is_task_cancelled()) {
                break;
            }
            for (i, pair) in packet.chunks_exact(2).enumerate() {
                let at = address + (done + i * 2) as u32;
                let word = u16::from_le_bytes([pair[0], pair[1]]);
                self.program(chip, at, word)
                    .map_err(|e| e.with_completed(done + i * 2))?;
            }
            done += packet.len();
            if let Some(task) = task.as_deref_mut() {
                task.on_task_update(TaskStatus::Running, 1);
            }
        }

        if let Some(task) = task.as_deref_mut() {
            task.on_task_end(TaskStatus::Completed, done as u64);
        }
        Ok(done)
    }

    fn erase_chip_native(&mut self, chip: u8, mut task: Option<&mut dyn Task>) -> Result<()> {
        if !self
            .config
            .features
            .contains(TransportFeatures::NATIVE_CHIP_ERASE)
        {
            return Err(Error::Unsupported);
        }
        if chip >= self.config.chips {
            return Err(Error::transport(TransportErrorKind::Rejected));
        }
        if let Some(task) = task.as_deref_mut() {
            task.on_task_start(1);
        }
        self.erase_range(chip, 0, self.config.chip_size)?;
        self.start_erase(chip, 0);
        if let Some(task) = task {
            task.on_task_update(TaskStatus::Running, 1);
            task.on_task_end(TaskStatus::Completed, 1);
        }
        Ok(())
    }

    fn read_manufacturer_id(&mut self, chip: u8, _task: Option<&mut dyn Task>) -> Result<u8> {
        if chip >= self.config.chips {
            return Ok(0xFF);
        }
        Ok(self.config.manufacturer_id)
    }

    fn read_device_id(&mut self, chip: u8, _task: Option<&mut dyn Task>) -> Result<u8> {
        if chip >= self.config.chips {
            return Ok(0xFF);
        }
        Ok(self.config.device_id)
    }

    fn read_block_protection(&mut self, _chip: u8, address: u32) -> Result<bool> {
        Ok(self.is_protected(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ngp() -> DummyCartridge {
        DummyCartridge::new(DummyConfig::new(System::NeoGeoPocket, 1, 0x8_0000))
    }

    fn unlock(cart: &mut DummyCartridge, command: u8) {
        cart.write_unit(0, 0x5555, 0xAA).unwrap();
        cart.write_unit(0, 0x2AAA, 0x55).unwrap();
        cart.write_unit(0, 0x5555, command as u16).unwrap();
    }

    #[test]
    fn test_autoselect() {
        let mut cart = ngp();
        unlock(&mut cart, 0x90);
        assert_eq!(cart.read_unit(0, 0).unwrap(), 0x98);
        assert_eq!(cart.read_unit(0, 2).unwrap(), 0xAB);

        unlock(&mut cart, 0xF0);
        assert_eq!(cart.read_unit(0, 0).unwrap(), 0xFF);
    }

    #[test]
    fn test_program_clears_bits_only() {
        let mut cart = ngp();
        unlock(&mut cart, 0xA0);
        cart.write_unit(0, 0x100, 0x1234).unwrap();
        assert_eq!(&cart.data()[0x100..0x102], &[0x34, 0x12]);

        unlock(&mut cart, 0xA0);
        cart.write_unit(0, 0x100, 0xFF0F).unwrap();
        assert_eq!(&cart.data()[0x100..0x102], &[0x04, 0x12]);
    }

    #[test]
    fn test_block_erase_and_probe() {
        let mut cart = ngp();
        cart.data_mut()[0x1_0000..0x1_0010].fill(0);

        unlock(&mut cart, 0x80);
        cart.write_unit(0, 0x5555, 0xAA).unwrap();
        cart.write_unit(0, 0x2AAA, 0x55).unwrap();
        cart.write_unit(0, 0x1_0000, 0x30).unwrap();
        assert!(cart.is_erasing(0));
        assert_eq!(cart.erase_log(), &[(0, 0x1_0000)]);
        assert!(cart.data()[0x1_0000..0x2_0000].iter().all(|&b| b == 0xFF));

        let probe = |cart: &mut DummyCartridge| {
            cart.write_unit(0, 0x5555, 0xAA).unwrap();
            cart.write_unit(0, 0x2AAA, 0x55).unwrap();
            for byte in commands::BLANK_CHECK {
                cart.write_unit(0, 0x1_0000, byte as u16).unwrap();
            }
            cart.read_unit(0, 0x1_0000).unwrap()
        };

        assert_eq!(probe(&mut cart), 0);
        assert_eq!(probe(&mut cart), 0);
        assert_ne!(probe(&mut cart), 0);
        assert!(!cart.is_erasing(0));
    }

    #[test]
    fn test_protected_block_survives_erase() {
        let mut config = DummyConfig::new(System::WonderSwan, 1, 0x8_0000);
        config.protected_blocks = 1;
        let mut cart = DummyCartridge::with_data(config, &[0x00; 0x8_0000]);

        cart.write_unit(0, 0xAAA, 0xAA).unwrap();
        cart.write_unit(0, 0x555, 0x55).unwrap();
        cart.write_unit(0, 0xAAA, 0x80).unwrap();
        cart.write_unit(0, 0xAAA, 0xAA).unwrap();
        cart.write_unit(0, 0x555, 0x55).unwrap();
        cart.write_unit(0, 0xAAA, 0x10).unwrap();

        assert!(cart.data()[..0x2_0000].iter().all(|&b| b == 0x00));
        assert!(cart.data()[0x2_0000..].iter().all(|&b| b == 0xFF));
        assert!(cart.read_block_protection(0, 0x1_2345).unwrap());
        assert!(!cart.read_block_protection(0, 0x2_0000).unwrap());
    }

    #[test]
    fn test_absent_chip_floats() {
        let mut cart = ngp();
        assert_eq!(cart.read_unit(1, 0).unwrap(), 0xFF);
        cart.write_unit(1, 0x5555, 0xAA).unwrap();
    }

    #[test]
    fn test_fault_injection() {
        let mut config = DummyConfig::new(System::NeoGeoPocket, 1, 0x8_0000);
        config.fail_address = Some(0x10);
        let mut cart = DummyCartridge::new(config);
        assert!(cart.read_unit(0, 0x0F).is_ok());
        assert!(matches!(cart.read_unit(0, 0x10), Err(Error::Transport(_))));
    }

    #[test]
    fn test_batch_read_requires_feature() {
        let mut cart = ngp();
        let mut buf = [0u8; 4];
        assert_eq!(
            cart.read_batch(0, 0, &mut buf, None),
            Err(Error::Unsupported)
        );
    }
}
