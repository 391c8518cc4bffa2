//! Cartridge detection and the live session

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Ref, RefCell, RefMut};

use super::chip::{FlashChip, SharedTransport};
use crate::cartridge::{Cartridge, Chip, System};
use crate::chip::{self, FlashPart};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// A detected cartridge with one driver per flash die
///
/// All chips share the one transport. The geometry is fixed once the
/// session is built.
pub struct CartridgeSession<T: Transport> {
    transport: SharedTransport<T>,
    cartridge: Cartridge,
    chips: Vec<FlashChip<T>>,
    parts: Vec<FlashPart>,
}

impl<T: Transport> CartridgeSession<T> {
    /// Build a session for a cartridge whose geometry is already known
    ///
    /// No identification is performed; every chip starts in read mode.
    pub fn with_cartridge(transport: T, cartridge: Cartridge) -> Self {
        let transport = Rc::new(RefCell::new(transport));
        let commands = cartridge.system().command_set();
        let chips = cartridge
            .chips()
            .iter()
            .enumerate()
            .map(|(index, geometry)| {
                let mut chip = FlashChip::new(Rc::clone(&transport), index as u8, commands);
                chip.set_geometry(geometry.clone());
                chip
            })
            .collect();

        Self {
            transport,
            cartridge,
            chips,
            parts: Vec::new(),
        }
    }

    /// Cartridge geometry
    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    /// Identified parts, one per chip (empty when built with
    /// [`with_cartridge`](Self::with_cartridge))
    pub fn parts(&self) -> &[FlashPart] {
        &self.parts
    }

    /// All chip drivers
    pub fn chips(&self) -> &[FlashChip<T>] {
        &self.chips
    }

    /// Driver for chip `index`
    pub fn chip_mut(&mut self, index: usize) -> Result<&mut FlashChip<T>> {
        let limit = self.chips.len() as u32;
        self.chips.get_mut(index).ok_or(Error::OutOfRange {
            value: index as u32,
            limit,
        })
    }

    /// Geometry and drivers borrowed together
    pub fn split_mut(&mut self) -> (&Cartridge, &mut [FlashChip<T>]) {
        (&self.cartridge, &mut self.chips)
    }

    /// Borrow the transport
    pub fn transport(&self) -> Ref<'_, T> {
        self.transport.borrow()
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&self) -> RefMut<'_, T> {
        self.transport.borrow_mut()
    }

    /// Return every chip to read mode
    ///
    /// Fails with `IllegalState` if a chip is still erasing.
    pub fn reset(&mut self) -> Result<()> {
        for chip in &mut self.chips {
            chip.reset()?;
        }
        Ok(())
    }
}

/// Identify the chips on a cartridge and build a session
///
/// Chips are probed in index order up to the system's maximum. A chip
/// that does not answer ends the probe once at least one chip was found.
/// Every chip is left in read mode.
pub fn detect<T: Transport>(system: System, transport: T) -> Result<CartridgeSession<T>> {
    let transport = Rc::new(RefCell::new(transport));
    let commands = system.command_set();

    let mut drivers = Vec::new();
    let mut geometry = Vec::new();
    let mut parts = Vec::new();
    let mut base = 0u32;

    for index in 0..system.max_chips() {
        let mut driver = FlashChip::new(Rc::clone(&transport), index, commands);
        let id = driver.identify()?;
        driver.reset()?;

        if id.is_absent() {
            log::debug!("chip {}: no answer (ID {})", index, id);
            if index == 0 {
                return Err(Error::ChipNotFound { chip: index });
            }
            break;
        }

        let part = chip::lookup(id).ok_or(Error::ChipNotFound { chip: index })?;
        log::info!(
            "Found {} {} flash ({}) at chip {}",
            part.vendor,
            part.name,
            id,
            index
        );

        let mut layout = Chip::new(base, part.size, system.block_layout(part.size)?)?;
        driver.set_geometry(layout.clone());
        if transport.borrow().supports_block_protection() {
            for block in 0..layout.block_count() {
                let protected = driver.block_protection(layout.block_base_address(block)?)?;
                if protected {
                    log::debug!("chip {}: block {} is protected", index, block);
                }
                layout.set_block_protected(block, protected)?;
            }
            driver.set_geometry(layout.clone());
        }

        base = base.checked_add(part.size).ok_or(Error::OutOfRange {
            value: base,
            limit: u32::MAX,
        })?;
        drivers.push(driver);
        geometry.push(layout);
        parts.push(part);
    }

    let cartridge = Cartridge::new(system, geometry)?;
    log::info!(
        "{} cartridge: {} chip(s), {} KiB",
        system,
        cartridge.chip_count(),
        cartridge.size() / 1024
    );

    Ok(CartridgeSession {
        transport,
        cartridge,
        chips: drivers,
        parts,
    })
}
