//! Transport traits and abstractions
//!
//! A transport is whatever carries single bus cycles to the cartridge:
//! usually a USB programmer. This module defines the trait every
//! transport implements.

mod traits;

pub use traits::*;
