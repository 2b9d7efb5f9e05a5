//! Game Boy cartridge emulation for an RP2040 sitting on the cartridge bus.
//!
//! Bus accesses are answered by chained DMA channels reading from base
//! pointers in SRAM. The CPU only watches the bus through a PIO snooper and
//! updates those pointers when the game switches banks. Hardware is reached
//! through the [`mmio::Mmio`] trait, so the same code runs on the chip and
//! against the [`sim::SimBus`] register model.

/// Platform actions: state machine control, flash mode, LED, UART, timer.
pub mod board;

/// Decoding of the bus snooper's FIFO words.
pub mod bus;

/// Flash bank pool and the list of stored ROMs.
pub mod catalog;

/// Compile-time board configuration and the hook mode.
pub mod config;

/// Base pointers and selectors the DMA engine dereferences.
pub mod context;

/// The load sequence and main loop.
pub mod controller;

/// `log` backend writing to the debug UART.
pub mod diagnostics;

pub mod error;

/// Cartridge header parsing.
pub mod header;

/// WS2812 status LED encoding.
pub mod led;

/// Memory bank controllers.
pub mod mapper;

/// Boot menu: ROM list, selection handoff and its service loop.
pub mod menu;

pub mod mmio;

/// Chained-DMA bus-service pipeline.
pub mod pipeline;

/// RP2040 register map.
pub mod rp2040;

/// MBC3 real-time clock.
pub mod rtc;

/// Register-level RP2040 model for tests and the host simulator.
pub mod sim;

/// CGB speed switch detection.
pub mod speed_switch;

/// ROM lookup and save persistence.
pub mod storage;

/// Lock-free transmit ring for the debug UART.
pub mod uart;

/// Save trap in the game's vblank handler.
pub mod vblank_hook;

pub use controller::{CartridgeController, LoadOptions};
pub use error::{Error, Result};
