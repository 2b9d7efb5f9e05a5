//! Board-level actions, expressed as register accesses.

use log::debug;

use crate::config::{PIN_GB_RESET, SMC_GB_MAIN};
use crate::led::{Rgb, encode_ws2812};
use crate::mmio::Mmio;
use crate::rp2040::{clr_alias, pio, set_alias, sio, spi, ssi, timer, uart};
use crate::speed_switch::BusSpeed;
use crate::uart::TxRing;

const MAIN_PIO: u8 = 1;

/// SSI data frame size used while reading ROM through XIP or programming
/// flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashWidth {
    Bits8,
    Bits32,
}

impl FlashWidth {
    const fn dfs(self) -> u32 {
        match self {
            FlashWidth::Bits8 => 7,
            FlashWidth::Bits32 => 31,
        }
    }
}

/// RAM-resident copies of the main bus-snoop program for each CPU speed.
#[derive(Debug, Clone, Default)]
pub struct Board {
    normal_program: Vec<u16>,
    double_program: Vec<u16>,
    /// Instruction memory offset the program is loaded at.
    origin: u8,
}

impl Board {
    pub fn new(normal_program: Vec<u16>, double_program: Vec<u16>, origin: u8) -> Self {
        Self {
            normal_program,
            double_program,
            origin,
        }
    }

    /// Microseconds since boot. The high word is re-read until stable.
    pub fn now_us<M: Mmio>(&self, mmio: &mut M) -> u64 {
        loop {
            let hi = mmio.read_word(timer::TIMERAWH);
            let lo = mmio.read_word(timer::TIMERAWL);
            if mmio.read_word(timer::TIMERAWH) == hi {
                return (hi as u64) << 32 | lo as u64;
            }
        }
    }

    pub fn set_main_sm_enabled<M: Mmio>(&self, mmio: &mut M, enabled: bool) {
        let ctrl = pio::base(MAIN_PIO) + pio::CTRL;
        let bit = 1 << (pio::CTRL_SM_ENABLE_LSB + SMC_GB_MAIN as u32);
        if enabled {
            mmio.write_word(set_alias(ctrl), bit);
        } else {
            mmio.write_word(clr_alias(ctrl), bit);
        }
    }

    /// Flash must be in 32-bit mode while the save is programmed and back in
    /// 8-bit mode for the ROM streaming path.
    pub fn set_flash_width<M: Mmio>(&self, mmio: &mut M, width: FlashWidth) {
        mmio.write_word(ssi::SSIENR, 0);
        let ctrlr0 = mmio.read_word(ssi::CTRLR0) & !ssi::CTRLR0_DFS_32_BITS;
        mmio.write_word(
            ssi::CTRLR0,
            ctrlr0 | width.dfs() << ssi::CTRLR0_DFS_32_LSB,
        );
        mmio.write_word(ssi::SSIENR, 1);
    }

    /// Swaps in the snoop program timed for `speed` and restarts the main
    /// state machine at its first instruction.
    pub fn reload_bus_program<M: Mmio>(&self, mmio: &mut M, speed: BusSpeed) {
        let program = match speed {
            BusSpeed::Normal => &self.normal_program,
            BusSpeed::Double => &self.double_program,
        };
        let base = pio::base(MAIN_PIO);

        self.set_main_sm_enabled(mmio, false);
        for (i, &instr) in program.iter().enumerate().take(pio::INSTR_MEM_SIZE) {
            let slot = (self.origin as usize + i) % pio::INSTR_MEM_SIZE;
            mmio.write_word(base + pio::INSTR_MEM0 + 4 * slot as u32, instr as u32);
        }
        mmio.write_word(
            set_alias(base + pio::CTRL),
            1 << (pio::CTRL_SM_RESTART_LSB + SMC_GB_MAIN as u32),
        );
        mmio.write_word(
            pio::sm_instr(MAIN_PIO, SMC_GB_MAIN),
            pio::encode_jmp(self.origin) as u32,
        );
        self.set_main_sm_enabled(mmio, true);
        debug!("bus program reloaded for {speed:?} speed");
    }

    pub fn release_game_reset<M: Mmio>(&self, mmio: &mut M) {
        mmio.write_word(sio::GPIO_OUT_CLR, 1 << PIN_GB_RESET);
    }

    pub fn hold_game_reset<M: Mmio>(&self, mmio: &mut M) {
        mmio.write_word(sio::GPIO_OUT_SET, 1 << PIN_GB_RESET);
    }

    pub fn set_led<M: Mmio>(&self, mmio: &mut M, color: Rgb) {
        for frame in encode_ws2812(color) {
            while mmio.read_word(spi::SPI0_BASE + spi::SSPSR) & spi::SSPSR_TNF == 0 {
                core::hint::spin_loop();
            }
            mmio.write_word(spi::SPI0_BASE + spi::SSPDR, frame as u32);
        }
    }

    /// Moves queued log bytes into the UART FIFO until it is full.
    pub fn pump_uart<M: Mmio>(&self, mmio: &mut M, ring: &TxRing) -> usize {
        ring.drain(|byte| {
            if mmio.read_word(uart::UART0_BASE + uart::FR) & uart::FR_TXFF != 0 {
                return false;
            }
            mmio.write_word(uart::UART0_BASE + uart::DR, byte as u32);
            true
        })
    }
}
