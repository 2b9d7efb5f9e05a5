//! Board wiring and fixed sizes.

use log::warn;

use crate::led::Rgb;

pub const GB_RAM_BANK_SIZE: u32 = 0x2000;
pub const GB_ROM_BANK_SIZE: u32 = 0x4000;

/// 64K of RAM, enough for MBC3 (32K) and most MBC5 games.
pub const GB_MAX_RAM_BANKS: u8 = 8;

/// Reset line of the Game Boy, held high while a game is being prepared.
pub const PIN_GB_RESET: u32 = 26;

/// State machines on PIO1.
pub const SMC_GB_MAIN: u8 = 0;
pub const SMC_GB_RAM_READ: u8 = 2;
pub const SMC_GB_RAM_WRITE: u8 = 3;

/// State machines on PIO0.
pub const SMC_GB_ROM_LOW: u8 = 0;
pub const SMC_GB_WRITE_DATA: u8 = 2;

/// Flash offset where ROM banks are stored, seen through the uncached XIP
/// alias.
pub const ROM_STORAGE_FLASH_OFFSET: u32 = 0x0008_0000;
pub const XIP_NOCACHE_NOALLOC_BASE: u32 = 0x1300_0000;
pub const ROM_STORAGE_XIP_BASE: u32 = XIP_NOCACHE_NOALLOC_BASE + ROM_STORAGE_FLASH_OFFSET;

/// Debug UART transmit ring, a power of two.
pub const UART_TX_BUFFER_SIZE: usize = 256;

/// Status LED while save RAM holds unpersisted writes.
pub const LED_DIRTY: Rgb = Rgb::new(0x15, 0, 0);
pub const LED_OFF: Rgb = Rgb::new(0, 0, 0);

/// Save-trap behaviour selected by the boot menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookMode {
    #[default]
    Disabled,
    /// Persist save RAM from inside the game's vblank handler.
    Variant1,
    /// Like [`HookMode::Variant1`], and also persist the RTC.
    Variant2,
}

impl HookMode {
    pub fn from_mode_byte(mode: u8) -> Self {
        match mode {
            0 => HookMode::Disabled,
            1 => HookMode::Variant1,
            2 => HookMode::Variant2,
            other => {
                warn!("unknown hook mode {other}, running without save hook");
                HookMode::Disabled
            }
        }
    }

    pub const fn mode_byte(self) -> u8 {
        match self {
            HookMode::Disabled => 0,
            HookMode::Variant1 => 1,
            HookMode::Variant2 => 2,
        }
    }

    pub const fn is_enabled(self) -> bool {
        !matches!(self, HookMode::Disabled)
    }

    /// Whether a save also writes the RTC. Only the variant 1 trap skips it.
    pub const fn persists_rtc(self) -> bool {
        !matches!(self, HookMode::Variant1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_byte_roundtrip() {
        for mode in [HookMode::Disabled, HookMode::Variant1, HookMode::Variant2] {
            assert_eq!(HookMode::from_mode_byte(mode.mode_byte()), mode);
        }
        assert_eq!(HookMode::from_mode_byte(7), HookMode::Disabled);
    }
}
