//! Memory bank controllers.
//!
//! A mapper only decodes CPU writes into register state. The controller turns
//! that state into base pointers and command selectors, and applies the
//! returned [`MapperEffect`] to the RTC and the save tracking.

use std::fmt;

use crate::rtc::RtcRegister;

mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;
mod no_mbc;

pub use mbc1::Mbc1;
pub use mbc2::Mbc2;
pub use mbc3::Mbc3;
pub use mbc5::Mbc5;
pub use no_mbc::NoMbc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

impl MapperKind {
    /// Decodes the cartridge type byte at 0x0147.
    pub fn from_cartridge_type(cart_type: u8) -> Option<Self> {
        match cart_type {
            0x00 | 0x08 | 0x09 => Some(MapperKind::None),
            0x01..=0x03 => Some(MapperKind::Mbc1),
            0x05..=0x07 => Some(MapperKind::Mbc2),
            0x0F..=0x13 => Some(MapperKind::Mbc3),
            0x19..=0x1E => Some(MapperKind::Mbc5),
            _ => None,
        }
    }

    pub fn instantiate(self, geometry: BankGeometry) -> Box<dyn Mapper> {
        match self {
            MapperKind::None => Box::new(NoMbc::new(geometry)),
            MapperKind::Mbc1 => Box::new(Mbc1::new(geometry)),
            MapperKind::Mbc2 => Box::new(Mbc2::new(geometry)),
            MapperKind::Mbc3 => Box::new(Mbc3::new(geometry)),
            MapperKind::Mbc5 => Box::new(Mbc5::new(geometry)),
        }
    }
}

impl fmt::Display for MapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapperKind::None => "none",
            MapperKind::Mbc1 => "MBC1",
            MapperKind::Mbc2 => "MBC2",
            MapperKind::Mbc3 => "MBC3",
            MapperKind::Mbc5 => "MBC5",
        };
        f.write_str(name)
    }
}

/// Bank counts of the loaded game. Both are powers of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankGeometry {
    pub rom_banks: u16,
    pub ram_banks: u8,
    pub has_rtc: bool,
}

impl BankGeometry {
    pub const fn rom_mask(&self) -> u16 {
        self.rom_banks.saturating_sub(1)
    }

    pub const fn ram_mask(&self) -> u8 {
        self.ram_banks.saturating_sub(1)
    }

    pub const fn has_ram(&self) -> bool {
        self.ram_banks > 0
    }
}

/// What the DMA pipeline serves at 0xA000-0xBFFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamWindow {
    /// Reads return 0xFF, writes are dropped.
    Disabled,
    Bank(u8),
    Rtc(RtcRegister),
}

/// Side effect of a mapper write beyond bank selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperEffect {
    None,
    /// The write landed in save RAM.
    RamWrite,
    /// The write targets the selected RTC register.
    RtcWrite(u8),
    RtcLatch,
}

pub trait Mapper: fmt::Debug + Send {
    fn kind(&self) -> MapperKind;

    /// Applies one CPU write in 0x0000-0x7FFF or 0xA000-0xBFFF.
    fn write(&mut self, addr: u16, data: u8) -> MapperEffect;

    /// Bank mapped at 0x4000-0x7FFF, already masked.
    fn rom_bank(&self) -> u16;

    fn ram_window(&self) -> RamWindow;
}

pub(crate) fn is_ram_address(addr: u16) -> bool {
    (0xA000..0xC000).contains(&addr)
}

/// RAM enable register semantics shared by every MBC.
pub(crate) fn ram_enable_value(data: u8) -> bool {
    data & 0x0F == 0x0A
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartridge_types_map_to_kinds() {
        assert_eq!(MapperKind::from_cartridge_type(0x00), Some(MapperKind::None));
        assert_eq!(MapperKind::from_cartridge_type(0x03), Some(MapperKind::Mbc1));
        assert_eq!(MapperKind::from_cartridge_type(0x06), Some(MapperKind::Mbc2));
        assert_eq!(MapperKind::from_cartridge_type(0x07), Some(MapperKind::Mbc2));
        assert_eq!(MapperKind::from_cartridge_type(0x10), Some(MapperKind::Mbc3));
        assert_eq!(MapperKind::from_cartridge_type(0x1E), Some(MapperKind::Mbc5));
        assert_eq!(MapperKind::from_cartridge_type(0x20), None);
        assert_eq!(MapperKind::from_cartridge_type(0xFC), None);
    }

    #[test]
    fn masks_follow_counts() {
        let geometry = BankGeometry {
            rom_banks: 64,
            ram_banks: 4,
            has_rtc: false,
        };
        assert_eq!(geometry.rom_mask(), 0x3F);
        assert_eq!(geometry.ram_mask(), 0x03);

        let empty = BankGeometry {
            rom_banks: 2,
            ram_banks: 0,
            has_rtc: false,
        };
        assert_eq!(empty.ram_mask(), 0);
        assert!(!empty.has_ram());
    }
}
