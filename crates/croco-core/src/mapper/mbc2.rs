use super::{
    BankGeometry, Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address, ram_enable_value,
};

/// MBC2. The built-in 512x4 bit RAM is served from one RAM bank without
/// mirroring.
#[derive(Debug)]
pub struct Mbc2 {
    geometry: BankGeometry,
    rom_bank: u8,
    ram_enabled: bool,
}

impl Mbc2 {
    pub fn new(geometry: BankGeometry) -> Self {
        Self {
            geometry,
            rom_bank: 1,
            ram_enabled: false,
        }
    }
}

impl Mapper for Mbc2 {
    fn kind(&self) -> MapperKind {
        MapperKind::Mbc2
    }

    fn write(&mut self, addr: u16, data: u8) -> MapperEffect {
        match addr {
            // Address bit 8 picks the register.
            0x0000..=0x3FFF if addr & 0x0100 == 0 => self.ram_enabled = ram_enable_value(data),
            0x0000..=0x3FFF => {
                self.rom_bank = data & 0x0F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            _ if is_ram_address(addr) && self.ram_enabled => return MapperEffect::RamWrite,
            _ => {}
        }
        MapperEffect::None
    }

    fn rom_bank(&self) -> u16 {
        self.rom_bank as u16 & self.geometry.rom_mask()
    }

    fn ram_window(&self) -> RamWindow {
        if self.ram_enabled {
            RamWindow::Bank(0)
        } else {
            RamWindow::Disabled
        }
    }
}
