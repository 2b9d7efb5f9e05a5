use super::{
    BankGeometry, Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address, ram_enable_value,
};

#[derive(Debug)]
pub struct Mbc5 {
    geometry: BankGeometry,
    /// 9-bit bank number; bank 0 is selectable.
    rom_bank: u16,
    ram_bank: u8,
    ram_enabled: bool,
}

impl Mbc5 {
    pub fn new(geometry: BankGeometry) -> Self {
        Self {
            geometry,
            rom_bank: 1,
            ram_bank: 0,
            ram_enabled: false,
        }
    }
}

impl Mapper for Mbc5 {
    fn kind(&self) -> MapperKind {
        MapperKind::Mbc5
    }

    fn write(&mut self, addr: u16, data: u8) -> MapperEffect {
        match addr & 0xF000 {
            0x0000 | 0x1000 => self.ram_enabled = ram_enable_value(data),
            0x2000 => self.rom_bank = (self.rom_bank & 0x0100) | data as u16,
            0x3000 => self.rom_bank = (self.rom_bank & 0x00FF) | ((data as u16 & 0x01) << 8),
            // Bit 3 drives the rumble motor on rumble carts; it is not modelled.
            0x4000 | 0x5000 => self.ram_bank = data & 0x0F,
            _ if is_ram_address(addr) => {
                if matches!(self.ram_window(), RamWindow::Bank(_)) {
                    return MapperEffect::RamWrite;
                }
            }
            _ => {}
        }
        MapperEffect::None
    }

    fn rom_bank(&self) -> u16 {
        self.rom_bank & self.geometry.rom_mask()
    }

    fn ram_window(&self) -> RamWindow {
        if !self.ram_enabled || !self.geometry.has_ram() {
            return RamWindow::Disabled;
        }
        RamWindow::Bank(self.ram_bank & self.geometry.ram_mask())
    }
}
