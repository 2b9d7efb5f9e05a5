use super::{
    BankGeometry, Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address, ram_enable_value,
};

#[derive(Debug)]
pub struct Mbc1 {
    geometry: BankGeometry,
    /// 5-bit register at 0x2000, never zero.
    low: u8,
    /// 2-bit register at 0x4000: upper ROM bits in mode 0, RAM bank in mode 1.
    high: u8,
    mode: bool,
    ram_enabled: bool,
}

impl Mbc1 {
    pub fn new(geometry: BankGeometry) -> Self {
        Self {
            geometry,
            low: 1,
            high: 0,
            mode: false,
            ram_enabled: false,
        }
    }
}

impl Mapper for Mbc1 {
    fn kind(&self) -> MapperKind {
        MapperKind::Mbc1
    }

    fn write(&mut self, addr: u16, data: u8) -> MapperEffect {
        match addr & 0xE000 {
            0x0000 => self.ram_enabled = ram_enable_value(data),
            0x2000 => {
                self.low = data & 0x1F;
                if self.low == 0 {
                    self.low = 1;
                }
            }
            0x4000 => self.high = data & 0x03,
            0x6000 => self.mode = data & 0x01 != 0,
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
        let bank = if self.mode {
            self.low as u16
        } else {
            (self.high as u16) << 5 | self.low as u16
        };
        // Masking can land a 2-bank cart on bank 0 again; that still reads bank 1.
        match bank & self.geometry.rom_mask() {
            0 => 1,
            masked => masked,
        }
    }

    fn ram_window(&self) -> RamWindow {
        if !self.ram_enabled || !self.geometry.has_ram() {
            return RamWindow::Disabled;
        }
        let bank = if self.mode { self.high } else { 0 };
        RamWindow::Bank(bank & self.geometry.ram_mask())
    }
}
