use super::{BankGeometry, Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address};

/// 32K ROM, optionally with one unbanked RAM chip.
#[derive(Debug)]
pub struct NoMbc {
    geometry: BankGeometry,
}

impl NoMbc {
    pub fn new(geometry: BankGeometry) -> Self {
        Self { geometry }
    }
}

impl Mapper for NoMbc {
    fn kind(&self) -> MapperKind {
        MapperKind::None
    }

    fn write(&mut self, addr: u16, _data: u8) -> MapperEffect {
        if is_ram_address(addr) && self.geometry.has_ram() {
            MapperEffect::RamWrite
        } else {
            MapperEffect::None
        }
    }

    fn rom_bank(&self) -> u16 {
        1 & self.geometry.rom_mask()
    }

    fn ram_window(&self) -> RamWindow {
        if self.geometry.has_ram() {
            RamWindow::Bank(0)
        } else {
            RamWindow::Disabled
        }
    }
}
