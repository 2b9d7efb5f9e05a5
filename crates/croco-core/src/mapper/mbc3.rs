use super::{
    BankGeometry, Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address, ram_enable_value,
};
use crate::rtc::RtcRegister;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Ram(u8),
    Rtc(RtcRegister),
    Unmapped,
}

#[derive(Debug)]
pub struct Mbc3 {
    geometry: BankGeometry,
    rom_bank: u16,
    selection: Selection,
    ram_enabled: bool,
    /// Set by a 0x00 write to 0x6000; the following 0x01 latches.
    latch_armed: bool,
}

impl Mbc3 {
    pub fn new(geometry: BankGeometry) -> Self {
        Self {
            geometry,
            rom_bank: 1,
            selection: Selection::Ram(0),
            ram_enabled: false,
            latch_armed: false,
        }
    }

    fn select(&mut self, data: u8) {
        self.selection = match data {
            0x00..=0x07 => Selection::Ram(data),
            0x08..=0x0C if self.geometry.has_rtc => match RtcRegister::from_selector(data) {
                Some(reg) => Selection::Rtc(reg),
                None => Selection::Unmapped,
            },
            _ => Selection::Unmapped,
        };
    }
}

impl Mapper for Mbc3 {
    fn kind(&self) -> MapperKind {
        MapperKind::Mbc3
    }

    fn write(&mut self, addr: u16, data: u8) -> MapperEffect {
        match addr & 0xE000 {
            0x0000 => self.ram_enabled = ram_enable_value(data),
            0x2000 => {
                self.rom_bank = (data & 0x7F) as u16;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0x4000 => self.select(data),
            0x6000 => {
                let latch = self.latch_armed && data == 0x01;
                self.latch_armed = data == 0x00;
                if latch && self.geometry.has_rtc {
                    return MapperEffect::RtcLatch;
                }
            }
            _ if is_ram_address(addr) => {
                return match self.ram_window() {
                    RamWindow::Bank(_) => MapperEffect::RamWrite,
                    RamWindow::Rtc(_) => MapperEffect::RtcWrite(data),
                    RamWindow::Disabled => MapperEffect::None,
                };
            }
            _ => {}
        }
        MapperEffect::None
    }

    fn rom_bank(&self) -> u16 {
        self.rom_bank & self.geometry.rom_mask()
    }

    fn ram_window(&self) -> RamWindow {
        if !self.ram_enabled {
            return RamWindow::Disabled;
        }
        match self.selection {
            Selection::Ram(_) if !self.geometry.has_ram() => RamWindow::Disabled,
            Selection::Ram(bank) => RamWindow::Bank(bank & self.geometry.ram_mask()),
            Selection::Rtc(reg) => RamWindow::Rtc(reg),
            Selection::Unmapped => RamWindow::Disabled,
        }
    }
}
