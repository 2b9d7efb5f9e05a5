//! DMA-visible cartridge state.
//!
//! [`CartridgeBusContext`] owns the installed pipeline and every word the DMA
//! engine dereferences on a bus access: the three base pointers, the command
//! list selectors and the RTC latch pointer. The controller only talks to it
//! through "set active ..." methods, each of which stores a word only when the
//! value actually changes.

use log::{trace, warn};

use crate::config::{
    GB_MAX_RAM_BANKS, GB_RAM_BANK_SIZE, GB_ROM_BANK_SIZE, XIP_NOCACHE_NOALLOC_BASE,
};
use crate::error::{Error, Result};
use crate::mapper::RamWindow;
use crate::mmio::Mmio;
use crate::pipeline::{BusServicePipeline, CommandListId, PipelineLayout, Slot};
use crate::rtc::{RtcRegisters, RtcSnapshot};

/// Marker left in the arena while save RAM holds unpersisted data.
const SESSION_DIRTY: u32 = 0x5954_5244;

/// SRAM placement of the buffers the pipeline serves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Pipeline arena, 8-byte aligned.
    pub arena: u32,
    /// Copy of ROM bank 0, 16K aligned.
    pub low_rom: u32,
    /// Bank 0 with the save hook patched in, 16K aligned.
    pub hook_rom: u32,
    /// `GB_MAX_RAM_BANKS + 1` banks of 8K; the last one is the spare bank
    /// used while no game RAM is mapped and by the boot menu.
    pub ram: u32,
}

impl MemoryLayout {
    pub const RAM_SIZE: u32 = (GB_MAX_RAM_BANKS as u32 + 1) * GB_RAM_BANK_SIZE;

    pub const fn ram_bank(&self, bank: u8) -> u32 {
        self.ram + bank as u32 * GB_RAM_BANK_SIZE
    }

    pub const fn spare_ram_bank(&self) -> u32 {
        self.ram_bank(GB_MAX_RAM_BANKS)
    }
}

/// How the ROM-high base word addresses the active bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RomHighMode {
    /// The word holds the bank's address.
    #[default]
    Memory,
    /// The word holds the flash offset shifted left by 8 with the SPI read
    /// command (`0x03`) in the low byte, for the flash streaming program.
    FlashDirect,
}

/// Which image answers reads at 0x0000-0x3FFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowRomRegion {
    Game,
    Hook,
}

/// Count of stores into DMA-visible words, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerUpdates {
    pub rom_high: u32,
    pub rom_low: u32,
    pub ram_base: u32,
    pub selectors: u32,
}

#[derive(Debug)]
pub struct CartridgeBusContext<M: Mmio> {
    mmio: M,
    memory: MemoryLayout,
    pipeline: BusServicePipeline,
    rom_banks: Vec<u32>,
    rom_high_mode: RomHighMode,
    rom_bank: Option<u16>,
    ram_window: RamWindow,
    ram_base: u32,
    read_list: CommandListId,
    write_list: CommandListId,
    rtc_index: u8,
    low_rom: LowRomRegion,
    updates: PointerUpdates,
}

impl<M: Mmio> CartridgeBusContext<M> {
    /// Installs the pipeline with the RAM window disabled and the spare bank
    /// as RAM base.
    pub fn new(mut mmio: M, memory: MemoryLayout, rom_high_mode: RomHighMode) -> Result<Self> {
        let pipeline = BusServicePipeline::install(&mut mmio, PipelineLayout::new(memory.arena))?;
        let layout = *pipeline.layout();

        mmio.write_word(layout.slot(Slot::RomLowBase), memory.low_rom);
        mmio.write_word(layout.slot(Slot::RomHighBase), memory.low_rom);
        mmio.write_word(layout.slot(Slot::RamBase), memory.spare_ram_bank());

        Ok(Self {
            mmio,
            memory,
            pipeline,
            rom_banks: Vec::new(),
            rom_high_mode,
            rom_bank: None,
            ram_window: RamWindow::Disabled,
            ram_base: memory.spare_ram_bank(),
            read_list: CommandListId::RamReadDisabled,
            write_list: CommandListId::RamWriteDiscard,
            rtc_index: 0,
            low_rom: LowRomRegion::Game,
            updates: PointerUpdates::default(),
        })
    }

    /// Copies bank 0 into SRAM and maps bank 1 high.
    pub fn attach_rom(&mut self, banks: Vec<u32>) -> Result<()> {
        let Some(&bank0) = banks.first() else {
            return Err(Error::RomTooShort { len: 0 });
        };
        self.mmio
            .copy_words(bank0, self.memory.low_rom, GB_ROM_BANK_SIZE);
        self.rom_banks = banks;
        self.rom_bank = None;
        self.set_rom_bank(1);
        Ok(())
    }

    /// Serves a program of up to two banks straight from SRAM: bank 0 from
    /// the low ROM buffer, bank 1 from the hook buffer. Requires
    /// [`RomHighMode::Memory`].
    pub fn attach_program(&mut self, program: &[u8]) -> Result<()> {
        let bank = GB_ROM_BANK_SIZE as usize;
        if program.is_empty() {
            return Err(Error::RomTooShort { len: 0 });
        }
        if program.len() > 2 * bank {
            return Err(Error::MenuTooLarge { len: program.len() });
        }
        let (low, high) = program.split_at(program.len().min(bank));
        for (dst, bytes) in [(self.memory.low_rom, low), (self.memory.hook_rom, high)] {
            self.mmio.fill_words(dst, GB_ROM_BANK_SIZE, u32::MAX);
            self.mmio.write_bytes(dst, bytes);
        }
        self.rom_banks = vec![self.memory.low_rom, self.memory.hook_rom];
        self.rom_bank = None;
        self.set_low_rom(LowRomRegion::Game);
        self.set_rom_bank(1);
        Ok(())
    }

    pub fn into_mmio(self) -> M {
        self.mmio
    }

    pub fn memory(&self) -> &MemoryLayout {
        &self.memory
    }

    pub fn layout(&self) -> &PipelineLayout {
        self.pipeline.layout()
    }

    pub fn updates(&self) -> PointerUpdates {
        self.updates
    }

    pub fn rom_bank(&self) -> Option<u16> {
        self.rom_bank
    }

    pub fn ram_window(&self) -> RamWindow {
        self.ram_window
    }

    pub fn low_rom(&self) -> LowRomRegion {
        self.low_rom
    }

    pub fn mmio(&self) -> &M {
        &self.mmio
    }

    pub fn mmio_mut(&mut self) -> &mut M {
        &mut self.mmio
    }

    fn store(&mut self, slot: Slot, value: u32) {
        let addr = self.pipeline.layout().slot(slot);
        self.mmio.write_word(addr, value);
    }

    fn rom_high_word(&self, addr: u32) -> u32 {
        match self.rom_high_mode {
            RomHighMode::Memory => addr,
            RomHighMode::FlashDirect => ((addr - XIP_NOCACHE_NOALLOC_BASE) << 8) | 0x03,
        }
    }

    /// Maps `bank` at 0x4000-0x7FFF. Returns whether a pointer was stored.
    pub fn set_rom_bank(&mut self, bank: u16) -> bool {
        if self.rom_bank == Some(bank) || self.rom_banks.is_empty() {
            return false;
        }
        let addr = match self.rom_banks.get(bank as usize) {
            Some(&addr) => addr,
            None => {
                warn!("ROM bank {bank} outside image, wrapping");
                self.rom_banks[bank as usize % self.rom_banks.len()]
            }
        };
        let word = self.rom_high_word(addr);
        self.store(Slot::RomHighBase, word);
        self.rom_bank = Some(bank);
        self.updates.rom_high += 1;
        trace!("ROM bank {bank} -> {word:#010x}");
        true
    }

    /// Points the RAM window at a bank, an RTC register or nothing. Returns
    /// whether anything DMA-visible changed.
    pub fn set_ram_window(&mut self, window: RamWindow) -> bool {
        if self.ram_window == window {
            return false;
        }
        self.ram_window = window;

        let (read_list, write_list) = match window {
            RamWindow::Disabled => (CommandListId::RamReadDisabled, CommandListId::RamWriteDiscard),
            RamWindow::Bank(bank) => {
                // Base first, so an enabled list never sees a stale bank.
                let base = self.memory.ram_bank(bank);
                if base != self.ram_base {
                    self.store(Slot::RamBase, base);
                    self.ram_base = base;
                    self.updates.ram_base += 1;
                }
                (CommandListId::RamRead, CommandListId::RamWrite)
            }
            RamWindow::Rtc(reg) => {
                let index = reg.index() as u8;
                if index != self.rtc_index {
                    let ptr = self.pipeline.layout().rtc_latched(index);
                    self.store(Slot::RtcLatchPtr, ptr);
                    self.rtc_index = index;
                }
                (CommandListId::RtcRead, CommandListId::RamWriteDiscard)
            }
        };

        if read_list != self.read_list {
            let list = self.pipeline.layout().command_list(read_list);
            self.store(Slot::RamReadSelector, list);
            self.read_list = read_list;
            self.updates.selectors += 1;
        }
        if write_list != self.write_list {
            let list = self.pipeline.layout().command_list(write_list);
            self.store(Slot::RamWriteSelector, list);
            self.write_list = write_list;
            self.updates.selectors += 1;
        }
        trace!("RAM window {window:?}");
        true
    }

    pub fn set_low_rom(&mut self, region: LowRomRegion) -> bool {
        if self.low_rom == region {
            return false;
        }
        let base = match region {
            LowRomRegion::Game => self.memory.low_rom,
            LowRomRegion::Hook => self.memory.hook_rom,
        };
        self.store(Slot::RomLowBase, base);
        self.low_rom = region;
        self.updates.rom_low += 1;
        true
    }

    /// Makes the latched registers visible to RTC reads.
    pub fn publish_rtc_latched(&mut self, latched: &RtcRegisters) {
        let [first, second] = pack_registers(latched);
        let addr = self.pipeline.layout().rtc_latched(0);
        self.mmio.write_word(addr, first);
        self.mmio.write_word(addr + 4, second);
    }

    /// Builds the hook image from the game's bank 0 and `patches`.
    pub fn install_hook_image(&mut self, patches: &[(u16, &[u8])]) {
        self.mmio
            .copy_words(self.memory.low_rom, self.memory.hook_rom, GB_ROM_BANK_SIZE);
        for (addr, bytes) in patches {
            self.mmio
                .write_bytes(self.memory.hook_rom + *addr as u32, bytes);
        }
    }

    /// The byte the cartridge currently answers at `addr` (0x0000-0x7FFF).
    pub fn rom_byte(&mut self, addr: u16) -> u8 {
        if addr < 0x4000 {
            let base = match self.low_rom {
                LowRomRegion::Game => self.memory.low_rom,
                LowRomRegion::Hook => self.memory.hook_rom,
            };
            return self.mmio.read_byte(base + addr as u32);
        }
        let bank = self.rom_bank.unwrap_or(1) as usize;
        match self.rom_banks.get(bank) {
            Some(&base) => self.mmio.read_byte(base + (addr as u32 & 0x3FFF)),
            None => 0xFF,
        }
    }

    pub fn read_ram(&mut self, out: &mut [u8]) {
        let ram = self.memory.ram;
        self.mmio.read_bytes(ram, out);
    }

    pub fn write_ram(&mut self, data: &[u8]) {
        let ram = self.memory.ram;
        self.mmio.write_bytes(ram, data);
    }

    pub fn clear_ram(&mut self, len: u32) {
        let ram = self.memory.ram;
        self.mmio.fill_words(ram, len.min(MemoryLayout::RAM_SIZE), 0);
    }

    pub fn mark_session_dirty(&mut self, game: u8) {
        self.store(Slot::LastGame, game as u32);
        self.store(Slot::SessionMagic, SESSION_DIRTY);
    }

    pub fn mark_session_clean(&mut self) {
        self.store(Slot::SessionMagic, 0);
    }

    /// Mirrors the running game's clock into the arena so a reset does not
    /// lose it.
    pub fn store_session_rtc(&mut self, rtc: &RtcSnapshot) {
        let base = self.pipeline.layout().slot(Slot::SessionRtc);
        let [real_lo, real_hi] = pack_registers(&rtc.real);
        let [latched_lo, latched_hi] = pack_registers(&rtc.latched);
        let words = [
            real_lo,
            real_hi,
            latched_lo,
            latched_hi,
            rtc.timestamp as u32,
            (rtc.timestamp >> 32) as u32,
        ];
        for (i, word) in words.into_iter().enumerate() {
            self.mmio.write_word(base + i as u32 * 4, word);
        }
    }

    /// The clock last stored by [`Self::store_session_rtc`].
    pub fn session_rtc(&mut self) -> RtcSnapshot {
        let base = self.pipeline.layout().slot(Slot::SessionRtc);
        let mut words = [0u32; 6];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.mmio.read_word(base + i as u32 * 4);
        }
        RtcSnapshot {
            real: unpack_registers(words[0], words[1]),
            latched: unpack_registers(words[2], words[3]),
            timestamp: words[4] as u64 | (words[5] as u64) << 32,
        }
    }

    /// Game whose save RAM was left unpersisted by the previous run.
    pub fn dirty_session(&mut self) -> Option<u8> {
        let layout = *self.pipeline.layout();
        if self.mmio.read_word(layout.slot(Slot::SessionMagic)) != SESSION_DIRTY {
            return None;
        }
        Some(self.mmio.read_word(layout.slot(Slot::LastGame)) as u8)
    }
}

fn pack_registers(regs: &RtcRegisters) -> [u32; 2] {
    let b = regs.0;
    [u32::from_le_bytes([b[0], b[1], b[2], b[3]]), b[4] as u32]
}

fn unpack_registers(first: u32, second: u32) -> RtcRegisters {
    let [b0, b1, b2, b3] = first.to_le_bytes();
    RtcRegisters([b0, b1, b2, b3, second as u8])
}
