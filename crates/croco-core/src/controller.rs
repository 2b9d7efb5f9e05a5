//! The cartridge main loop.
//!
//! [`CartridgeController`] loads a game, then services the snooper FIFO
//! forever: mapper writes become pointer and selector stores, reads feed the
//! speed switch and save hook detectors. Nothing in here serves a bus
//! access; the DMA pipeline does that on its own.

use log::{error, info, warn};

use crate::board::{Board, FlashWidth};
use crate::bus::{BusEvent, BusSnooper};
use crate::config::{GB_MAX_RAM_BANKS, GB_RAM_BANK_SIZE, GB_ROM_BANK_SIZE, HookMode, LED_DIRTY, LED_OFF};
use crate::context::{CartridgeBusContext, LowRomRegion, MemoryLayout, RomHighMode};
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::mapper::{Mapper, MapperEffect, MapperKind, RamWindow, is_ram_address};
use crate::mmio::Mmio;
use crate::rtc::GbRtc;
use crate::speed_switch::{BusSpeed, SpeedAction, SpeedSwitchDetector};
use crate::storage::{CartridgeStorage, RomInfo};
use crate::vblank_hook::{HOOK_PATCHES, HOOK_RELEASE_ADDR, HookAction, HookState, VblankHookDetector};

/// What the bootloader hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub game: u8,
    pub hook_mode: HookMode,
    /// Current Unix time, if known. A restored RTC catches up to it.
    pub wall_clock: Option<u64>,
    pub rom_high_mode: RomHighMode,
}

#[derive(Debug)]
pub struct CartridgeController<M: Mmio> {
    bus: CartridgeBusContext<M>,
    board: Board,
    snooper: BusSnooper,
    rom: RomInfo,
    mapper: Box<dyn Mapper>,
    hook_mode: HookMode,
    rtc: Option<GbRtc>,
    speed: SpeedSwitchDetector,
    vblank: VblankHookDetector,
    ram_dirty: bool,
    /// Set after a hook save; the game's bank 0 returns once the CPU leaves
    /// the trap loop.
    release_pending: bool,
    /// Timestamp of the clock copy last mirrored into the arena.
    mirrored_rtc: Option<u64>,
}

impl<M: Mmio> CartridgeController<M> {
    /// Installs the pipeline, recovers an unsaved previous session and
    /// prepares `options.game`. The Game Boy is held in reset until
    /// everything is in place.
    pub fn load<S: CartridgeStorage>(
        mut mmio: M,
        memory: MemoryLayout,
        board: Board,
        storage: &mut S,
        options: LoadOptions,
    ) -> Result<Self> {
        board.hold_game_reset(&mut mmio);
        let mut bus = CartridgeBusContext::new(mmio, memory, options.rom_high_mode)?;
        persist_previous_session(&mut bus, storage);

        let rom = storage.load_rom(options.game)?;
        let kind = rom.mapper().inspect_err(|e| error!("{}: {e}", rom.name))?;
        if rom.header.ram_banks > GB_MAX_RAM_BANKS {
            error!("{}: {} RAM banks", rom.name, rom.header.ram_banks);
            return Err(Error::TooManyRamBanks {
                banks: rom.header.ram_banks,
                max: GB_MAX_RAM_BANKS,
            });
        }
        if rom.banks.len() < rom.header.rom_banks as usize {
            error!(
                "{}: header declares {} ROM banks, storage has {}",
                rom.name,
                rom.header.rom_banks,
                rom.banks.len()
            );
            return Err(Error::RomTooShort {
                len: rom.banks.len() * GB_ROM_BANK_SIZE as usize,
            });
        }

        bus.attach_rom(rom.banks.clone())?;
        restore_save_ram(&mut bus, storage, &rom);

        let rtc = if rom.header.has_rtc() {
            let now = board.now_us(bus.mmio_mut());
            let rtc = restore_rtc(storage, &rom, now, options.wall_clock);
            bus.publish_rtc_latched(rtc.latched());
            Some(rtc)
        } else {
            None
        };

        if options.hook_mode.is_enabled() {
            bus.install_hook_image(&HOOK_PATCHES);
        }

        let mapper = kind.instantiate(rom.geometry());
        bus.set_rom_bank(mapper.rom_bank());
        bus.set_ram_window(mapper.ram_window());

        board.set_led(bus.mmio_mut(), LED_OFF);
        board.release_game_reset(bus.mmio_mut());
        info!(
            "running {} ({kind}, {} ROM banks, {} RAM banks, hook {:?})",
            rom.name, rom.header.rom_banks, rom.header.ram_banks, options.hook_mode
        );

        let mut controller = Self {
            bus,
            board,
            snooper: BusSnooper::new(),
            rom,
            mapper,
            hook_mode: options.hook_mode,
            rtc,
            speed: SpeedSwitchDetector::new(),
            vblank: VblankHookDetector::new(),
            ram_dirty: false,
            release_pending: false,
            mirrored_rtc: None,
        };
        controller.mirror_rtc();
        Ok(controller)
    }

    /// Copies the clock into the arena for session recovery.
    fn mirror_rtc(&mut self) {
        if let Some(rtc) = &self.rtc {
            self.bus.store_session_rtc(&rtc.snapshot());
            self.mirrored_rtc = Some(rtc.timestamp());
        }
    }

    /// One iteration of the main loop. Returns the bus event handled, if
    /// any was waiting.
    pub fn poll<S: CartridgeStorage>(&mut self, storage: &mut S) -> Option<BusEvent> {
        let now = self.board.now_us(self.bus.mmio_mut());
        if let Some(rtc) = &mut self.rtc {
            rtc.perform_tick(now);
            if self.mirrored_rtc != Some(rtc.timestamp()) {
                self.mirror_rtc();
            }
        }
        self.board
            .pump_uart(self.bus.mmio_mut(), &diagnostics::UART_LOG);

        let event = self.snooper.poll(self.bus.mmio_mut())?;
        match event {
            BusEvent::Write { addr, data } => self.handle_write(addr, data, now),
            BusEvent::Read(addr) => self.handle_read(addr, storage),
        }
        Some(event)
    }

    fn handle_write(&mut self, addr: u16, data: u8, now_us: u64) {
        if addr >= 0x8000 && !is_ram_address(addr) {
            return;
        }

        let effect = self.mapper.write(addr, data);
        if addr < 0x8000 {
            self.bus.set_rom_bank(self.mapper.rom_bank());
            let window = self.mapper.ram_window();
            if let (RamWindow::Rtc(reg), Some(rtc)) = (window, self.rtc.as_mut()) {
                rtc.activate_register(reg.index() as u8);
            }
            self.bus.set_ram_window(window);
        }

        match effect {
            MapperEffect::None => {}
            MapperEffect::RamWrite => self.mark_ram_dirty(),
            MapperEffect::RtcWrite(value) => {
                if let Some(rtc) = &mut self.rtc {
                    rtc.write_register(value, now_us);
                    self.mirror_rtc();
                    // A set clock cannot be rebuilt from wall time alone.
                    self.bus.mark_session_dirty(self.rom.index);
                }
            }
            MapperEffect::RtcLatch => {
                if let Some(rtc) = &mut self.rtc {
                    rtc.latch();
                    self.bus.publish_rtc_latched(rtc.latched());
                    self.mirror_rtc();
                }
            }
        }
    }

    fn handle_read<S: CartridgeStorage>(&mut self, addr: u16, storage: &mut S) {
        if self.watches_speed_switch(addr) {
            let byte = self.bus.rom_byte(addr);
            if let SpeedAction::Switch(speed) = self.speed.advance(byte) {
                self.board.reload_bus_program(self.bus.mmio_mut(), speed);
                diagnostics::discard_pending();
            }
        }

        if self.release_pending {
            if addr == HOOK_RELEASE_ADDR {
                self.bus.set_low_rom(LowRomRegion::Game);
                self.release_pending = false;
            }
            return;
        }

        if self.hook_mode.is_enabled()
            && self.bus.low_rom() == LowRomRegion::Hook
            && self.vblank.advance(addr) == HookAction::Save
        {
            self.persist(storage);
        }
    }

    fn watches_speed_switch(&self, addr: u16) -> bool {
        let Some(bank) = self.rom.speed_switch_bank else {
            return false;
        };
        match addr {
            0x0000..=0x3FFF => bank == 0,
            0x4000..=0x7FFF => self.bus.rom_bank() == Some(bank),
            _ => false,
        }
    }

    fn mark_ram_dirty(&mut self) {
        if self.ram_dirty {
            return;
        }
        self.ram_dirty = true;
        self.board.set_led(self.bus.mmio_mut(), LED_DIRTY);
        self.bus.mark_session_dirty(self.rom.index);
        if self.hook_mode.is_enabled() {
            self.bus.set_low_rom(LowRomRegion::Hook);
            self.vblank.reset();
        }
    }

    /// Writes save RAM and the RTC to storage with the snooper stopped. A
    /// hook variant 1 save leaves the RTC out. A failed store is logged and
    /// leaves the session marked dirty so the next boot retries it.
    pub fn persist<S: CartridgeStorage>(&mut self, storage: &mut S) {
        self.board.set_main_sm_enabled(self.bus.mmio_mut(), false);
        self.board
            .set_flash_width(self.bus.mmio_mut(), FlashWidth::Bits32);

        let mut stored = true;
        let len = self.rom.ram_len();
        if len > 0 {
            let mut ram = vec![0u8; len];
            self.bus.read_ram(&mut ram);
            if let Err(e) = storage.store_save_ram(&self.rom, &ram) {
                warn!("saving {} failed: {e}", self.rom.name);
                stored = false;
            }
        }
        if let (true, Some(rtc)) = (self.hook_mode.persists_rtc(), &self.rtc) {
            if let Err(e) = storage.store_rtc(&self.rom, &rtc.snapshot()) {
                warn!("saving RTC of {} failed: {e}", self.rom.name);
                stored = false;
            }
        }

        self.board
            .set_flash_width(self.bus.mmio_mut(), FlashWidth::Bits8);
        self.board.set_main_sm_enabled(self.bus.mmio_mut(), true);

        self.ram_dirty = false;
        self.board.set_led(self.bus.mmio_mut(), LED_OFF);
        if stored {
            self.bus.mark_session_clean();
        }
        if self.bus.low_rom() == LowRomRegion::Hook {
            self.release_pending = true;
        }
        info!("saved {} bytes of {}", len, self.rom.name);
    }

    pub fn bus(&self) -> &CartridgeBusContext<M> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut CartridgeBusContext<M> {
        &mut self.bus
    }

    pub fn mmio_mut(&mut self) -> &mut M {
        self.bus.mmio_mut()
    }

    pub fn rom(&self) -> &RomInfo {
        &self.rom
    }

    pub fn mapper_kind(&self) -> MapperKind {
        self.mapper.kind()
    }

    pub fn hook_mode(&self) -> HookMode {
        self.hook_mode
    }

    pub fn hook_state(&self) -> HookState {
        self.vblank.state()
    }

    pub fn ram_dirty(&self) -> bool {
        self.ram_dirty
    }

    pub fn release_pending(&self) -> bool {
        self.release_pending
    }

    pub fn rtc(&self) -> Option<&GbRtc> {
        self.rtc.as_ref()
    }

    pub fn speed(&self) -> BusSpeed {
        self.speed.speed()
    }
}

/// Saves the RAM and clock of a game whose session ended without a save.
fn persist_previous_session<M: Mmio, S: CartridgeStorage>(
    bus: &mut CartridgeBusContext<M>,
    storage: &mut S,
) {
    let Some(game) = bus.dirty_session() else {
        return;
    };
    match storage.load_rom(game) {
        Ok(rom) => {
            let max = GB_MAX_RAM_BANKS as usize * GB_RAM_BANK_SIZE as usize;
            let len = rom.ram_len().min(max);
            if len > 0 {
                let mut ram = vec![0u8; len];
                bus.read_ram(&mut ram);
                match storage.store_save_ram(&rom, &ram) {
                    Ok(()) => info!("recovered unsaved RAM of {}", rom.name),
                    Err(e) => warn!("recovering RAM of {} failed: {e}", rom.name),
                }
            }
            if rom.header.has_rtc() {
                match storage.store_rtc(&rom, &bus.session_rtc()) {
                    Ok(()) => info!("recovered clock of {}", rom.name),
                    Err(e) => warn!("recovering clock of {} failed: {e}", rom.name),
                }
            }
        }
        Err(e) => warn!("previous session game {game}: {e}"),
    }
    bus.mark_session_clean();
}

fn restore_save_ram<M: Mmio, S: CartridgeStorage>(
    bus: &mut CartridgeBusContext<M>,
    storage: &mut S,
    rom: &RomInfo,
) {
    let len = rom.ram_len();
    bus.clear_ram(len as u32);
    if len == 0 {
        return;
    }
    let mut ram = vec![0u8; len];
    match storage.restore_save_ram(rom, &mut ram) {
        Ok(true) => bus.write_ram(&ram),
        Ok(false) => info!("no save for {}, starting with cleared RAM", rom.name),
        Err(e) => warn!("restoring save of {} failed: {e}", rom.name),
    }
}

fn restore_rtc<S: CartridgeStorage>(
    storage: &mut S,
    rom: &RomInfo,
    now_us: u64,
    wall_clock: Option<u64>,
) -> GbRtc {
    let snapshot = match storage.restore_rtc(rom) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("restoring RTC of {} failed: {e}", rom.name);
            None
        }
    };
    match snapshot {
        Some(snapshot) => {
            let mut rtc = GbRtc::from_snapshot(&snapshot, now_us);
            if let Some(now) = wall_clock {
                rtc.advance_to_new_timestamp(now);
            }
            rtc
        }
        None => {
            let mut rtc = GbRtc::new(now_us);
            if let Some(now) = wall_clock {
                rtc.set_timestamp(now);
            }
            rtc
        }
    }
}
