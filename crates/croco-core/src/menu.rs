//! Boot menu handoff.
//!
//! The menu is a Game Boy program served like any cartridge, with the spare
//! RAM bank mapped at 0xA000. The firmware fills that bank with the ROM
//! list; the menu answers by writing into it.

use log::info;

use crate::board::Board;
use crate::bus::{BusEvent, BusSnooper};
use crate::config::{GB_MAX_RAM_BANKS, GB_RAM_BANK_SIZE, HookMode};
use crate::context::{CartridgeBusContext, MemoryLayout, RomHighMode};
use crate::diagnostics;
use crate::error::Result;
use crate::mapper::RamWindow;
use crate::mmio::Mmio;

const NAME_LEN: usize = 16;
const READY_OFFSET: usize = 0x1000;

pub const SELECT_GAME_ADDR: u16 = 0xB000;
pub const SELECT_MODE_ADDR: u16 = 0xB001;
pub const REBOOT_TO_USB_ADDR: u16 = 0xB010;

/// Value at [`SELECT_GAME_ADDR`] while nothing is selected.
const NO_GAME: u8 = 0xFF;

/// Contents of the menu's RAM bank: the ROM count at 0, 16-byte names from
/// 1, and `0xFF` at 0x1000 to tell the menu the list is valid.
pub fn menu_ram_image<S: AsRef<str>>(names: &[S]) -> Vec<u8> {
    let mut ram = vec![0u8; GB_RAM_BANK_SIZE as usize];
    let max = (READY_OFFSET - 1) / NAME_LEN;
    let count = names.len().min(max).min(u8::MAX as usize);
    ram[0] = count as u8;
    for (i, name) in names.iter().take(count).enumerate() {
        let raw = name.as_ref().as_bytes();
        let len = raw.len().min(NAME_LEN);
        let at = 1 + NAME_LEN * i;
        ram[at..at + len].copy_from_slice(&raw[..len]);
    }
    ram[READY_OFFSET] = 0xFF;
    ram
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Launch { game: u8, mode: HookMode },
    RebootToUsb,
}

/// Watches the menu's writes for a selection.
#[derive(Debug, Default)]
pub struct MenuHandoff {
    mode: HookMode,
}

impl MenuHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, addr: u16, data: u8) -> Option<MenuAction> {
        match addr {
            SELECT_MODE_ADDR => {
                self.mode = HookMode::from_mode_byte(data);
                None
            }
            SELECT_GAME_ADDR if data != NO_GAME => Some(MenuAction::Launch {
                game: data,
                mode: self.mode,
            }),
            REBOOT_TO_USB_ADDR => Some(MenuAction::RebootToUsb),
            _ => None,
        }
    }
}

/// The menu running on the Game Boy, served by the same pipeline as a game.
#[derive(Debug)]
pub struct BootMenu<M: Mmio> {
    bus: CartridgeBusContext<M>,
    board: Board,
    snooper: BusSnooper,
    handoff: MenuHandoff,
}

impl<M: Mmio> BootMenu<M> {
    /// Installs `program` with the ROM list in the spare RAM bank, leaving
    /// any save RAM from the last game untouched, then lets the Game Boy
    /// boot.
    pub fn start<S: AsRef<str>>(
        mut mmio: M,
        memory: MemoryLayout,
        board: Board,
        program: &[u8],
        names: &[S],
    ) -> Result<Self> {
        board.hold_game_reset(&mut mmio);
        let mut bus = CartridgeBusContext::new(mmio, memory, RomHighMode::Memory)?;
        bus.attach_program(program)?;

        let spare = bus.memory().spare_ram_bank();
        bus.mmio_mut().write_bytes(spare, &menu_ram_image(names));
        bus.set_ram_window(RamWindow::Bank(GB_MAX_RAM_BANKS));

        board.release_game_reset(bus.mmio_mut());
        info!("boot menu listing {} games", names.len());
        Ok(Self {
            bus,
            board,
            snooper: BusSnooper::new(),
            handoff: MenuHandoff::new(),
        })
    }

    /// Handles at most one bus event. Returns the menu's decision once it
    /// makes one.
    pub fn poll(&mut self) -> Option<MenuAction> {
        self.board
            .pump_uart(self.bus.mmio_mut(), &diagnostics::UART_LOG);
        let BusEvent::Write { addr, data } = self.snooper.poll(self.bus.mmio_mut())? else {
            return None;
        };
        let action = self.handoff.advance(addr, data);
        if let Some(action) = action {
            info!("menu selected {action:?}");
        }
        action
    }

    pub fn mmio_mut(&mut self) -> &mut M {
        self.bus.mmio_mut()
    }

    /// Puts the Game Boy back in reset and hands the hardware on.
    pub fn finish(mut self) -> M {
        self.board.hold_game_reset(self.bus.mmio_mut());
        self.bus.into_mmio()
    }
}
