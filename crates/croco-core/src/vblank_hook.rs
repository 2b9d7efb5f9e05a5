//! Save trap inside the game's vblank handler.
//!
//! While the hook image is mapped, the vblank vector at 0x40 jumps to 0x50,
//! which jumps to 0x100, which jumps back to 0x40. Once the CPU is spinning in
//! that loop it is not touching cartridge RAM, so the save RAM can be copied
//! out safely.

/// Patched jumps applied over the game's bank 0 to build the hook image.
pub const HOOK_PATCHES: [(u16, &[u8]); 3] = [
    (0x0040, &[0xC3, 0x50, 0x00]),
    (0x0050, &[0xC3, 0x00, 0x01]),
    (0x0100, &[0xC3, 0x40, 0x00]),
];

/// Fetch address of the last operand byte of the loop's jump back. Once it
/// is seen after a save, the game's own bank 0 can be mapped back.
pub const HOOK_RELEASE_ADDR: u16 = 0x0102;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookState {
    #[default]
    Idle,
    Interrupt,
    Processing,
    SaveTriggered,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    None,
    Save,
}

#[derive(Debug, Default)]
pub struct VblankHookDetector {
    state: HookState,
}

impl VblankHookDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = HookState::Idle;
    }

    /// Feeds one read address.
    pub fn advance(&mut self, addr: u16) -> HookAction {
        let from = match self.state {
            HookState::SaveTriggered | HookState::Returned => HookState::Idle,
            state => state,
        };

        self.state = match (from, addr) {
            (HookState::Idle, 0x0040) => HookState::Interrupt,
            (HookState::Idle, _) => HookState::Idle,
            (HookState::Interrupt, 0x0040..=0x0042) => HookState::Interrupt,
            (HookState::Interrupt, 0x0050) => HookState::Processing,
            (HookState::Interrupt, _) => HookState::Idle,
            (HookState::Processing, 0x0051..=0x0052) => HookState::Processing,
            (HookState::Processing, 0x0100) => HookState::SaveTriggered,
            (HookState::Processing, _) => HookState::Returned,
            (HookState::SaveTriggered | HookState::Returned, _) => HookState::Idle,
        };

        if self.state == HookState::SaveTriggered {
            HookAction::Save
        } else {
            HookAction::None
        }
    }
}
