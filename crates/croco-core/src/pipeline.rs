//! Chained-DMA bus service.
//!
//! Three PIO state machines post bus offsets into their RX FIFOs. Each FIFO
//! paces a *requestor* channel that copies the address of a command list from
//! a selector word into the *loader*. The loader feeds `{read_addr,
//! write_addr}` pairs to the *executor*, which performs each as a single word
//! move and chains back to the loader, until a null pair ends the chain. The
//! command lists program the *memory accessor*, whose completion re-arms the
//! requestor.
//!
//! Nothing here runs per bus access. Switching behaviour means storing a
//! different list address into a selector word.

use log::debug;

use crate::config::{SMC_GB_RAM_READ, SMC_GB_RAM_WRITE, SMC_GB_ROM_LOW, SMC_GB_WRITE_DATA};
use crate::error::{Error, Result};
use crate::mmio::Mmio;
use crate::rp2040::{dma, pio, set_alias};

/// Fixed channel assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelRole {
    CommandExecutor = 0,
    CommandLoader = 1,
    MemoryAccessor = 2,
    RomLowRequestor = 3,
    RamReadRequestor = 4,
    RamWriteRequestor = 5,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 6] = [
        ChannelRole::CommandExecutor,
        ChannelRole::CommandLoader,
        ChannelRole::MemoryAccessor,
        ChannelRole::RomLowRequestor,
        ChannelRole::RamReadRequestor,
        ChannelRole::RamWriteRequestor,
    ];

    pub const fn channel(self) -> u8 {
        self as u8
    }

    pub const fn reg(self, offset: u32) -> u32 {
        dma::channel_reg(self as u8, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSize {
    Byte = 0,
    HalfWord = 1,
    Word = 2,
}

/// A DMA `CTRL` register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctrl(u32);

impl Ctrl {
    /// Enabled, chained to itself (no chaining), unpaced, byte transfers
    /// without address increment.
    pub const fn new(channel: u8) -> Self {
        Ctrl(dma::CTRL_EN
            | (channel as u32) << dma::CTRL_CHAIN_TO_LSB
            | (dma::TREQ_PERMANENT as u32) << dma::CTRL_TREQ_SEL_LSB)
    }

    pub const fn data_size(self, size: DataSize) -> Self {
        Ctrl((self.0 & !(3 << dma::CTRL_DATA_SIZE_LSB)) | (size as u32) << dma::CTRL_DATA_SIZE_LSB)
    }

    pub const fn incr_read(self, on: bool) -> Self {
        self.flag(dma::CTRL_INCR_READ, on)
    }

    pub const fn incr_write(self, on: bool) -> Self {
        self.flag(dma::CTRL_INCR_WRITE, on)
    }

    pub const fn high_priority(self, on: bool) -> Self {
        self.flag(dma::CTRL_HIGH_PRIORITY, on)
    }

    /// Wrap the read (`on_write == false`) or write address on a
    /// `1 << size_bits` byte boundary.
    pub const fn ring(self, on_write: bool, size_bits: u8) -> Self {
        let cleared = self.0 & !(0xF << dma::CTRL_RING_SIZE_LSB) & !dma::CTRL_RING_SEL;
        let sel = if on_write { dma::CTRL_RING_SEL } else { 0 };
        Ctrl(cleared | ((size_bits as u32 & 0xF) << dma::CTRL_RING_SIZE_LSB) | sel)
    }

    pub const fn chain_to(self, channel: u8) -> Self {
        Ctrl((self.0 & !(0xF << dma::CTRL_CHAIN_TO_LSB)) | (channel as u32 & 0xF) << dma::CTRL_CHAIN_TO_LSB)
    }

    pub const fn treq(self, treq: u8) -> Self {
        Ctrl((self.0 & !(0x3F << dma::CTRL_TREQ_SEL_LSB)) | (treq as u32 & 0x3F) << dma::CTRL_TREQ_SEL_LSB)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    const fn flag(self, bit: u32, on: bool) -> Self {
        if on { Ctrl(self.0 | bit) } else { Ctrl(self.0 & !bit) }
    }
}

/// One executor step: copy the word at `read_addr` to `write_addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaCommand {
    pub read_addr: u32,
    pub write_addr: u32,
}

impl DmaCommand {
    pub const NULL: DmaCommand = DmaCommand {
        read_addr: 0,
        write_addr: 0,
    };

    pub const fn new(read_addr: u32, write_addr: u32) -> Self {
        Self {
            read_addr,
            write_addr,
        }
    }
}

/// Every list has the same length, the last entry being [`DmaCommand::NULL`].
pub const COMMANDS_PER_LIST: usize = 5;

/// Static command lists, one per access variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListId {
    RomLowRead,
    RamRead,
    RamReadDisabled,
    RtcRead,
    RamWrite,
    RamWriteDiscard,
}

impl CommandListId {
    pub const ALL: [CommandListId; 6] = [
        CommandListId::RomLowRead,
        CommandListId::RamRead,
        CommandListId::RamReadDisabled,
        CommandListId::RtcRead,
        CommandListId::RamWrite,
        CommandListId::RamWriteDiscard,
    ];

    const fn index(self) -> u32 {
        match self {
            CommandListId::RomLowRead => 0,
            CommandListId::RamRead => 1,
            CommandListId::RamReadDisabled => 2,
            CommandListId::RtcRead => 3,
            CommandListId::RamWrite => 4,
            CommandListId::RamWriteDiscard => 5,
        }
    }
}

/// Words of the pipeline arena that DMA dereferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Slot {
    RomLowBase = 0,
    RomHighBase = 1,
    RamBase = 2,
    RomLowSelector = 3,
    RamReadSelector = 4,
    RamWriteSelector = 5,
    RtcLatchPtr = 6,
    TxFifoPtr = 7,
    RamWriteFifoPtr = 8,
    OpenBusPtr = 9,
    DiscardPtr = 10,
    OpenBus = 11,
    Discard = 12,
    /// Latched RTC registers, five bytes over two words.
    RtcLatched = 13,
    RomLowCtrl = 15,
    RamReadCtrl = 16,
    RamWriteCtrl = 17,
    SessionMagic = 18,
    LastGame = 19,
    /// Clock of the running game: real and latched registers, then the
    /// timestamp, two words each.
    SessionRtc = 20,
}

const SESSION_RTC_WORDS: u32 = 6;
const COMMANDS_OFFSET: u32 = Slot::SessionRtc as u32 + SESSION_RTC_WORDS;
const WORDS_PER_LIST: u32 = COMMANDS_PER_LIST as u32 * 2;

pub const ARENA_WORDS: usize = (COMMANDS_OFFSET + 6 * WORDS_PER_LIST) as usize;

/// Address map of the pipeline arena, an 8-byte aligned block of
/// [`ARENA_WORDS`] words in SRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLayout {
    arena: u32,
}

impl PipelineLayout {
    pub const fn new(arena: u32) -> Self {
        Self { arena }
    }

    pub const fn base(&self) -> u32 {
        self.arena
    }

    pub const fn slot(&self, slot: Slot) -> u32 {
        self.arena + slot as u32 * 4
    }

    pub const fn command_list(&self, list: CommandListId) -> u32 {
        self.arena + (COMMANDS_OFFSET + list.index() * WORDS_PER_LIST) * 4
    }

    /// Address of latched RTC register `index` (0..=4).
    pub const fn rtc_latched(&self, index: u8) -> u32 {
        self.slot(Slot::RtcLatched) + index as u32
    }
}

/// Tracks claimed channels, like the SDK's `dma_channel_claim`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelClaims(u16);

impl ChannelClaims {
    pub fn claim(&mut self, channel: u8) -> Result<()> {
        let bit = 1u16 << channel;
        if self.0 & bit != 0 {
            return Err(Error::ChannelClaimed(channel));
        }
        self.0 |= bit;
        Ok(())
    }
}

/// Register-level configuration of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub read_addr: u32,
    pub write_addr: u32,
    pub trans_count: u32,
    pub ctrl: Ctrl,
}

impl ChannelConfig {
    /// Writes the configuration, starting the channel through `CTRL_TRIG`
    /// when `trigger` is set. A paced channel then waits for its DREQ.
    pub fn apply<M: Mmio>(&self, mmio: &mut M, channel: u8, trigger: bool) {
        mmio.write_word(dma::channel_reg(channel, dma::READ_ADDR), self.read_addr);
        mmio.write_word(dma::channel_reg(channel, dma::WRITE_ADDR), self.write_addr);
        mmio.write_word(dma::channel_reg(channel, dma::TRANS_COUNT), self.trans_count);
        let ctrl_reg = if trigger { dma::CTRL_TRIG } else { dma::AL1_CTRL };
        mmio.write_word(dma::channel_reg(channel, ctrl_reg), self.ctrl.bits());
    }
}

/// The installed pipeline. Knows where every arena word lives.
#[derive(Debug)]
pub struct BusServicePipeline {
    layout: PipelineLayout,
}

impl BusServicePipeline {
    /// Writes the arena (pointers, control words, command lists) and arms the
    /// six channels. Selectors start on the disabled RAM lists.
    pub fn install<M: Mmio>(mmio: &mut M, layout: PipelineLayout) -> Result<Self> {
        let mut claims = ChannelClaims::default();
        for role in ChannelRole::ALL {
            claims.claim(role.channel())?;
        }

        write_constants(mmio, &layout);
        for list in CommandListId::ALL {
            let addr = layout.command_list(list);
            for (i, cmd) in command_list(&layout, list).iter().enumerate() {
                mmio.write_word(addr + i as u32 * 8, cmd.read_addr);
                mmio.write_word(addr + i as u32 * 8 + 4, cmd.write_addr);
            }
        }

        mmio.write_word(
            layout.slot(Slot::RomLowSelector),
            layout.command_list(CommandListId::RomLowRead),
        );
        mmio.write_word(
            layout.slot(Slot::RamReadSelector),
            layout.command_list(CommandListId::RamReadDisabled),
        );
        mmio.write_word(
            layout.slot(Slot::RamWriteSelector),
            layout.command_list(CommandListId::RamWriteDiscard),
        );

        configure_channels(mmio, &layout);
        debug!("DMA pipeline installed at {:#010x}", layout.base());

        Ok(Self { layout })
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

fn write_constants<M: Mmio>(mmio: &mut M, layout: &PipelineLayout) {
    let accessor = ChannelRole::MemoryAccessor.channel();
    let out_dreq = pio::dreq(0, SMC_GB_WRITE_DATA, true);

    let rom_low_ctrl = Ctrl::new(accessor)
        .chain_to(ChannelRole::RomLowRequestor.channel())
        .high_priority(true)
        .treq(out_dreq);
    let ram_read_ctrl = Ctrl::new(accessor)
        .chain_to(ChannelRole::RamReadRequestor.channel())
        .high_priority(true)
        .treq(out_dreq);
    // The data byte follows the offset in the same FIFO; wait for it.
    let ram_write_ctrl = Ctrl::new(accessor)
        .chain_to(ChannelRole::RamWriteRequestor.channel())
        .high_priority(true)
        .treq(pio::dreq(1, SMC_GB_RAM_WRITE, false));

    let words = [
        (Slot::TxFifoPtr, pio::txf(0, SMC_GB_WRITE_DATA)),
        (Slot::RamWriteFifoPtr, pio::rxf(1, SMC_GB_RAM_WRITE)),
        (Slot::OpenBusPtr, layout.slot(Slot::OpenBus)),
        (Slot::DiscardPtr, layout.slot(Slot::Discard)),
        (Slot::OpenBus, 0xFFFF_FFFF),
        (Slot::Discard, 0),
        (Slot::RtcLatchPtr, layout.rtc_latched(0)),
        (Slot::RomLowCtrl, rom_low_ctrl.bits()),
        (Slot::RamReadCtrl, ram_read_ctrl.bits()),
        (Slot::RamWriteCtrl, ram_write_ctrl.bits()),
    ];
    for (slot, value) in words {
        mmio.write_word(layout.slot(slot), value);
    }
    mmio.fill_words(layout.slot(Slot::RtcLatched), 8, 0);
}

/// The command list for one access variant, null-terminated.
pub fn command_list(layout: &PipelineLayout, list: CommandListId) -> [DmaCommand; COMMANDS_PER_LIST] {
    let acc = ChannelRole::MemoryAccessor;
    let slot = |s: Slot| layout.slot(s);

    match list {
        CommandListId::RomLowRead => [
            DmaCommand::new(slot(Slot::RomLowCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(slot(Slot::TxFifoPtr), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(pio::rxf(0, SMC_GB_ROM_LOW), acc.reg(dma::READ_ADDR)),
            DmaCommand::new(
                slot(Slot::RomLowBase),
                set_alias(acc.reg(dma::AL3_READ_ADDR_TRIG)),
            ),
            DmaCommand::NULL,
        ],
        CommandListId::RamRead => [
            DmaCommand::new(slot(Slot::RamReadCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(slot(Slot::TxFifoPtr), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(pio::rxf(1, SMC_GB_RAM_READ), acc.reg(dma::READ_ADDR)),
            DmaCommand::new(
                slot(Slot::RamBase),
                set_alias(acc.reg(dma::AL3_READ_ADDR_TRIG)),
            ),
            DmaCommand::NULL,
        ],
        // The offset still has to be popped, then the source is replaced.
        CommandListId::RamReadDisabled => [
            DmaCommand::new(slot(Slot::RamReadCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(slot(Slot::TxFifoPtr), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(pio::rxf(1, SMC_GB_RAM_READ), acc.reg(dma::READ_ADDR)),
            DmaCommand::new(slot(Slot::OpenBusPtr), acc.reg(dma::AL3_READ_ADDR_TRIG)),
            DmaCommand::NULL,
        ],
        CommandListId::RtcRead => [
            DmaCommand::new(slot(Slot::RamReadCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(slot(Slot::TxFifoPtr), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(pio::rxf(1, SMC_GB_RAM_READ), acc.reg(dma::READ_ADDR)),
            DmaCommand::new(slot(Slot::RtcLatchPtr), acc.reg(dma::AL3_READ_ADDR_TRIG)),
            DmaCommand::NULL,
        ],
        CommandListId::RamWrite => [
            DmaCommand::new(slot(Slot::RamWriteCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(pio::rxf(1, SMC_GB_RAM_WRITE), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(slot(Slot::RamBase), set_alias(acc.reg(dma::WRITE_ADDR))),
            DmaCommand::new(slot(Slot::RamWriteFifoPtr), acc.reg(dma::AL3_READ_ADDR_TRIG)),
            DmaCommand::NULL,
        ],
        CommandListId::RamWriteDiscard => [
            DmaCommand::new(slot(Slot::RamWriteCtrl), acc.reg(dma::AL1_CTRL)),
            DmaCommand::new(pio::rxf(1, SMC_GB_RAM_WRITE), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(slot(Slot::DiscardPtr), acc.reg(dma::WRITE_ADDR)),
            DmaCommand::new(slot(Slot::RamWriteFifoPtr), acc.reg(dma::AL3_READ_ADDR_TRIG)),
            DmaCommand::NULL,
        ],
    }
}

/// Register configuration of each channel at install time. The accessor is
/// only given its transfer count; the command lists program the rest.
pub fn channel_configs(layout: &PipelineLayout) -> [(ChannelRole, ChannelConfig, bool); 6] {
    let loader = ChannelRole::CommandLoader;
    let executor = ChannelRole::CommandExecutor;
    let accessor = ChannelRole::MemoryAccessor;

    let requestor = |role: ChannelRole, selector: Slot, treq: u8| {
        (
            role,
            ChannelConfig {
                read_addr: layout.slot(selector),
                write_addr: loader.reg(dma::AL3_READ_ADDR_TRIG),
                trans_count: 1,
                ctrl: Ctrl::new(role.channel())
                    .data_size(DataSize::Word)
                    .treq(treq),
            },
            true,
        )
    };

    [
        (
            loader,
            ChannelConfig {
                read_addr: 0,
                write_addr: executor.reg(dma::AL2_READ_ADDR),
                // Halt after each command pair.
                trans_count: 2,
                ctrl: Ctrl::new(loader.channel())
                    .data_size(DataSize::Word)
                    .incr_read(true)
                    .incr_write(true)
                    .ring(true, 3),
            },
            false,
        ),
        (
            executor,
            ChannelConfig {
                read_addr: 0,
                write_addr: 0,
                trans_count: 1,
                ctrl: Ctrl::new(executor.channel())
                    .data_size(DataSize::Word)
                    .chain_to(loader.channel()),
            },
            false,
        ),
        (
            accessor,
            ChannelConfig {
                read_addr: 0,
                write_addr: 0,
                trans_count: 1,
                ctrl: Ctrl::new(accessor.channel()),
            },
            false,
        ),
        requestor(
            ChannelRole::RomLowRequestor,
            Slot::RomLowSelector,
            pio::dreq(0, SMC_GB_ROM_LOW, false),
        ),
        requestor(
            ChannelRole::RamReadRequestor,
            Slot::RamReadSelector,
            pio::dreq(1, SMC_GB_RAM_READ, false),
        ),
        requestor(
            ChannelRole::RamWriteRequestor,
            Slot::RamWriteSelector,
            pio::dreq(1, SMC_GB_RAM_WRITE, false),
        ),
    ]
}

fn configure_channels<M: Mmio>(mmio: &mut M, layout: &PipelineLayout) {
    for (role, config, trigger) in channel_configs(layout) {
        // The accessor must not start until a command list fires it.
        let config = if role == ChannelRole::MemoryAccessor {
            ChannelConfig {
                ctrl: Ctrl(config.ctrl.bits() & !dma::CTRL_EN),
                ..config
            }
        } else {
            config
        };
        config.apply(mmio, role.channel(), trigger);
    }
}
