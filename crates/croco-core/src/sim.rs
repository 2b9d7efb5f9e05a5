//! Register-level model of the parts of the RP2040 the firmware touches.
//!
//! [`SimBus`] implements [`Mmio`] over SRAM, the flash ROM pool and the
//! peripherals. DMA channels follow the datasheet closely enough to run the
//! real command lists: register aliases, atomic set/clear/xor aliases,
//! trigger registers with the null-trigger rule, chaining, address rings and
//! DREQ pacing. The harness methods play the Game Boy side: they post bus
//! events to the main state machine and serve cartridge reads and writes
//! through the pipeline exactly as the PIO programs would.

use std::collections::VecDeque;

use log::warn;

use crate::catalog::{BankWriter, bank_address};
use crate::config::{
    GB_RAM_BANK_SIZE, GB_ROM_BANK_SIZE, ROM_STORAGE_FLASH_OFFSET, SMC_GB_MAIN, SMC_GB_RAM_READ,
    SMC_GB_RAM_WRITE, SMC_GB_ROM_LOW, SMC_GB_WRITE_DATA, XIP_NOCACHE_NOALLOC_BASE,
};
use crate::context::MemoryLayout;
use crate::led::WS2812_FRAMES;
use crate::mmio::Mmio;
use crate::pipeline::{PipelineLayout, Slot};
use crate::rp2040::{
    REG_ALIAS_CLR, REG_ALIAS_SET, REG_ALIAS_XOR, dma, pio, sio, spi, sram, ssi, timer, uart,
};

/// Buffer placement used with the simulator.
pub const SIM_LAYOUT: MemoryLayout = MemoryLayout {
    low_rom: 0x2000_0000,
    hook_rom: 0x2000_4000,
    ram: 0x2000_8000,
    arena: 0x2003_0000,
};

pub const UART_FIFO_DEPTH: usize = 32;
pub const DEFAULT_MAIN_FIFO_DEPTH: usize = 8;

const DMA_STEP_LIMIT: usize = 10_000;
const FLASH_BANKS: u16 = crate::catalog::MAX_BANKS;

/// Platform actions the simulator observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// SSI re-enabled with this frame size in bits.
    FlashWidth(u8),
    /// State machine restart of `(pio, sm)`.
    SmRestart(u8, u8),
    MainSmEnabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Size {
    Byte,
    HalfWord,
    Word,
}

impl Size {
    fn from_ctrl(ctrl: u32) -> Self {
        match (ctrl >> dma::CTRL_DATA_SIZE_LSB) & 3 {
            0 => Size::Byte,
            1 => Size::HalfWord,
            _ => Size::Word,
        }
    }

    fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::HalfWord => 2,
            Size::Word => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimChannel {
    read_addr: u32,
    write_addr: u32,
    /// Reload value written through a `TRANS_COUNT` alias.
    trans_count: u32,
    remaining: u32,
    ctrl: u32,
    busy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelReg {
    ReadAddr,
    WriteAddr,
    TransCount,
    Ctrl,
}

/// Register and trigger flag for a channel-relative offset.
fn decode_channel_reg(offset: u32) -> Option<(ChannelReg, bool)> {
    let decoded = match offset {
        dma::READ_ADDR | dma::AL1_READ_ADDR | dma::AL2_READ_ADDR => (ChannelReg::ReadAddr, false),
        dma::AL3_READ_ADDR_TRIG => (ChannelReg::ReadAddr, true),
        dma::WRITE_ADDR | dma::AL1_WRITE_ADDR | dma::AL3_WRITE_ADDR => {
            (ChannelReg::WriteAddr, false)
        }
        dma::AL2_WRITE_ADDR_TRIG => (ChannelReg::WriteAddr, true),
        dma::TRANS_COUNT | dma::AL2_TRANS_COUNT | dma::AL3_TRANS_COUNT => {
            (ChannelReg::TransCount, false)
        }
        dma::AL1_TRANS_COUNT_TRIG => (ChannelReg::TransCount, true),
        dma::AL1_CTRL | dma::AL2_CTRL | dma::AL3_CTRL => (ChannelReg::Ctrl, false),
        dma::CTRL_TRIG => (ChannelReg::Ctrl, true),
        _ => return None,
    };
    Some(decoded)
}

#[derive(Debug, Clone)]
struct SimPio {
    ctrl: u32,
    instr: [u16; pio::INSTR_MEM_SIZE],
    tx: [VecDeque<u32>; 4],
    rx: [VecDeque<u32>; 4],
}

impl Default for SimPio {
    fn default() -> Self {
        Self {
            ctrl: 0,
            instr: [0; pio::INSTR_MEM_SIZE],
            tx: Default::default(),
            rx: Default::default(),
        }
    }
}

#[derive(Debug)]
pub struct SimBus {
    sram: Vec<u8>,
    /// ROM pool, starting at `ROM_STORAGE_FLASH_OFFSET`. Grows on demand;
    /// unwritten flash reads as erased.
    flash: Vec<u8>,
    next_flash_bank: u16,
    channels: [SimChannel; dma::NUM_CHANNELS as usize],
    pio: [SimPio; 2],
    main_fifo_depth: usize,
    dropped_events: usize,
    time_us: u64,
    uart_fifo: usize,
    uart_output: Vec<u8>,
    spi_frames: Vec<u16>,
    ssi_ctrlr0: u32,
    gpio_out: u32,
    events: Vec<SimEvent>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self::with_fifo_depth(DEFAULT_MAIN_FIFO_DEPTH)
    }

    /// `depth` is the number of words the main state machine's RX FIFO
    /// holds before bus events are lost.
    pub fn with_fifo_depth(depth: usize) -> Self {
        let mut bus = Self {
            sram: vec![0; sram::SIZE as usize],
            flash: Vec::new(),
            next_flash_bank: 0,
            channels: [SimChannel::default(); dma::NUM_CHANNELS as usize],
            pio: [SimPio::default(), SimPio::default()],
            main_fifo_depth: depth.max(2),
            dropped_events: 0,
            time_us: 0,
            uart_fifo: 0,
            uart_output: Vec::new(),
            spi_frames: Vec::new(),
            ssi_ctrlr0: 7 << ssi::CTRLR0_DFS_32_LSB,
            gpio_out: 0,
            events: Vec::new(),
        };
        // The main state machine runs from boot.
        bus.pio[1].ctrl = 1 << (pio::CTRL_SM_ENABLE_LSB + SMC_GB_MAIN as u32);
        bus
    }

    pub fn layout(&self) -> MemoryLayout {
        SIM_LAYOUT
    }

    /// Copies a ROM image into the next free flash banks and returns their
    /// XIP addresses.
    pub fn load_flash(&mut self, image: &[u8]) -> Vec<u32> {
        let mut banks = Vec::new();
        for chunk in image.chunks(GB_ROM_BANK_SIZE as usize) {
            let bank = self.next_flash_bank % FLASH_BANKS;
            self.next_flash_bank += 1;
            self.erase_bank(bank);
            self.program_bank(bank, chunk);
            banks.push(bank_address(bank));
        }
        banks
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn uart_output(&self) -> &[u8] {
        &self.uart_output
    }

    pub fn spi_frames(&self) -> &[u16] {
        &self.spi_frames
    }

    /// The last complete WS2812 frame group sent to the LED.
    pub fn last_led_frames(&self) -> Option<&[u16]> {
        let len = self.spi_frames.len();
        (len >= WS2812_FRAMES).then(|| &self.spi_frames[len - WS2812_FRAMES..])
    }

    pub fn gpio_high(&self, pin: u32) -> bool {
        self.gpio_out & (1 << pin) != 0
    }

    pub fn main_sm_enabled(&self) -> bool {
        self.pio[1].ctrl & (1 << (pio::CTRL_SM_ENABLE_LSB + SMC_GB_MAIN as u32)) != 0
    }

    pub fn pio_instr(&self, block: u8, index: usize) -> u16 {
        self.pio[block as usize & 1].instr[index % pio::INSTR_MEM_SIZE]
    }

    pub fn dropped_events(&self) -> usize {
        self.dropped_events
    }

    pub fn pending_events(&self) -> usize {
        self.pio[1].rx[SMC_GB_MAIN as usize].len()
    }

    pub fn now_us(&self) -> u64 {
        self.time_us
    }

    /// Moves time forward. The UART FIFO drains in the meantime.
    pub fn advance_time_us(&mut self, us: u64) {
        self.time_us += us;
        if us > 0 {
            self.uart_fifo = 0;
        }
    }

    fn post_main(&mut self, words: &[u32]) {
        if !self.main_sm_enabled() {
            return;
        }
        let fifo = &mut self.pio[1].rx[SMC_GB_MAIN as usize];
        if fifo.len() + words.len() > self.main_fifo_depth {
            self.dropped_events += 1;
            return;
        }
        fifo.extend(words.iter().copied());
    }

    /// Posts a read to the main state machine only.
    pub fn push_read(&mut self, addr: u16) {
        self.post_main(&[crate::bus::BusEvent::encode_word(false, addr)]);
    }

    /// Posts a write to the main state machine only.
    pub fn push_write(&mut self, addr: u16, data: u8) {
        self.post_main(&[crate::bus::BusEvent::encode_word(true, addr), data as u32]);
    }

    fn pop_write_data(&mut self) -> Option<u8> {
        self.pio[0].tx[SMC_GB_WRITE_DATA as usize]
            .pop_front()
            .map(|w| w as u8)
    }

    /// A Game Boy read: posts it to the main state machine and returns the
    /// byte the cartridge drives onto the bus.
    pub fn gb_read(&mut self, addr: u16) -> u8 {
        self.push_read(addr);
        match addr {
            0x0000..=0x3FFF => {
                self.pio[0].rx[SMC_GB_ROM_LOW as usize].push_back(addr as u32);
                self.run_dma();
                self.pop_write_data().unwrap_or_else(|| {
                    warn!("ROM low read {addr:#06x} not served");
                    0xFF
                })
            }
            0x4000..=0x7FFF => {
                let slot = PipelineLayout::new(SIM_LAYOUT.arena).slot(Slot::RomHighBase);
                let word = self.load(slot, Size::Word);
                let base = if word & 0xFF == 0x03 {
                    XIP_NOCACHE_NOALLOC_BASE + (word >> 8)
                } else {
                    word
                };
                self.load(base + (addr as u32 & 0x3FFF), Size::Byte) as u8
            }
            0xA000..=0xBFFF => {
                let offset = addr as u32 & (GB_RAM_BANK_SIZE - 1);
                self.pio[1].rx[SMC_GB_RAM_READ as usize].push_back(offset);
                self.run_dma();
                self.pop_write_data().unwrap_or_else(|| {
                    warn!("RAM read {addr:#06x} not served");
                    0xFF
                })
            }
            _ => 0xFF,
        }
    }

    /// A Game Boy write: posts it to the main state machine and lets the
    /// pipeline store RAM writes.
    pub fn gb_write(&mut self, addr: u16, data: u8) {
        self.push_write(addr, data);
        if (0xA000..0xC000).contains(&addr) {
            let fifo = &mut self.pio[1].rx[SMC_GB_RAM_WRITE as usize];
            fifo.push_back(addr as u32 & (GB_RAM_BANK_SIZE - 1));
            fifo.push_back(data as u32);
            self.run_dma();
        }
    }

    fn sram_index(addr: u32, len: u32) -> Option<usize> {
        let end = sram::BASE + sram::SIZE;
        (addr >= sram::BASE && addr.saturating_add(len) <= end).then(|| (addr - sram::BASE) as usize)
    }

    fn flash_index(addr: u32) -> Option<usize> {
        let start = XIP_NOCACHE_NOALLOC_BASE + ROM_STORAGE_FLASH_OFFSET;
        let end = start + FLASH_BANKS as u32 * GB_ROM_BANK_SIZE;
        (start..end)
            .contains(&addr)
            .then(|| (addr - start) as usize)
    }

    fn load(&mut self, addr: u32, size: Size) -> u32 {
        let len = size.bytes();
        if let Some(i) = Self::sram_index(addr, len) {
            return le_value(&self.sram[i..i + len as usize]);
        }
        if let Some(i) = Self::flash_index(addr) {
            let mut value = 0u32;
            for n in 0..len as usize {
                let byte = self.flash.get(i + n).copied().unwrap_or(0xFF);
                value |= (byte as u32) << (8 * n);
            }
            return value;
        }
        self.load_register(addr & !3)
    }

    fn store(&mut self, addr: u32, size: Size, value: u32) {
        let len = size.bytes();
        if let Some(i) = Self::sram_index(addr, len) {
            let bytes = value.to_le_bytes();
            self.sram[i..i + len as usize].copy_from_slice(&bytes[..len as usize]);
            return;
        }
        if Self::flash_index(addr).is_some() {
            warn!("write to XIP flash at {addr:#010x} ignored");
            return;
        }
        // Narrow peripheral writes replicate the value across the word.
        let value = match size {
            Size::Byte => (value & 0xFF) * 0x0101_0101,
            Size::HalfWord => (value & 0xFFFF) * 0x0001_0001,
            Size::Word => value,
        };
        self.store_register(addr & !3, value);
    }

    fn is_aliased_peripheral(addr: u32) -> bool {
        (0x4000_0000..0x6000_0000).contains(&addr)
    }

    fn load_register(&mut self, addr: u32) -> u32 {
        let reg = if Self::is_aliased_peripheral(addr) {
            addr & !0x3000
        } else {
            addr
        };

        if let Some((ch, offset)) = dma_channel(reg) {
            let channel = &self.channels[ch];
            return match decode_channel_reg(offset) {
                Some((ChannelReg::ReadAddr, _)) => channel.read_addr,
                Some((ChannelReg::WriteAddr, _)) => channel.write_addr,
                Some((ChannelReg::TransCount, _)) => channel.remaining,
                Some((ChannelReg::Ctrl, _)) => {
                    channel.ctrl | if channel.busy { dma::CTRL_BUSY } else { 0 }
                }
                None => 0,
            };
        }
        if let Some((block, offset)) = pio_block(reg) {
            return self.load_pio(block, offset);
        }

        match reg {
            timer::TIMERAWH => (self.time_us >> 32) as u32,
            timer::TIMERAWL => self.time_us as u32,
            r if r == uart::UART0_BASE + uart::FR => {
                if self.uart_fifo >= UART_FIFO_DEPTH {
                    uart::FR_TXFF
                } else {
                    0
                }
            }
            r if r == spi::SPI0_BASE + spi::SSPSR => spi::SSPSR_TNF,
            ssi::CTRLR0 => self.ssi_ctrlr0,
            sio::GPIO_OUT => self.gpio_out,
            _ => 0,
        }
    }

    fn load_pio(&mut self, block: usize, offset: u32) -> u32 {
        let state = &mut self.pio[block];
        match offset {
            pio::CTRL => state.ctrl,
            pio::FSTAT => {
                let mut fstat = 0;
                for sm in 0..4 {
                    if state.rx[sm].len() >= pio::FIFO_DEPTH {
                        fstat |= 1 << sm;
                    }
                    if state.rx[sm].is_empty() {
                        fstat |= 1 << (pio::FSTAT_RXEMPTY_LSB + sm as u32);
                    }
                    if state.tx[sm].len() >= pio::FIFO_DEPTH {
                        fstat |= 1 << (pio::FSTAT_TXFULL_LSB + sm as u32);
                    }
                    if state.tx[sm].is_empty() {
                        fstat |= 1 << (24 + sm as u32);
                    }
                }
                fstat
            }
            o if (pio::RXF0..pio::RXF0 + 16).contains(&o) => {
                let sm = ((o - pio::RXF0) / 4) as usize;
                state.rx[sm].pop_front().unwrap_or(0)
            }
            o if (pio::INSTR_MEM0..pio::INSTR_MEM0 + 4 * pio::INSTR_MEM_SIZE as u32).contains(&o) => {
                state.instr[((o - pio::INSTR_MEM0) / 4) as usize] as u32
            }
            _ => 0,
        }
    }

    fn store_register(&mut self, addr: u32, value: u32) {
        let (reg, alias) = if Self::is_aliased_peripheral(addr) {
            (addr & !0x3000, addr & 0x3000)
        } else {
            (addr, 0)
        };

        if let Some((ch, offset)) = dma_channel(reg) {
            self.store_dma(ch, offset, alias, value);
            return;
        }
        if let Some((block, offset)) = pio_block(reg) {
            self.store_pio(block, offset, alias, value);
            return;
        }

        match reg {
            r if r == uart::UART0_BASE + uart::DR => {
                self.uart_output.push(value as u8);
                self.uart_fifo += 1;
            }
            r if r == spi::SPI0_BASE + spi::SSPDR => self.spi_frames.push(value as u16),
            ssi::CTRLR0 => self.ssi_ctrlr0 = value,
            ssi::SSIENR => {
                if value & 1 != 0 {
                    let dfs = (self.ssi_ctrlr0 & ssi::CTRLR0_DFS_32_BITS) >> ssi::CTRLR0_DFS_32_LSB;
                    self.events.push(SimEvent::FlashWidth(dfs as u8 + 1));
                }
            }
            sio::GPIO_OUT => self.gpio_out = value,
            sio::GPIO_OUT_SET => self.gpio_out |= value,
            sio::GPIO_OUT_CLR => self.gpio_out &= !value,
            _ => {}
        }
    }

    fn store_dma(&mut self, ch: usize, offset: u32, alias: u32, value: u32) {
        let Some((reg, trigger)) = decode_channel_reg(offset) else {
            return;
        };
        let channel = &mut self.channels[ch];
        let current = match reg {
            ChannelReg::ReadAddr => channel.read_addr,
            ChannelReg::WriteAddr => channel.write_addr,
            ChannelReg::TransCount => channel.trans_count,
            ChannelReg::Ctrl => channel.ctrl,
        };
        let new = apply_alias(current, alias, value);
        match reg {
            ChannelReg::ReadAddr => channel.read_addr = new,
            ChannelReg::WriteAddr => channel.write_addr = new,
            ChannelReg::TransCount => channel.trans_count = new,
            ChannelReg::Ctrl => channel.ctrl = new & !dma::CTRL_BUSY,
        }
        // Writing zero to a trigger register does not start the channel.
        if trigger && value != 0 {
            self.trigger(ch);
        }
    }

    fn store_pio(&mut self, block: usize, offset: u32, alias: u32, value: u32) {
        let state = &mut self.pio[block];
        match offset {
            pio::CTRL => {
                let old = state.ctrl;
                let new = apply_alias(old, alias, value);
                for sm in 0..4u8 {
                    if new & (1 << (pio::CTRL_SM_RESTART_LSB + sm as u32)) != 0 {
                        self.events.push(SimEvent::SmRestart(block as u8, sm));
                    }
                }
                let enable_mask = 0xF << pio::CTRL_SM_ENABLE_LSB;
                state.ctrl = new & enable_mask;
                let main_bit = 1 << (pio::CTRL_SM_ENABLE_LSB + SMC_GB_MAIN as u32);
                if block == 1 && (old ^ state.ctrl) & main_bit != 0 {
                    self.events
                        .push(SimEvent::MainSmEnabled(state.ctrl & main_bit != 0));
                }
            }
            o if (pio::TXF0..pio::TXF0 + 16).contains(&o) => {
                let sm = ((o - pio::TXF0) / 4) as usize;
                if state.tx[sm].len() < pio::FIFO_DEPTH {
                    state.tx[sm].push_back(value);
                }
            }
            o if (pio::INSTR_MEM0..pio::INSTR_MEM0 + 4 * pio::INSTR_MEM_SIZE as u32).contains(&o) => {
                state.instr[((o - pio::INSTR_MEM0) / 4) as usize] = value as u16;
            }
            _ => {}
        }
    }

    fn trigger(&mut self, ch: usize) {
        let channel = &mut self.channels[ch];
        if channel.ctrl & dma::CTRL_EN == 0 {
            return;
        }
        channel.remaining = channel.trans_count;
        channel.busy = channel.remaining > 0;
    }

    fn dreq_ready(&self, treq: u32) -> bool {
        if treq == dma::TREQ_PERMANENT as u32 {
            return true;
        }
        if treq >= 16 {
            return false;
        }
        let block = (treq / 8) as usize;
        let is_rx = treq % 8 >= 4;
        let sm = (treq % 4) as usize;
        if is_rx {
            !self.pio[block].rx[sm].is_empty()
        } else {
            self.pio[block].tx[sm].len() < pio::FIFO_DEPTH
        }
    }

    /// Runs channels until none can make progress.
    pub fn run_dma(&mut self) {
        for _ in 0..DMA_STEP_LIMIT {
            let mut progressed = false;
            for ch in 0..self.channels.len() {
                let channel = self.channels[ch];
                let treq = (channel.ctrl >> dma::CTRL_TREQ_SEL_LSB) & 0x3F;
                if channel.busy && self.dreq_ready(treq) {
                    self.step_channel(ch);
                    progressed = true;
                }
            }
            if !progressed {
                return;
            }
        }
        warn!("DMA did not settle within {DMA_STEP_LIMIT} steps");
    }

    fn step_channel(&mut self, ch: usize) {
        let channel = self.channels[ch];
        let size = Size::from_ctrl(channel.ctrl);
        let value = self.load(channel.read_addr, size);
        self.store(channel.write_addr, size, value);

        // The store may have reprogrammed this channel; continue from the
        // registers as they are now.
        let ctrl = self.channels[ch].ctrl;
        let ring_bits = (ctrl >> dma::CTRL_RING_SIZE_LSB) & 0xF;
        let ring_on_write = ctrl & dma::CTRL_RING_SEL != 0;
        let step = size.bytes();
        let advance = |addr: u32, on: bool, ring: bool| -> u32 {
            if !on {
                return addr;
            }
            let next = addr.wrapping_add(step);
            if ring && ring_bits > 0 {
                let mask = (1u32 << ring_bits) - 1;
                (addr & !mask) | (next & mask)
            } else {
                next
            }
        };

        let channel = &mut self.channels[ch];
        channel.read_addr = advance(
            channel.read_addr,
            ctrl & dma::CTRL_INCR_READ != 0,
            !ring_on_write,
        );
        channel.write_addr = advance(
            channel.write_addr,
            ctrl & dma::CTRL_INCR_WRITE != 0,
            ring_on_write,
        );
        channel.remaining = channel.remaining.saturating_sub(1);
        if channel.remaining == 0 {
            channel.busy = false;
            let chain = ((ctrl >> dma::CTRL_CHAIN_TO_LSB) & 0xF) as usize;
            if chain != ch {
                self.trigger(chain);
            }
        }
    }
}

fn le_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &b)| acc | (b as u32) << (8 * i))
}

fn apply_alias(current: u32, alias: u32, value: u32) -> u32 {
    match alias {
        REG_ALIAS_XOR => current ^ value,
        REG_ALIAS_SET => current | value,
        REG_ALIAS_CLR => current & !value,
        _ => value,
    }
}

fn dma_channel(reg: u32) -> Option<(usize, u32)> {
    let end = dma::BASE + dma::NUM_CHANNELS as u32 * dma::CHANNEL_STRIDE;
    (dma::BASE..end).contains(&reg).then(|| {
        let offset = reg - dma::BASE;
        (
            (offset / dma::CHANNEL_STRIDE) as usize,
            offset % dma::CHANNEL_STRIDE,
        )
    })
}

fn pio_block(reg: u32) -> Option<(usize, u32)> {
    if (pio::PIO0_BASE..pio::PIO0_BASE + 0x1000).contains(&reg) {
        Some((0, reg - pio::PIO0_BASE))
    } else if (pio::PIO1_BASE..pio::PIO1_BASE + 0x1000).contains(&reg) {
        Some((1, reg - pio::PIO1_BASE))
    } else {
        None
    }
}

impl Mmio for SimBus {
    fn read_word(&mut self, addr: u32) -> u32 {
        self.load(addr, Size::Word)
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        self.store(addr, Size::Word, value);
        self.run_dma();
    }

    fn read_byte(&mut self, addr: u32) -> u8 {
        self.load(addr, Size::Byte) as u8
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        self.store(addr, Size::Byte, value as u32);
        self.run_dma();
    }
}

impl BankWriter for SimBus {
    fn erase_bank(&mut self, bank: u16) {
        let start = bank as usize * GB_ROM_BANK_SIZE as usize;
        let end = start + GB_ROM_BANK_SIZE as usize;
        if self.flash.len() < end {
            self.flash.resize(end, 0xFF);
        }
        self.flash[start..end].fill(0xFF);
    }

    fn program_bank(&mut self, bank: u16, data: &[u8]) {
        let start = bank as usize * GB_ROM_BANK_SIZE as usize;
        let len = data.len().min(GB_ROM_BANK_SIZE as usize);
        if self.flash.len() < start + GB_ROM_BANK_SIZE as usize {
            self.flash.resize(start + GB_ROM_BANK_SIZE as usize, 0xFF);
        }
        // Programming can only clear bits.
        for (dst, &src) in self.flash[start..start + len].iter_mut().zip(data) {
            *dst &= src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Ctrl;

    #[test]
    fn set_alias_ors_into_register() {
        let mut bus = SimBus::new();
        let reg = dma::channel_reg(6, dma::READ_ADDR);
        bus.write_word(reg, 0x0000_0123);
        bus.write_word(reg + REG_ALIAS_SET, 0x2000_0000);
        assert_eq!(bus.read_word(reg), 0x2000_0123);
        bus.write_word(reg + REG_ALIAS_CLR, 0x0000_0023);
        assert_eq!(bus.read_word(reg), 0x2000_0100);
    }

    #[test]
    fn triggered_channel_copies_and_chains() {
        let mut bus = SimBus::new();
        bus.write_word(0x2000_0000, 0xDEAD_BEEF);
        bus.write_word(0x2000_0004, 0x1234_5678);

        // Channel 7 copies two words, then chains to channel 8, which copies
        // the first destination word once more.
        let ctrl8 = Ctrl::new(8).data_size(crate::pipeline::DataSize::Word);
        bus.write_word(dma::channel_reg(8, dma::READ_ADDR), 0x2000_0100);
        bus.write_word(dma::channel_reg(8, dma::WRITE_ADDR), 0x2000_0200);
        bus.write_word(dma::channel_reg(8, dma::TRANS_COUNT), 1);
        bus.write_word(dma::channel_reg(8, dma::AL1_CTRL), ctrl8.bits());

        let ctrl7 = Ctrl::new(7)
            .data_size(crate::pipeline::DataSize::Word)
            .incr_read(true)
            .incr_write(true)
            .chain_to(8);
        bus.write_word(dma::channel_reg(7, dma::READ_ADDR), 0x2000_0000);
        bus.write_word(dma::channel_reg(7, dma::WRITE_ADDR), 0x2000_0100);
        bus.write_word(dma::channel_reg(7, dma::TRANS_COUNT), 2);
        bus.write_word(dma::channel_reg(7, dma::CTRL_TRIG), ctrl7.bits());

        assert_eq!(bus.read_word(0x2000_0104), 0x1234_5678);
        assert_eq!(bus.read_word(0x2000_0200), 0xDEAD_BEEF);
        assert_eq!(bus.read_word(dma::channel_reg(7, dma::TRANS_COUNT)), 0);
    }

    #[test]
    fn null_trigger_does_not_start() {
        let mut bus = SimBus::new();
        let ctrl = Ctrl::new(9).data_size(crate::pipeline::DataSize::Word);
        bus.write_word(dma::channel_reg(9, dma::TRANS_COUNT), 1);
        bus.write_word(dma::channel_reg(9, dma::AL1_CTRL), ctrl.bits());
        bus.write_word(dma::channel_reg(9, dma::WRITE_ADDR), 0x2000_0300);
        bus.write_word(0x2000_0300, 0x5555_5555);
        bus.write_word(dma::channel_reg(9, dma::AL3_READ_ADDR_TRIG), 0);
        assert_eq!(bus.read_word(0x2000_0300), 0x5555_5555);
    }

    #[test]
    fn write_ring_wraps() {
        let mut bus = SimBus::new();
        for i in 0..4u32 {
            bus.write_word(0x2000_0000 + 4 * i, i + 1);
        }
        let ctrl = Ctrl::new(10)
            .data_size(crate::pipeline::DataSize::Word)
            .incr_read(true)
            .incr_write(true)
            .ring(true, 3);
        bus.write_word(dma::channel_reg(10, dma::READ_ADDR), 0x2000_0000);
        bus.write_word(dma::channel_reg(10, dma::WRITE_ADDR), 0x2000_0400);
        bus.write_word(dma::channel_reg(10, dma::TRANS_COUNT), 4);
        bus.write_word(dma::channel_reg(10, dma::CTRL_TRIG), ctrl.bits());
        assert_eq!(bus.read_word(0x2000_0400), 3);
        assert_eq!(bus.read_word(0x2000_0404), 4);
        assert_eq!(bus.read_word(0x2000_0408), 0);
    }

    #[test]
    fn paced_channel_waits_for_fifo() {
        let mut bus = SimBus::new();
        let treq = pio::dreq(1, 3, false);
        let ctrl = Ctrl::new(11).treq(treq);
        bus.write_word(dma::channel_reg(11, dma::READ_ADDR), pio::rxf(1, 3));
        bus.write_word(dma::channel_reg(11, dma::WRITE_ADDR), 0x2000_0500);
        bus.write_word(dma::channel_reg(11, dma::TRANS_COUNT), 1);
        bus.write_word(dma::channel_reg(11, dma::CTRL_TRIG), ctrl.bits());
        assert_ne!(bus.read_word(dma::channel_reg(11, dma::CTRL_TRIG)) & dma::CTRL_BUSY, 0);

        bus.pio[1].rx[3].push_back(0x42);
        bus.run_dma();
        assert_eq!(bus.read_byte(0x2000_0500), 0x42);
    }

    #[test]
    fn main_fifo_drops_when_full() {
        let mut bus = SimBus::with_fifo_depth(2);
        bus.push_read(0x0100);
        bus.push_read(0x0101);
        bus.push_write(0x2000, 1);
        assert_eq!(bus.pending_events(), 2);
        assert_eq!(bus.dropped_events(), 1);
    }

    #[test]
    fn flash_programming_clears_bits() {
        let mut bus = SimBus::new();
        let banks = bus.load_flash(&[0x0F; 10]);
        assert_eq!(banks, vec![bank_address(0)]);
        assert_eq!(bus.read_byte(banks[0]), 0x0F);
        assert_eq!(bus.read_byte(banks[0] + 10), 0xFF);
        bus.program_bank(0, &[0xF0]);
        assert_eq!(bus.read_byte(banks[0]), 0x00);
    }
}
