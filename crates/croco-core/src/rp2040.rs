//! RP2040 register map used by the bus-service pipeline and the board
//! helpers.

/// Offsets of the atomic register aliases on APB/AHB peripherals.
pub const REG_ALIAS_XOR: u32 = 0x1000;
pub const REG_ALIAS_SET: u32 = 0x2000;
pub const REG_ALIAS_CLR: u32 = 0x3000;

pub const fn set_alias(addr: u32) -> u32 {
    addr | REG_ALIAS_SET
}

pub const fn clr_alias(addr: u32) -> u32 {
    addr | REG_ALIAS_CLR
}

pub mod dma {
    pub const BASE: u32 = 0x5000_0000;
    pub const NUM_CHANNELS: u8 = 12;
    pub const CHANNEL_STRIDE: u32 = 0x40;

    pub const READ_ADDR: u32 = 0x00;
    pub const WRITE_ADDR: u32 = 0x04;
    pub const TRANS_COUNT: u32 = 0x08;
    pub const CTRL_TRIG: u32 = 0x0C;
    pub const AL1_CTRL: u32 = 0x10;
    pub const AL1_READ_ADDR: u32 = 0x14;
    pub const AL1_WRITE_ADDR: u32 = 0x18;
    pub const AL1_TRANS_COUNT_TRIG: u32 = 0x1C;
    pub const AL2_CTRL: u32 = 0x20;
    pub const AL2_TRANS_COUNT: u32 = 0x24;
    pub const AL2_READ_ADDR: u32 = 0x28;
    pub const AL2_WRITE_ADDR_TRIG: u32 = 0x2C;
    pub const AL3_CTRL: u32 = 0x30;
    pub const AL3_WRITE_ADDR: u32 = 0x34;
    pub const AL3_TRANS_COUNT: u32 = 0x38;
    pub const AL3_READ_ADDR_TRIG: u32 = 0x3C;

    pub const CTRL_EN: u32 = 1 << 0;
    pub const CTRL_HIGH_PRIORITY: u32 = 1 << 1;
    pub const CTRL_DATA_SIZE_LSB: u32 = 2;
    pub const CTRL_INCR_READ: u32 = 1 << 4;
    pub const CTRL_INCR_WRITE: u32 = 1 << 5;
    pub const CTRL_RING_SIZE_LSB: u32 = 6;
    pub const CTRL_RING_SEL: u32 = 1 << 10;
    pub const CTRL_CHAIN_TO_LSB: u32 = 11;
    pub const CTRL_TREQ_SEL_LSB: u32 = 15;
    pub const CTRL_BUSY: u32 = 1 << 24;

    pub const TREQ_PERMANENT: u8 = 0x3F;

    pub const fn channel_reg(channel: u8, offset: u32) -> u32 {
        BASE + channel as u32 * CHANNEL_STRIDE + offset
    }
}

pub mod pio {
    pub const PIO0_BASE: u32 = 0x5020_0000;
    pub const PIO1_BASE: u32 = 0x5030_0000;

    pub const CTRL: u32 = 0x000;
    pub const FSTAT: u32 = 0x004;
    pub const TXF0: u32 = 0x010;
    pub const RXF0: u32 = 0x020;
    pub const INSTR_MEM0: u32 = 0x048;
    pub const SM0_INSTR: u32 = 0x0D8;
    pub const SM_STRIDE: u32 = 0x18;

    pub const INSTR_MEM_SIZE: usize = 32;
    pub const FIFO_DEPTH: usize = 4;

    pub const CTRL_SM_ENABLE_LSB: u32 = 0;
    pub const CTRL_SM_RESTART_LSB: u32 = 4;
    pub const FSTAT_RXEMPTY_LSB: u32 = 8;
    pub const FSTAT_TXFULL_LSB: u32 = 16;

    pub const fn base(pio: u8) -> u32 {
        if pio == 0 { PIO0_BASE } else { PIO1_BASE }
    }

    pub const fn txf(pio: u8, sm: u8) -> u32 {
        base(pio) + TXF0 + 4 * sm as u32
    }

    pub const fn rxf(pio: u8, sm: u8) -> u32 {
        base(pio) + RXF0 + 4 * sm as u32
    }

    pub const fn sm_instr(pio: u8, sm: u8) -> u32 {
        base(pio) + SM0_INSTR + SM_STRIDE * sm as u32
    }

    /// DREQ number of a state machine FIFO, as used in a DMA `TREQ_SEL`.
    pub const fn dreq(pio: u8, sm: u8, is_tx: bool) -> u8 {
        let block = if pio == 0 { 0 } else { 8 };
        let dir = if is_tx { 0 } else { 4 };
        block + dir + sm
    }

    /// `jmp` to an absolute instruction address.
    pub const fn encode_jmp(addr: u8) -> u16 {
        addr as u16 & 0x1F
    }
}

pub mod timer {
    pub const BASE: u32 = 0x4005_4000;
    pub const TIMERAWH: u32 = BASE + 0x24;
    pub const TIMERAWL: u32 = BASE + 0x28;
}

pub mod uart {
    pub const UART0_BASE: u32 = 0x4003_4000;
    pub const DR: u32 = 0x000;
    pub const FR: u32 = 0x018;
    pub const FR_TXFF: u32 = 1 << 5;
}

pub mod spi {
    pub const SPI0_BASE: u32 = 0x4003_C000;
    pub const SSPDR: u32 = 0x008;
    pub const SSPSR: u32 = 0x00C;
    pub const SSPSR_TNF: u32 = 1 << 1;
}

pub mod ssi {
    pub const BASE: u32 = 0x1800_0000;
    pub const CTRLR0: u32 = BASE + 0x000;
    pub const SSIENR: u32 = BASE + 0x008;
    pub const CTRLR0_DFS_32_LSB: u32 = 16;
    pub const CTRLR0_DFS_32_BITS: u32 = 0x1F << CTRLR0_DFS_32_LSB;
}

pub mod sio {
    pub const BASE: u32 = 0xD000_0000;
    pub const GPIO_OUT: u32 = BASE + 0x010;
    pub const GPIO_OUT_SET: u32 = BASE + 0x014;
    pub const GPIO_OUT_CLR: u32 = BASE + 0x018;
}

pub mod sram {
    pub const BASE: u32 = 0x2000_0000;
    pub const SIZE: u32 = 0x0004_2000;
}
