//! Software side of the bus snooper.

use crate::config::SMC_GB_MAIN;
use crate::mmio::Mmio;
use crate::rp2040::pio;

const SNOOP_PIO: u8 = 1;

/// One Game Boy bus transaction seen by the main state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Read(u16),
    Write { addr: u16, data: u8 },
}

impl BusEvent {
    pub fn addr(&self) -> u16 {
        match *self {
            BusEvent::Read(addr) | BusEvent::Write { addr, .. } => addr,
        }
    }

    /// FIFO word layout: bit 0 write flag, bits 1..=16 address.
    pub const fn encode_word(is_write: bool, addr: u16) -> u32 {
        (addr as u32) << 1 | is_write as u32
    }
}

/// Drains the main state machine's RX FIFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusSnooper;

impl BusSnooper {
    pub fn new() -> Self {
        Self
    }

    fn rx_empty<M: Mmio>(mmio: &mut M) -> bool {
        let fstat = mmio.read_word(pio::base(SNOOP_PIO) + pio::FSTAT);
        fstat & (1 << (pio::FSTAT_RXEMPTY_LSB + SMC_GB_MAIN as u32)) != 0
    }

    /// Non-blocking. A write's data byte follows its address word within a
    /// few bus cycles, so it is waited for.
    pub fn poll<M: Mmio>(&mut self, mmio: &mut M) -> Option<BusEvent> {
        if Self::rx_empty(mmio) {
            return None;
        }
        let word = mmio.read_word(pio::rxf(SNOOP_PIO, SMC_GB_MAIN));
        let addr = ((word >> 1) & 0xFFFF) as u16;
        if word & 1 == 0 {
            return Some(BusEvent::Read(addr));
        }

        while Self::rx_empty(mmio) {
            core::hint::spin_loop();
        }
        let data = mmio.read_word(pio::rxf(SNOOP_PIO, SMC_GB_MAIN)) as u8;
        Some(BusEvent::Write { addr, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn decodes_reads_and_writes() {
        let mut bus = SimBus::new();
        let mut snooper = BusSnooper::new();
        assert_eq!(snooper.poll(&mut bus), None);

        bus.push_read(0x0150);
        bus.push_write(0x2000, 0x1F);
        assert_eq!(snooper.poll(&mut bus), Some(BusEvent::Read(0x0150)));
        assert_eq!(
            snooper.poll(&mut bus),
            Some(BusEvent::Write {
                addr: 0x2000,
                data: 0x1F
            })
        );
        assert_eq!(snooper.poll(&mut bus), None);
    }

    #[test]
    fn word_layout() {
        assert_eq!(BusEvent::encode_word(true, 0xA000), 0x0001_4001);
        assert_eq!(BusEvent::encode_word(false, 0x0040), 0x80);
    }
}
