/// Access to the RP2040 address space: SRAM, flash XIP and peripheral
/// registers.
///
/// Every word store must reach memory as one aligned 32-bit access, since the
/// DMA engine reads base pointers and command selectors concurrently with the
/// polling loop. Reads take `&mut self` because reading a PIO RX FIFO register
/// pops it.
pub trait Mmio {
    fn read_word(&mut self, addr: u32) -> u32;
    fn write_word(&mut self, addr: u32, value: u32);
    fn read_byte(&mut self, addr: u32) -> u8;
    fn write_byte(&mut self, addr: u32, value: u8);

    fn copy_words(&mut self, src: u32, dst: u32, len: u32) {
        for offset in (0..len).step_by(4) {
            let word = self.read_word(src + offset);
            self.write_word(dst + offset, word);
        }
    }

    fn fill_words(&mut self, dst: u32, len: u32, value: u32) {
        for offset in (0..len).step_by(4) {
            self.write_word(dst + offset, value);
        }
    }

    fn read_bytes(&mut self, src: u32, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.read_byte(src + i as u32);
        }
    }

    fn write_bytes(&mut self, dst: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.write_byte(dst + i as u32, byte);
        }
    }
}

impl<T: Mmio + ?Sized> Mmio for &mut T {
    fn read_word(&mut self, addr: u32) -> u32 {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        (**self).write_word(addr, value)
    }

    fn read_byte(&mut self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        (**self).write_byte(addr, value)
    }
}
