#![allow(dead_code)]

use croco_core::board::Board;
use croco_core::sim::SimBus;
use croco_core::storage::{CartridgeStorage, MemoryStorage, RomInfo};
use croco_core::{CartridgeController, LoadOptions};

pub const BANK: usize = 0x4000;

pub type SimController<'a> = CartridgeController<&'a mut SimBus>;

/// A ROM of `2 << rom_code` banks. Each bank starts with its own number as a
/// little-endian u16 and is otherwise filled with the number's low byte.
pub fn rom_image(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * BANK];
    for (i, bank) in rom.chunks_mut(BANK).enumerate() {
        bank.fill(i as u8);
        bank[0] = i as u8;
        bank[1] = (i >> 8) as u8;
    }
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom
}

/// Programs `image` into simulated flash and registers it as game `index`.
pub fn install(
    bus: &mut SimBus,
    storage: &mut MemoryStorage,
    index: u8,
    name: &str,
    image: &[u8],
) -> RomInfo {
    let banks = bus.load_flash(image);
    let rom = RomInfo::from_image(index, name, image, banks).unwrap();
    storage.add_rom(rom.clone());
    rom
}

pub fn load<'a>(
    bus: &'a mut SimBus,
    storage: &mut MemoryStorage,
    options: LoadOptions,
) -> SimController<'a> {
    let layout = bus.layout();
    CartridgeController::load(bus, layout, Board::default(), storage, options).unwrap()
}

pub fn drain<S: CartridgeStorage>(ctl: &mut SimController<'_>, storage: &mut S) {
    while ctl.poll(storage).is_some() {}
}

/// A Game Boy read followed by the main loop catching up.
pub fn read<S: CartridgeStorage>(ctl: &mut SimController<'_>, storage: &mut S, addr: u16) -> u8 {
    let byte = ctl.mmio_mut().gb_read(addr);
    drain(ctl, storage);
    byte
}

pub fn write<S: CartridgeStorage>(
    ctl: &mut SimController<'_>,
    storage: &mut S,
    addr: u16,
    data: u8,
) {
    ctl.mmio_mut().gb_write(addr, data);
    drain(ctl, storage);
}

/// The bank number stamped at the start of the bank mapped at 0x4000.
pub fn high_bank<S: CartridgeStorage>(ctl: &mut SimController<'_>, storage: &mut S) -> u16 {
    let lo = read(ctl, storage, 0x4000) as u16;
    let hi = read(ctl, storage, 0x4001) as u16;
    hi << 8 | lo
}
