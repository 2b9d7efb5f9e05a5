mod common;

use common::{BANK, rom_image};
use croco_core::context::{CartridgeBusContext, LowRomRegion, RomHighMode};
use croco_core::mapper::RamWindow;
use croco_core::mmio::Mmio;
use croco_core::pipeline::Slot;
use croco_core::rtc::{RtcRegister, RtcRegisters};
use croco_core::sim::SimBus;
use croco_core::vblank_hook::HOOK_PATCHES;

fn context(bus: &mut SimBus, mode: RomHighMode) -> CartridgeBusContext<&mut SimBus> {
    let layout = bus.layout();
    CartridgeBusContext::new(bus, layout, mode).unwrap()
}

#[test]
fn rom_low_reads_follow_the_low_base() {
    let mut bus = SimBus::new();
    let mut image = rom_image(0x01, 0x01, 0x00);
    image[0x0040] = 0xD9;
    let banks = bus.load_flash(&image);
    let mut ctx = context(&mut bus, RomHighMode::Memory);
    ctx.attach_rom(banks).unwrap();
    ctx.install_hook_image(&HOOK_PATCHES);

    assert_eq!(ctx.mmio_mut().gb_read(0x0134), b'T');
    assert_eq!(ctx.mmio_mut().gb_read(0x0040), 0xD9);

    ctx.set_low_rom(LowRomRegion::Hook);
    assert_eq!(ctx.mmio_mut().gb_read(0x0040), 0xC3);
    assert_eq!(ctx.mmio_mut().gb_read(0x0041), 0x50);
    assert_eq!(ctx.mmio_mut().gb_read(0x0134), b'T');

    ctx.set_low_rom(LowRomRegion::Game);
    assert_eq!(ctx.mmio_mut().gb_read(0x0040), 0xD9);
}

#[test]
fn rom_high_reads_in_both_pointer_modes() {
    for mode in [RomHighMode::Memory, RomHighMode::FlashDirect] {
        let mut bus = SimBus::new();
        let banks = bus.load_flash(&rom_image(0x19, 0x02, 0x00));
        let mut ctx = context(&mut bus, mode);
        ctx.attach_rom(banks).unwrap();

        assert_eq!(ctx.mmio_mut().gb_read(0x4000), 1);
        ctx.set_rom_bank(6);
        assert_eq!(ctx.mmio_mut().gb_read(0x4000), 6);
        assert_eq!(ctx.mmio_mut().gb_read(0x7FFF), 6);
        assert_eq!(ctx.rom_byte(0x5000), 6);
    }
}

#[test]
fn ram_bank_reads_and_writes_land_in_the_selected_bank() {
    let mut bus = SimBus::new();
    let layout = bus.layout();
    let mut ctx = context(&mut bus, RomHighMode::Memory);

    ctx.set_ram_window(RamWindow::Bank(1));
    ctx.mmio_mut().gb_write(0xA000, 0x12);
    ctx.mmio_mut().gb_write(0xBFFF, 0x34);
    assert_eq!(ctx.mmio_mut().gb_read(0xA000), 0x12);

    ctx.set_ram_window(RamWindow::Bank(0));
    assert_eq!(ctx.mmio_mut().gb_read(0xA000), 0x00);

    let bank1 = layout.ram_bank(1);
    assert_eq!(ctx.mmio_mut().read_byte(bank1), 0x12);
    assert_eq!(ctx.mmio_mut().read_byte(bank1 + 0x1FFF), 0x34);
}

#[test]
fn disabled_window_reads_open_bus_and_drops_writes() {
    let mut bus = SimBus::new();
    let layout = bus.layout();
    let mut ctx = context(&mut bus, RomHighMode::Memory);

    ctx.set_ram_window(RamWindow::Bank(0));
    ctx.mmio_mut().gb_write(0xA100, 0x5A);
    ctx.set_ram_window(RamWindow::Disabled);

    assert_eq!(ctx.mmio_mut().gb_read(0xA100), 0xFF);
    ctx.mmio_mut().gb_write(0xA100, 0x11);
    assert_eq!(ctx.mmio_mut().read_byte(layout.ram_bank(0) + 0x100), 0x5A);

    ctx.set_ram_window(RamWindow::Bank(0));
    assert_eq!(ctx.mmio_mut().gb_read(0xA100), 0x5A);
}

#[test]
fn rtc_window_reads_latched_registers() {
    let mut bus = SimBus::new();
    let mut ctx = context(&mut bus, RomHighMode::Memory);
    ctx.publish_rtc_latched(&RtcRegisters([12, 34, 5, 0x2A, 0x01]));

    ctx.set_ram_window(RamWindow::Rtc(RtcRegister::Hours));
    assert_eq!(ctx.mmio_mut().gb_read(0xA000), 5);
    ctx.set_ram_window(RamWindow::Rtc(RtcRegister::DayHigh));
    assert_eq!(ctx.mmio_mut().gb_read(0xB123), 0x01);
    ctx.set_ram_window(RamWindow::Rtc(RtcRegister::Seconds));
    assert_eq!(ctx.mmio_mut().gb_read(0xA000), 12);

    // RTC writes are not stored anywhere in RAM.
    ctx.mmio_mut().gb_write(0xA000, 0x77);
    let latched = ctx.layout().rtc_latched(0);
    assert_eq!(ctx.mmio_mut().read_byte(latched), 12);
}

#[test]
fn selectors_point_at_command_lists() {
    let mut bus = SimBus::new();
    let mut ctx = context(&mut bus, RomHighMode::Memory);
    let layout = *ctx.layout();

    let read_selector = ctx.mmio_mut().read_word(layout.slot(Slot::RamReadSelector));
    assert_eq!(
        read_selector,
        layout.command_list(croco_core::pipeline::CommandListId::RamReadDisabled)
    );
    ctx.set_ram_window(RamWindow::Bank(0));
    let read_selector = ctx.mmio_mut().read_word(layout.slot(Slot::RamReadSelector));
    assert_eq!(
        read_selector,
        layout.command_list(croco_core::pipeline::CommandListId::RamRead)
    );
}

#[test]
fn rom_image_banks_are_stamped() {
    let image = rom_image(0x19, 0x01, 0x00);
    assert_eq!(image.len(), 4 * BANK);
    assert_eq!(image[3 * BANK], 3);
    assert_eq!(image[3 * BANK + 1], 0);
}
