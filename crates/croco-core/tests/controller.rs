mod common;

use common::{drain, high_bank, install, load, read, rom_image, write};
use croco_core::board::Board;
use croco_core::config::HookMode;
use croco_core::context::LowRomRegion;
use croco_core::mapper::{MapperKind, RamWindow};
use croco_core::rtc::{RtcRegister, RtcRegisters, RtcSnapshot};
use croco_core::sim::{SimBus, SimEvent};
use croco_core::speed_switch::BusSpeed;
use croco_core::storage::MemoryStorage;
use croco_core::{CartridgeController, Error, LoadOptions};

fn options(game: u8, hook_mode: HookMode) -> LoadOptions {
    LoadOptions {
        game,
        hook_mode,
        ..LoadOptions::default()
    }
}

#[test]
fn mbc1_two_bank_rom_never_maps_bank_zero() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "TINY", &rom_image(0x01, 0x00, 0x00));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));
    assert_eq!(ctl.mapper_kind(), MapperKind::Mbc1);

    write(&mut ctl, &mut storage, 0x2000, 0x02);
    assert_eq!(ctl.bus().rom_bank(), Some(1));
    assert_eq!(high_bank(&mut ctl, &mut storage), 1);

    write(&mut ctl, &mut storage, 0x2000, 0x00);
    assert_eq!(ctl.bus().rom_bank(), Some(1));
    assert_eq!(high_bank(&mut ctl, &mut storage), 1);
}

#[test]
fn mbc5_selects_nine_bit_banks() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "BIG", &rom_image(0x19, 0x08, 0x00));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));

    write(&mut ctl, &mut storage, 0x2000, 0x2A);
    write(&mut ctl, &mut storage, 0x3000, 0x01);
    assert_eq!(high_bank(&mut ctl, &mut storage), 0x12A);

    write(&mut ctl, &mut storage, 0x3000, 0x00);
    write(&mut ctl, &mut storage, 0x2000, 0x00);
    assert_eq!(high_bank(&mut ctl, &mut storage), 0);
}

#[test]
fn repeated_writes_do_not_republish() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "GAME", &rom_image(0x03, 0x01, 0x03));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));

    write(&mut ctl, &mut storage, 0x2000, 0x03);
    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    let before = ctl.bus().updates();
    for _ in 0..5 {
        write(&mut ctl, &mut storage, 0x2000, 0x03);
        write(&mut ctl, &mut storage, 0x0000, 0x0A);
    }
    assert_eq!(ctl.bus().updates(), before);
    assert_eq!(high_bank(&mut ctl, &mut storage), 3);
}

#[test]
fn save_ram_is_served_and_restored() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "GAME", &rom_image(0x03, 0x01, 0x03));
    let mut save = vec![0u8; 4 * 0x2000];
    save[0x0010] = 0x42;
    save[0x2000 + 0x0020] = 0x43;
    storage.insert_save("GAME", save);
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));

    assert_eq!(read(&mut ctl, &mut storage, 0xA010), 0xFF);
    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    assert_eq!(read(&mut ctl, &mut storage, 0xA010), 0x42);

    // Mode 1 turns the upper register into the RAM bank.
    write(&mut ctl, &mut storage, 0x6000, 0x01);
    write(&mut ctl, &mut storage, 0x4000, 0x01);
    assert_eq!(ctl.bus().ram_window(), RamWindow::Bank(1));
    assert_eq!(read(&mut ctl, &mut storage, 0xA020), 0x43);

    write(&mut ctl, &mut storage, 0xA020, 0x99);
    assert_eq!(read(&mut ctl, &mut storage, 0xA020), 0x99);
    assert!(ctl.ram_dirty());
}

#[test]
fn mbc3_rtc_write_reaches_clock_without_touching_ram_base() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    let ram_base = ctl.bus().updates().ram_base;

    write(&mut ctl, &mut storage, 0x4000, 0x08);
    assert_eq!(ctl.bus().ram_window(), RamWindow::Rtc(RtcRegister::Seconds));
    write(&mut ctl, &mut storage, 0xA000, 45);

    let rtc = ctl.rtc().unwrap();
    assert_eq!(rtc.real().seconds(), 45);
    assert_eq!(ctl.bus().updates().ram_base, ram_base);
    assert!(!ctl.ram_dirty());

    // Reads come from the latched copy until the next latch.
    assert_eq!(read(&mut ctl, &mut storage, 0xA000), 0);
    write(&mut ctl, &mut storage, 0x6000, 0x00);
    write(&mut ctl, &mut storage, 0x6000, 0x01);
    assert_eq!(read(&mut ctl, &mut storage, 0xA000), 45);
}

#[test]
fn rtc_catches_up_with_wall_clock() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    storage.insert_rtc(
        "CLOCK",
        RtcSnapshot {
            real: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            timestamp: 1_000_000,
        },
    );
    let ctl = load(
        &mut bus,
        &mut storage,
        LoadOptions {
            wall_clock: Some(1_000_000 + 3_690),
            ..options(0, HookMode::Disabled)
        },
    );

    let rtc = ctl.rtc().unwrap();
    assert_eq!(rtc.real().hours(), 1);
    assert_eq!(rtc.real().minutes(), 1);
    assert_eq!(rtc.real().seconds(), 30);
    assert_eq!(rtc.timestamp(), 1_003_690);
}

#[test]
fn vblank_hook_saves_once_then_releases() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "HOOKED", &rom_image(0x03, 0x01, 0x02));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant1));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    assert_eq!(ctl.bus().low_rom(), LowRomRegion::Game);
    write(&mut ctl, &mut storage, 0xA000, 0x77);
    assert!(ctl.ram_dirty());
    assert_eq!(ctl.bus().low_rom(), LowRomRegion::Hook);
    assert_eq!(ctl.bus_mut().dirty_session(), Some(0));

    for addr in [0x0040, 0x0041, 0x0042, 0x0050, 0x0051, 0x0052] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(storage.save_stores(), 0);
    assert_eq!(read(&mut ctl, &mut storage, 0x0100), 0xC3);

    assert_eq!(storage.save_stores(), 1);
    assert_eq!(storage.save("HOOKED").unwrap()[0], 0x77);
    assert_eq!(storage.rtc_stores(), 0);
    assert!(!ctl.ram_dirty());
    assert!(ctl.release_pending());
    assert_eq!(ctl.bus_mut().dirty_session(), None);

    let events = ctl.mmio_mut().events().to_vec();
    assert!(events.contains(&SimEvent::MainSmEnabled(false)));
    assert!(events.contains(&SimEvent::FlashWidth(32)));
    assert_eq!(events.last(), Some(&SimEvent::MainSmEnabled(true)));
    assert!(ctl.mmio_mut().main_sm_enabled());

    // The CPU keeps looping in the trap until it fetches past 0x100.
    read(&mut ctl, &mut storage, 0x0101);
    assert_eq!(ctl.bus().low_rom(), LowRomRegion::Hook);
    read(&mut ctl, &mut storage, 0x0102);
    assert_eq!(ctl.bus().low_rom(), LowRomRegion::Game);
    assert_eq!(read(&mut ctl, &mut storage, 0x0040), 0x00);

    for addr in [0x0040, 0x0050, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(storage.save_stores(), 1);
}

#[test]
fn handler_leaving_early_does_not_save() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "HOOKED", &rom_image(0x03, 0x01, 0x02));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant1));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0xA000, 0x01);
    for addr in [0x0040, 0x0040, 0x0050, 0x4000, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(storage.save_stores(), 0);
    assert!(ctl.ram_dirty());
}

#[test]
fn hook_variant_two_also_stores_rtc() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant2));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0xA000, 0x05);
    for addr in [0x0040, 0x0050, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(storage.save_stores(), 1);
    assert_eq!(storage.rtc_stores(), 1);
    assert!(storage.rtc("CLOCK").is_some());
}

#[test]
fn failed_save_keeps_session_dirty() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "HOOKED", &rom_image(0x03, 0x01, 0x02));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant1));

    storage.fail_writes = true;
    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0xA000, 0x01);
    for addr in [0x0040, 0x0050, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert!(!ctl.ram_dirty());
    assert_eq!(ctl.bus_mut().dirty_session(), Some(0));
}

#[test]
fn speed_switch_reloads_bus_program() {
    let mut image = rom_image(0x19, 0x01, 0x00);
    image[0x0143] = 0x80;
    image[0x0200..0x0204].copy_from_slice(&[0xE0, 0x4D, 0x10, 0x00]);

    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    let rom = install(&mut bus, &mut storage, 0, "COLOR", &image);
    assert_eq!(rom.speed_switch_bank, Some(0));

    let layout = bus.layout();
    let board = Board::new(vec![0xA001, 0xA002], vec![0xB001, 0xB002], 0);
    let mut ctl = CartridgeController::load(
        &mut bus,
        layout,
        board,
        &mut storage,
        options(0, HookMode::Disabled),
    )
    .unwrap();

    // A substituted byte resets the matcher.
    for addr in [0x0200, 0x0202, 0x0202] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(ctl.speed(), BusSpeed::Normal);

    for addr in [0x0200, 0x0201, 0x0202] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(ctl.speed(), BusSpeed::Double);
    assert_eq!(ctl.mmio_mut().pio_instr(1, 0), 0xB001);
    let restarts = ctl
        .mmio_mut()
        .events()
        .iter()
        .filter(|e| **e == SimEvent::SmRestart(1, 0))
        .count();
    assert_eq!(restarts, 1);
}

#[test]
fn unsaved_session_is_recovered_on_next_load() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "FIRST", &rom_image(0x03, 0x01, 0x02));
    install(&mut bus, &mut storage, 1, "SECOND", &rom_image(0x03, 0x01, 0x02));

    {
        let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));
        write(&mut ctl, &mut storage, 0x0000, 0x0A);
        write(&mut ctl, &mut storage, 0xA010, 0x99);
        drain(&mut ctl, &mut storage);
    }
    assert!(storage.save("FIRST").is_none());

    let mut ctl = load(&mut bus, &mut storage, options(1, HookMode::Disabled));
    assert_eq!(storage.save("FIRST").unwrap()[0x10], 0x99);
    assert_eq!(ctl.bus_mut().dirty_session(), None);

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    assert_eq!(read(&mut ctl, &mut storage, 0xA010), 0x00);
}

#[test]
fn clock_set_without_hook_survives_next_boot() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    install(&mut bus, &mut storage, 1, "OTHER", &rom_image(0x01, 0x01, 0x00));

    {
        let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));
        write(&mut ctl, &mut storage, 0x0000, 0x0A);
        write(&mut ctl, &mut storage, 0x4000, 0x0A);
        write(&mut ctl, &mut storage, 0xA000, 5);
        assert_eq!(ctl.bus_mut().dirty_session(), Some(0));
    }
    assert!(storage.rtc("CLOCK").is_none());

    {
        let mut ctl = load(&mut bus, &mut storage, options(1, HookMode::Disabled));
        assert_eq!(ctl.bus_mut().dirty_session(), None);
    }
    assert_eq!(storage.rtc("CLOCK").unwrap().real.hours(), 5);

    let ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));
    assert_eq!(ctl.rtc().unwrap().real().hours(), 5);
}

#[test]
fn explicit_persist_stores_clock() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Disabled));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0x4000, 0x09);
    write(&mut ctl, &mut storage, 0xA000, 42);
    ctl.persist(&mut storage);

    assert_eq!(storage.rtc_stores(), 1);
    assert_eq!(storage.rtc("CLOCK").unwrap().real.minutes(), 42);
    assert_eq!(ctl.bus_mut().dirty_session(), None);
}

#[test]
fn hook_variant_one_leaves_clock_out() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "CLOCK", &rom_image(0x10, 0x02, 0x03));
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant1));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0xA000, 0x05);
    for addr in [0x0040, 0x0050, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(storage.save_stores(), 1);
    assert_eq!(storage.rtc_stores(), 0);
}

#[test]
fn speed_switch_seen_while_trap_is_releasing() {
    let mut image = rom_image(0x1B, 0x01, 0x02);
    image[0x0143] = 0x80;
    image[0x0200..0x0204].copy_from_slice(&[0xE0, 0x4D, 0x10, 0x00]);

    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "COLOR", &image);
    let mut ctl = load(&mut bus, &mut storage, options(0, HookMode::Variant1));

    write(&mut ctl, &mut storage, 0x0000, 0x0A);
    write(&mut ctl, &mut storage, 0xA000, 0x01);
    for addr in [0x0040, 0x0050, 0x0100] {
        read(&mut ctl, &mut storage, addr);
    }
    assert!(ctl.release_pending());

    for addr in [0x0200, 0x0201, 0x0202] {
        read(&mut ctl, &mut storage, addr);
    }
    assert_eq!(ctl.speed(), BusSpeed::Double);
    assert!(ctl.release_pending());
}

fn try_load(bus: &mut SimBus, storage: &mut MemoryStorage, game: u8) -> Result<(), Error> {
    let layout = bus.layout();
    CartridgeController::load(
        bus,
        layout,
        Board::default(),
        storage,
        options(game, HookMode::Disabled),
    )
    .map(|_| ())
}

#[test]
fn configuration_errors_abort_load() {
    let mut bus = SimBus::new();
    let mut storage = MemoryStorage::new();
    install(&mut bus, &mut storage, 0, "ODD", &rom_image(0xFC, 0x01, 0x00));
    install(&mut bus, &mut storage, 1, "HUGE", &rom_image(0x1B, 0x01, 0x04));

    assert!(matches!(
        try_load(&mut bus, &mut storage, 0),
        Err(Error::UnsupportedCartridge(0xFC))
    ));
    assert!(matches!(
        try_load(&mut bus, &mut storage, 1),
        Err(Error::TooManyRamBanks { banks: 16, max: 8 })
    ));
    assert!(matches!(
        try_load(&mut bus, &mut storage, 7),
        Err(Error::RomNotFound(7))
    ));
}
