mod sim_config;
mod trace;

use std::fs::File;
use std::io::{self, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use croco_core::board::Board;
use croco_core::catalog::{MAX_NAME_LEN, RomCatalog, TRANSFER_CHUNK_SIZE};
use croco_core::config::{GB_ROM_BANK_SIZE, HookMode};
use croco_core::diagnostics::{self, UART_LOG};
use croco_core::header::CartridgeHeader;
use croco_core::sim::SimBus;
use croco_core::storage::{FileStorage, RomInfo};
use croco_core::{CartridgeController, LoadOptions};
use log::{LevelFilter, info, warn};
use thiserror::Error;

use crate::sim_config::SimConfig;
use crate::trace::{TraceError, TraceOp};

/// Ceiling on idle polls used to flush the debug UART at exit.
const UART_FLUSH_ROUNDS: usize = 4096;

#[derive(Parser)]
#[command(version, about = "Host simulator for the cartridge firmware")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot a ROM and replay a bus trace against it
    Run {
        /// Path to ROM file
        rom: PathBuf,

        /// Trace of Game Boy bus accesses; stdin if omitted
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Save hook variant (0 disables the hook)
        #[arg(long)]
        hook_mode: Option<u8>,

        /// Directory for save and RTC files
        #[arg(long)]
        saves: Option<PathBuf>,

        /// Simulator config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log through the firmware's UART path and print what it sent
        #[arg(long)]
        uart_log: bool,
    },
    /// Print what the firmware would make of a ROM
    Info {
        /// Path to ROM file
        rom: PathBuf,
    },
}

#[derive(Error, Debug)]
enum SimError {
    #[error("{path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Cartridge(#[from] croco_core::Error),

    #[error("trace {0}")]
    Trace(#[from] TraceError),

    #[error("ROM has {0} banks, more than flash can hold")]
    RomTooLarge(usize),
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Command::Run {
            rom,
            trace,
            hook_mode,
            saves,
            config,
            uart_log,
        } => {
            if uart_log {
                if let Err(e) = diagnostics::init(LevelFilter::Info) {
                    eprintln!("Failed to install UART logger: {e}");
                }
            } else {
                env_logger::init();
            }
            let config_path = config.unwrap_or_else(sim_config::default_config_path);
            let mut cfg = sim_config::load_from_file(&config_path);
            if let Some(mode) = hook_mode {
                cfg.hook_mode = mode;
            }
            if saves.is_some() {
                cfg.saves_dir = saves;
            }
            run(&rom, trace.as_deref(), &cfg, uart_log)
        }
        Command::Info { rom } => {
            env_logger::init();
            print_info(&rom)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_rom(path: &Path) -> Result<Vec<u8>, SimError> {
    std::fs::read(path).map_err(|source| SimError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Catalog name for a ROM file: its stem, cut to what an entry can hold.
fn rom_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ROM".to_string());
    let mut name = String::new();
    for c in stem.chars() {
        if name.len() + c.len_utf8() > MAX_NAME_LEN {
            break;
        }
        name.push(c);
    }
    name
}

/// Uploads `image` chunk by chunk, the way the bootloader receives it.
fn import_rom(bus: &mut SimBus, name: &str, image: &[u8]) -> Result<RomInfo, SimError> {
    let bank_size = GB_ROM_BANK_SIZE as usize;
    let bank_count = image.len().div_ceil(bank_size).max(1);
    let num_banks = u16::try_from(bank_count).map_err(|_| SimError::RomTooLarge(bank_count))?;

    let mut padded = image.to_vec();
    padded.resize(bank_count * bank_size, 0xFF);

    let mut catalog = RomCatalog::new();
    catalog
        .start_new_rom(num_banks, name, bus)
        .map_err(croco_core::Error::from)?;

    let mut index = None;
    for (bank, data) in padded.chunks(bank_size).enumerate() {
        for (chunk, bytes) in data.chunks(TRANSFER_CHUNK_SIZE).enumerate() {
            let mut buf = [0xFFu8; TRANSFER_CHUNK_SIZE];
            buf[..bytes.len()].copy_from_slice(bytes);
            index = catalog
                .transfer_chunk(bank as u16, chunk as u16, &buf, bus)
                .map_err(croco_core::Error::from)?;
        }
    }

    let index = index.unwrap_or_default();
    let entry = catalog
        .get(index)
        .ok_or(croco_core::Error::RomNotFound(index as u8))?;
    Ok(RomInfo::from_image(
        index as u8,
        &entry.name,
        image,
        entry.bank_addresses(),
    )?)
}

fn wall_clock(cfg: &SimConfig) -> Option<u64> {
    cfg.wall_clock.or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    })
}

fn run(rom_path: &Path, trace: Option<&Path>, cfg: &SimConfig, uart_log: bool) -> Result<(), SimError> {
    let image = read_rom(rom_path)?;
    let mut bus = SimBus::with_fifo_depth(cfg.fifo_depth);
    let rom = import_rom(&mut bus, &rom_name(rom_path), &image)?;
    let game = rom.index;

    let saves_dir = cfg.saves_dir.clone().unwrap_or_else(|| {
        rom_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let mut storage = FileStorage::new(saves_dir);
    storage.add_rom(rom);

    let layout = bus.layout();
    let mut ctl = CartridgeController::load(
        bus,
        layout,
        Board::default(),
        &mut storage,
        LoadOptions {
            game,
            hook_mode: HookMode::from_mode_byte(cfg.hook_mode),
            wall_clock: wall_clock(cfg),
            ..LoadOptions::default()
        },
    )?;

    let ops = match trace {
        Some(path) => {
            let file = File::open(path).map_err(|source| SimError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            trace::spawn_reader(BufReader::new(file))
        }
        None => trace::spawn_reader(BufReader::new(io::stdin())),
    };

    let mut stdout = io::stdout().lock();
    let mut accesses = 0usize;
    for op in ops.iter() {
        match op? {
            TraceOp::Read(addr) => {
                let byte = ctl.mmio_mut().gb_read(addr);
                let _ = writeln!(stdout, "{addr:04X} -> {byte:02X}");
                accesses += 1;
            }
            TraceOp::Write(addr, data) => {
                ctl.mmio_mut().gb_write(addr, data);
                accesses += 1;
            }
            TraceOp::Advance(us) => ctl.mmio_mut().advance_time_us(us),
        }
        while ctl.poll(&mut storage).is_some() {}
    }

    if ctl.ram_dirty() || ctl.rtc().is_some() {
        info!("trace ended, storing save RAM and clock");
        ctl.persist(&mut storage);
    }

    if uart_log {
        for _ in 0..UART_FLUSH_ROUNDS {
            if UART_LOG.is_empty() {
                break;
            }
            ctl.mmio_mut().advance_time_us(100);
            ctl.poll(&mut storage);
        }
        let _ = stdout.write_all(ctl.mmio_mut().uart_output());
    }

    let dropped = ctl.mmio_mut().dropped_events();
    if dropped > 0 {
        warn!("{dropped} bus events overflowed the snooper FIFO");
    }
    let _ = writeln!(
        stdout,
        "{accesses} accesses, {dropped} dropped, speed {:?}, hook {:?}",
        ctl.speed(),
        ctl.hook_state()
    );
    Ok(())
}

fn print_info(rom_path: &Path) -> Result<(), SimError> {
    let image = read_rom(rom_path)?;
    let header = CartridgeHeader::parse(&image)?;
    let mut bus = SimBus::new();
    let rom = import_rom(&mut bus, &rom_name(rom_path), &image)?;

    println!("Title:        {}", header.title);
    println!("Type:         {:#04x}", header.cart_type);
    match header.mapper() {
        Ok(kind) => println!("Mapper:       {kind}"),
        Err(e) => println!("Mapper:       {e}"),
    }
    println!(
        "ROM banks:    {} (file holds {})",
        header.rom_banks,
        rom.banks.len()
    );
    if header.ram_banks == 0xFF {
        println!("RAM banks:    unknown size code");
    } else {
        println!("RAM banks:    {}", header.ram_banks);
    }
    println!("Battery:      {}", header.has_battery());
    println!("RTC:          {}", header.has_rtc());
    println!("CGB:          {}", header.cgb);
    match rom.speed_switch_bank {
        Some(bank) => println!("Speed switch: bank {bank}"),
        None => println!("Speed switch: none"),
    }
    Ok(())
}
