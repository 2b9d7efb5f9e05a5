//! Persistence seam: ROM lookup and save RAM / RTC files.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::header::{CartridgeHeader, find_speed_switch_bank};
use crate::mapper::{BankGeometry, MapperKind};
use crate::rtc::RtcSnapshot;

/// Everything the controller needs to start a stored ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomInfo {
    pub index: u8,
    pub name: String,
    pub header: CartridgeHeader,
    /// Address of each 16K bank, in bank order.
    pub banks: Vec<u32>,
    pub speed_switch_bank: Option<u16>,
}

impl RomInfo {
    /// Describes a ROM whose banks already sit at `banks`. `image` is the
    /// full ROM, used for the header and the speed switch scan.
    pub fn from_image(index: u8, name: &str, image: &[u8], banks: Vec<u32>) -> Result<Self> {
        let header = CartridgeHeader::parse(image)?;
        Ok(Self {
            index,
            name: name.to_string(),
            speed_switch_bank: find_speed_switch_bank(image),
            header,
            banks,
        })
    }

    pub fn mapper(&self) -> Result<MapperKind> {
        self.header.mapper()
    }

    pub fn geometry(&self) -> BankGeometry {
        BankGeometry {
            rom_banks: self.header.rom_banks,
            ram_banks: self.header.ram_banks,
            has_rtc: self.header.has_rtc(),
        }
    }

    /// Bytes of cartridge RAM the game uses.
    pub fn ram_len(&self) -> usize {
        self.header.ram_banks as usize * crate::config::GB_RAM_BANK_SIZE as usize
    }
}

/// All operations are synchronous. A missing save or RTC file is reported
/// as `Ok(false)` / `Ok(None)`.
pub trait CartridgeStorage {
    fn load_rom(&mut self, game: u8) -> Result<RomInfo>;

    /// Fills `ram` from the stored save. Returns whether one existed.
    fn restore_save_ram(&mut self, rom: &RomInfo, ram: &mut [u8]) -> Result<bool>;

    fn store_save_ram(&mut self, rom: &RomInfo, ram: &[u8]) -> Result<()>;

    fn restore_rtc(&mut self, rom: &RomInfo) -> Result<Option<RtcSnapshot>>;

    fn store_rtc(&mut self, rom: &RomInfo, rtc: &RtcSnapshot) -> Result<()>;
}

fn find_rom(roms: &[RomInfo], game: u8) -> Result<RomInfo> {
    roms.iter()
        .find(|rom| rom.index == game)
        .cloned()
        .ok_or(Error::RomNotFound(game))
}

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    roms: Vec<RomInfo>,
    saves: HashMap<String, Vec<u8>>,
    rtcs: HashMap<String, RtcSnapshot>,
    save_stores: usize,
    rtc_stores: usize,
    /// Makes every store fail, to exercise the non-fatal error path.
    pub fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rom(&mut self, rom: RomInfo) {
        self.roms.push(rom);
    }

    pub fn save(&self, name: &str) -> Option<&[u8]> {
        self.saves.get(name).map(Vec::as_slice)
    }

    pub fn insert_save(&mut self, name: &str, data: Vec<u8>) {
        self.saves.insert(name.to_string(), data);
    }

    pub fn rtc(&self, name: &str) -> Option<&RtcSnapshot> {
        self.rtcs.get(name)
    }

    pub fn insert_rtc(&mut self, name: &str, rtc: RtcSnapshot) {
        self.rtcs.insert(name.to_string(), rtc);
    }

    pub fn save_stores(&self) -> usize {
        self.save_stores
    }

    pub fn rtc_stores(&self) -> usize {
        self.rtc_stores
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Io(io::Error::other("storage is read-only")));
        }
        Ok(())
    }
}

impl CartridgeStorage for MemoryStorage {
    fn load_rom(&mut self, game: u8) -> Result<RomInfo> {
        find_rom(&self.roms, game)
    }

    fn restore_save_ram(&mut self, rom: &RomInfo, ram: &mut [u8]) -> Result<bool> {
        let Some(save) = self.saves.get(&rom.name) else {
            return Ok(false);
        };
        let len = save.len().min(ram.len());
        ram[..len].copy_from_slice(&save[..len]);
        Ok(true)
    }

    fn store_save_ram(&mut self, rom: &RomInfo, ram: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.saves.insert(rom.name.clone(), ram.to_vec());
        self.save_stores += 1;
        Ok(())
    }

    fn restore_rtc(&mut self, rom: &RomInfo) -> Result<Option<RtcSnapshot>> {
        Ok(self.rtcs.get(&rom.name).copied())
    }

    fn store_rtc(&mut self, rom: &RomInfo, rtc: &RtcSnapshot) -> Result<()> {
        self.check_writable()?;
        self.rtcs.insert(rom.name.clone(), *rtc);
        self.rtc_stores += 1;
        Ok(())
    }
}

/// Saves as `<dir>/<name>.sav` and `<dir>/<name>.rtc`.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    roms: Vec<RomInfo>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            roms: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn add_rom(&mut self, rom: RomInfo) {
        self.roms.push(rom);
    }

    fn path_for(&self, rom: &RomInfo, extension: &str) -> PathBuf {
        let stem: String = rom
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.{extension}"))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, data)?;
        debug!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CartridgeStorage for FileStorage {
    fn load_rom(&mut self, game: u8) -> Result<RomInfo> {
        find_rom(&self.roms, game)
    }

    fn restore_save_ram(&mut self, rom: &RomInfo, ram: &mut [u8]) -> Result<bool> {
        let path = self.path_for(rom, "sav");
        let Some(save) = read_optional(&path)? else {
            return Ok(false);
        };
        let len = save.len().min(ram.len());
        ram[..len].copy_from_slice(&save[..len]);
        info!("restored {len} bytes of save RAM from {}", path.display());
        Ok(true)
    }

    fn store_save_ram(&mut self, rom: &RomInfo, ram: &[u8]) -> Result<()> {
        let path = self.path_for(rom, "sav");
        self.write_file(&path, ram)
    }

    fn restore_rtc(&mut self, rom: &RomInfo) -> Result<Option<RtcSnapshot>> {
        let path = self.path_for(rom, "rtc");
        match read_optional(&path)? {
            Some(data) => RtcSnapshot::from_bytes(&data).map(Some),
            None => Ok(None),
        }
    }

    fn store_rtc(&mut self, rom: &RomInfo, rtc: &RtcSnapshot) -> Result<()> {
        let path = self.path_for(rom, "rtc");
        self.write_file(&path, &rtc.to_bytes())
    }
}
