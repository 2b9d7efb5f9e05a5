//! ROM catalog: bank allocation in the flash ROM pool and the chunked
//! transfer protocol used to fill it.
//!
//! A ROM is uploaded in 32-byte chunks, strictly in order: bank 0 chunk 0
//! first, all 512 chunks of a bank before the next bank. Each completed bank
//! is programmed to its allocated flash bank; after the last one the ROM is
//! registered.

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{GB_ROM_BANK_SIZE, ROM_STORAGE_XIP_BASE};

/// Flash banks reserved for ROM storage.
pub const MAX_BANKS: u16 = 888;
pub const MAX_ALLOWED_ROMS: usize = 32;
pub const TRANSFER_CHUNK_SIZE: usize = 32;
pub const CHUNKS_PER_BANK: u16 = (GB_ROM_BANK_SIZE as usize / TRANSFER_CHUNK_SIZE) as u16;
pub const MAX_NAME_LEN: usize = 16;

const BITMAP_WORDS: usize = (MAX_BANKS as usize).div_ceil(32);
const ENTRY_MAGIC: &[u8; 4] = b"ROM1";
const ENTRY_NAME_FIELD: usize = MAX_NAME_LEN + 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog already holds {max} ROMs")]
    TooManyRoms { max: usize },
    #[error("{requested} banks requested, {free} free")]
    NotEnoughBanks { requested: u16, free: u16 },
    #[error("a ROM named {0:?} already exists")]
    NameExists(String),
    #[error("ROM name {0:?} is longer than 16 bytes")]
    NameTooLong(String),
    #[error("a ROM needs at least one bank")]
    EmptyRom,
    #[error("no ROM transfer in progress")]
    NoTransfer,
    #[error("bank {got} out of order, expected {expected}")]
    BankOutOfOrder { expected: u16, got: u16 },
    #[error("chunk {got} out of order, expected {expected}")]
    ChunkOutOfOrder { expected: u16, got: u16 },
    #[error("no ROM with index {0}")]
    NoSuchRom(usize),
    #[error("malformed catalog entry")]
    InvalidEntry,
}

/// Destination of completed banks. On the cartridge this is the flash
/// driver; in the simulator it is simulated flash.
pub trait BankWriter {
    fn erase_bank(&mut self, bank: u16);
    fn program_bank(&mut self, bank: u16, data: &[u8]);
}

/// XIP address of flash ROM bank `bank`.
pub const fn bank_address(bank: u16) -> u32 {
    ROM_STORAGE_XIP_BASE + bank as u32 * GB_ROM_BANK_SIZE
}

/// One stored ROM: its name and the flash banks holding it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub banks: Vec<u16>,
}

impl CatalogEntry {
    pub fn bank_addresses(&self) -> Vec<u32> {
        self.banks.iter().map(|&b| bank_address(b)).collect()
    }

    /// Persisted form: magic, NUL-padded name, bank count, bank numbers.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + ENTRY_NAME_FIELD + 2 + 2 * self.banks.len());
        data.extend_from_slice(ENTRY_MAGIC);
        let mut name = [0u8; ENTRY_NAME_FIELD];
        let raw = self.name.as_bytes();
        let len = raw.len().min(MAX_NAME_LEN);
        name[..len].copy_from_slice(&raw[..len]);
        data.extend_from_slice(&name);
        data.extend_from_slice(&(self.banks.len() as u16).to_le_bytes());
        for bank in &self.banks {
            data.extend_from_slice(&bank.to_le_bytes());
        }
        data
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CatalogError> {
        let fixed = 4 + ENTRY_NAME_FIELD + 2;
        if data.len() < fixed || &data[..4] != ENTRY_MAGIC {
            return Err(CatalogError::InvalidEntry);
        }
        let name_field = &data[4..4 + ENTRY_NAME_FIELD];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN)
            .min(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let count = u16::from_le_bytes([data[fixed - 2], data[fixed - 1]]) as usize;
        let banks_raw = data
            .get(fixed..fixed + 2 * count)
            .ok_or(CatalogError::InvalidEntry)?;
        let banks = banks_raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { name, banks })
    }
}

#[derive(Debug)]
struct Transfer {
    entry: CatalogEntry,
    /// Next expected bank and chunk.
    bank: u16,
    chunk: u16,
    buffer: Vec<u8>,
}

#[derive(Debug)]
pub struct RomCatalog {
    used: [u32; BITMAP_WORDS],
    used_count: u16,
    entries: Vec<CatalogEntry>,
    transfer: Option<Transfer>,
}

impl Default for RomCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RomCatalog {
    pub fn new() -> Self {
        Self {
            used: [0; BITMAP_WORDS],
            used_count: 0,
            entries: Vec::new(),
            transfer: None,
        }
    }

    /// Rebuilds the allocation bitmap from persisted entries.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for entry in entries {
            if catalog.entries.len() >= MAX_ALLOWED_ROMS {
                return Err(CatalogError::TooManyRoms {
                    max: MAX_ALLOWED_ROMS,
                });
            }
            for &bank in &entry.banks {
                if bank >= MAX_BANKS || catalog.is_used(bank) {
                    return Err(CatalogError::InvalidEntry);
                }
                catalog.mark(bank, true);
            }
            debug!("catalog: {} uses {} banks", entry.name, entry.banks.len());
            catalog.entries.push(entry);
        }
        info!("{} banks of {MAX_BANKS} in use", catalog.used_count);
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn used_banks(&self) -> u16 {
        self.used_count
    }

    pub fn free_banks(&self) -> u16 {
        MAX_BANKS - self.used_count
    }

    pub fn transfer_active(&self) -> bool {
        self.transfer.is_some()
    }

    fn is_used(&self, bank: u16) -> bool {
        self.used[bank as usize / 32] & (1 << (bank % 32)) != 0
    }

    fn mark(&mut self, bank: u16, used: bool) {
        let word = &mut self.used[bank as usize / 32];
        let bit = 1 << (bank % 32);
        if used && *word & bit == 0 {
            *word |= bit;
            self.used_count += 1;
        } else if !used && *word & bit != 0 {
            *word &= !bit;
            self.used_count -= 1;
        }
    }

    /// Allocates and erases `num_banks` banks and starts a transfer. A
    /// transfer already in progress is abandoned and its banks released.
    pub fn start_new_rom<W: BankWriter>(
        &mut self,
        num_banks: u16,
        name: &str,
        writer: &mut W,
    ) -> Result<(), CatalogError> {
        if self.entries.len() >= MAX_ALLOWED_ROMS {
            return Err(CatalogError::TooManyRoms {
                max: MAX_ALLOWED_ROMS,
            });
        }
        if num_banks == 0 {
            return Err(CatalogError::EmptyRom);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(CatalogError::NameTooLong(name.to_string()));
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(CatalogError::NameExists(name.to_string()));
        }
        if let Some(stale) = self.transfer.take() {
            warn!("abandoning transfer of {}", stale.entry.name);
            for bank in stale.entry.banks {
                self.mark(bank, false);
            }
        }
        if num_banks > self.free_banks() {
            return Err(CatalogError::NotEnoughBanks {
                requested: num_banks,
                free: self.free_banks(),
            });
        }

        let mut banks = Vec::with_capacity(num_banks as usize);
        for bank in 0..MAX_BANKS {
            if banks.len() == num_banks as usize {
                break;
            }
            if !self.is_used(bank) {
                self.mark(bank, true);
                banks.push(bank);
            }
        }
        for &bank in &banks {
            writer.erase_bank(bank);
        }
        info!("allocated {num_banks} banks for new ROM {name}");

        self.transfer = Some(Transfer {
            entry: CatalogEntry {
                name: name.to_string(),
                banks,
            },
            bank: 0,
            chunk: 0,
            buffer: vec![0; GB_ROM_BANK_SIZE as usize],
        });
        Ok(())
    }

    /// Accepts the next chunk. Returns the new ROM's index once its last
    /// chunk has been written.
    pub fn transfer_chunk<W: BankWriter>(
        &mut self,
        bank: u16,
        chunk: u16,
        data: &[u8; TRANSFER_CHUNK_SIZE],
        writer: &mut W,
    ) -> Result<Option<usize>, CatalogError> {
        let transfer = self.transfer.as_mut().ok_or(CatalogError::NoTransfer)?;
        if bank != transfer.bank {
            return Err(CatalogError::BankOutOfOrder {
                expected: transfer.bank,
                got: bank,
            });
        }
        if chunk != transfer.chunk {
            return Err(CatalogError::ChunkOutOfOrder {
                expected: transfer.chunk,
                got: chunk,
            });
        }

        let offset = chunk as usize * TRANSFER_CHUNK_SIZE;
        transfer.buffer[offset..offset + TRANSFER_CHUNK_SIZE].copy_from_slice(data);
        transfer.chunk += 1;
        if transfer.chunk < CHUNKS_PER_BANK {
            return Ok(None);
        }

        let flash_bank = transfer.entry.banks[bank as usize];
        writer.program_bank(flash_bank, &transfer.buffer);
        debug!("bank {bank} written to flash bank {flash_bank}");
        transfer.chunk = 0;
        transfer.bank += 1;
        if (transfer.bank as usize) < transfer.entry.banks.len() {
            return Ok(None);
        }

        let Some(done) = self.transfer.take() else {
            return Ok(None);
        };
        info!("transfer of ROM {} completed", done.entry.name);
        self.entries.push(done.entry);
        Ok(Some(self.entries.len() - 1))
    }

    pub fn delete_rom(&mut self, index: usize) -> Result<CatalogEntry, CatalogError> {
        if index >= self.entries.len() {
            return Err(CatalogError::NoSuchRom(index));
        }
        let entry = self.entries.remove(index);
        for &bank in &entry.banks {
            self.mark(bank, false);
        }
        info!("deleted ROM {index}, {}", entry.name);
        Ok(entry)
    }
}
