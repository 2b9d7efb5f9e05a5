use crate::error::{Error, Result};
use crate::mapper::MapperKind;

const HEADER_END: usize = 0x0150;

/// RAM size code at 0x0149 to number of 8K banks. Codes 0 and 1 (no RAM,
/// unofficial 2K) both map to zero banks.
const RAM_BANK_LOOKUP: [u8; 6] = [0, 0, 1, 4, 16, 8];

/// Parsed cartridge header of a ROM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cart_type: u8,
    pub rom_banks: u16,
    /// Number of 8K RAM banks, or `0xFF` for an unknown size code.
    pub ram_banks: u8,
    pub cgb: bool,
}

impl CartridgeHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_END {
            return Err(Error::RomTooShort { len: data.len() });
        }

        let cart_type = data[0x0147];
        Ok(Self {
            title: title(&data[0x0134..0x0144]),
            cart_type,
            rom_banks: rom_bank_count(data[0x0148]),
            ram_banks: ram_bank_count(cart_type, data[0x0149]),
            cgb: data[0x0143] & 0x80 != 0,
        })
    }

    pub fn mapper(&self) -> Result<MapperKind> {
        MapperKind::from_cartridge_type(self.cart_type)
            .ok_or(Error::UnsupportedCartridge(self.cart_type))
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }
}

fn title(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

fn rom_bank_count(code: u8) -> u16 {
    // 8 MiB (code 8) is the largest size the header can describe.
    1u16 << (code.min(8) + 1)
}

fn ram_bank_count(cart_type: u8, code: u8) -> u8 {
    // MBC2 has 512x4 bits of RAM on the mapper itself, exposed as one bank.
    if matches!(cart_type, 0x05..=0x07) {
        return 1;
    }
    RAM_BANK_LOOKUP.get(code as usize).copied().unwrap_or(0xFF)
}

/// Finds the ROM bank that holds a CGB speed switch (`LDH ($4D),A` followed
/// shortly by `STOP`), so the bus loop only has to watch that bank.
pub fn find_speed_switch_bank(rom: &[u8]) -> Option<u16> {
    const WINDOW: usize = 16;

    let header = CartridgeHeader::parse(rom).ok()?;
    if !header.cgb {
        return None;
    }

    let bank_size = crate::config::GB_ROM_BANK_SIZE as usize;
    rom.windows(2)
        .enumerate()
        .filter(|(_, pair)| *pair == [0xE0, 0x4D])
        .find(|&(pos, _)| {
            let tail = &rom[pos + 2..rom.len().min(pos + 2 + WINDOW)];
            tail.windows(2).any(|op| op == [0x10, 0x00])
        })
        .map(|(pos, _)| (pos / bank_size) as u16)
}
