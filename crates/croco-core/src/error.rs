use std::io;

use thiserror::Error;

use crate::catalog::CatalogError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedCartridge(u8),

    #[error("game needs {banks} RAM banks, only {max} are available")]
    TooManyRamBanks { banks: u8, max: u8 },

    #[error("ROM {0} is not in storage")]
    RomNotFound(u8),

    #[error("ROM image is truncated ({len} bytes)")]
    RomTooShort { len: usize },

    #[error("menu program is {len} bytes, two banks at most")]
    MenuTooLarge { len: usize },

    #[error("DMA channel {0} is already claimed")]
    ChannelClaimed(u8),

    #[error("invalid RTC snapshot")]
    InvalidRtcSnapshot,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
