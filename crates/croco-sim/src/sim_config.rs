use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimConfig {
    /// Directory for `.sav` / `.rtc` files. Defaults to the ROM's directory.
    pub saves_dir: Option<PathBuf>,
    /// Bootloader mode byte: 0 no hook, 1 or 2 for the save hook variants.
    pub hook_mode: u8,
    /// Depth of the main snooper FIFO in words.
    pub fifo_depth: usize,
    /// Fixed Unix time handed to the RTC instead of the host clock.
    pub wall_clock: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            saves_dir: None,
            hook_mode: 0,
            fifo_depth: croco_core::sim::DEFAULT_MAIN_FIFO_DEPTH,
            wall_clock: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("croco").join("sim.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("croco")
            .join("sim.toml");
    }

    PathBuf::from("sim.toml")
}

pub fn load_from_file(path: &Path) -> SimConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return SimConfig::default(),
    };

    match toml::from_str::<SimConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse simulator config {}: {e}; using defaults",
                path.display()
            );
            SimConfig::default()
        }
    }
}
