use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, LevelFilter};
use pianolight_adalight_format::MAX_LEDS;
use pianolight_render_lib::{PaletteMap, StripLayout};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

/// Host configuration, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Number of keys driven (61 or 88 typical)
    #[serde(default = "default_keys")]
    pub keys: usize,
    #[serde(default = "default_leds_per_key")]
    pub leds_per_key: usize,
    /// LEDs before the first key that are never lit
    #[serde(default)]
    pub led_offset: usize,
    /// MIDI note number of key 0
    #[serde(default = "default_first_key")]
    pub first_key: u8,
    /// JSON file with the `[r, g, b]` color table
    #[serde(default = "default_palette")]
    pub palette: PathBuf,
    #[serde(default)]
    pub rotation: i64,
    /// Global brightness (0-255) applied on output
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    /// Push every Nth valid hex line (1 = every line)
    #[serde(default = "default_push_every")]
    pub push_every: u32,
    /// Fixed frame rate for MIDI input; `None` pushes on every event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    /// Adalight output: a serial device, a file, or `-` for stdout
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// TCP port for `serve`
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub log_level: LogLevel,
}

const fn default_keys() -> usize {
    61
}

const fn default_leds_per_key() -> usize {
    2
}

const fn default_first_key() -> u8 {
    36
}

fn default_palette() -> PathBuf {
    PathBuf::from("palette.json")
}

const fn default_brightness() -> u8 {
    255
}

const fn default_push_every() -> u32 {
    3
}

fn default_output() -> PathBuf {
    PathBuf::from("-")
}

const fn default_listen_port() -> u16 {
    9080
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            leds_per_key: default_leds_per_key(),
            led_offset: 0,
            first_key: default_first_key(),
            palette: default_palette(),
            rotation: 0,
            brightness: default_brightness(),
            push_every: default_push_every(),
            frame_rate: None,
            output: default_output(),
            listen_port: default_listen_port(),
            log_level: LogLevel::default(),
        }
    }
}

impl HostConfig {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, HostError> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| HostError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| HostError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Config parsed: keys={}, leds_per_key={}, led_offset={}, log_level={:?}",
            config.keys, config.leds_per_key, config.led_offset, config.log_level
        );
        Ok(config)
    }

    /// Strip geometry, checked against what an Adalight header can describe.
    pub fn layout(&self) -> Result<StripLayout, HostError> {
        if self.keys == 0 || self.leds_per_key == 0 {
            return Err(HostError::Config {
                reason: format!(
                    "keys ({}) and leds_per_key ({}) must be at least 1",
                    self.keys, self.leds_per_key
                ),
            });
        }
        let fits = self
            .keys
            .checked_mul(self.leds_per_key)
            .and_then(|n| n.checked_add(self.led_offset))
            .is_some_and(|n| n <= MAX_LEDS);
        if !fits {
            return Err(HostError::Config {
                reason: format!("strip longer than {MAX_LEDS} LEDs"),
            });
        }
        Ok(StripLayout::new(self.keys, self.leds_per_key, self.led_offset))
    }

    /// Read the palette file and apply the configured rotation.
    pub fn load_palette(&self) -> Result<PaletteMap, HostError> {
        let text = fs::read_to_string(&self.palette).map_err(|source| HostError::PaletteRead {
            path: self.palette.clone(),
            source,
        })?;
        let mut palette: PaletteMap =
            serde_json::from_str(&text).map_err(|source| HostError::PaletteParse {
                path: self.palette.clone(),
                source,
            })?;
        palette.set_rotation(self.rotation);
        info!(
            "Loaded {} palette colors from {} (rotation {})",
            palette.len(),
            self.palette.display(),
            self.rotation
        );
        Ok(palette)
    }
}
