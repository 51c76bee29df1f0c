//! Driver configuration
//!
//! Defaults match the board the driver was written for: chip select 1 on
//! SPI bus 1 at 1 MHz, mode 0, 8-bit words. A TOML file can override any of
//! them:
//!
//! ```toml
//! [driver]
//! name = "cc2500"
//! bus_num = 1
//! chip_select = 1
//! max_speed = "1 MHz"
//! mode = 0
//! bits_per_word = 8
//! buffer_size = 0x400
//! ```

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::bus::SpiMode;

/// Name the driver registers under
pub const DRIVER_NAME: &str = "cc2500";

/// Default status buffer size in bytes
pub const USER_BUFF_SIZE: usize = 1024;

/// Smallest status buffer that still fits every status line
pub const MIN_BUFF_SIZE: usize = 64;

const DEFAULT_BUS_NUM: u16 = 1;
const DEFAULT_CHIP_SELECT: u8 = 1;
const DEFAULT_SPEED_HZ: u32 = 1_000_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        #[source]
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// TOML syntax or schema error
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where and how the driver attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Driver name, used for the bus driver, the class and the node
    pub name: String,
    /// SPI bus number of the controller
    pub bus_num: u16,
    /// Chip select line
    pub chip_select: u8,
    /// Maximum clock speed in Hz
    pub max_speed_hz: u32,
    /// SPI mode word
    pub mode: SpiMode,
    /// Word size in bits
    pub bits_per_word: u8,
    /// Status buffer capacity in bytes
    pub buffer_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            bus_num: DEFAULT_BUS_NUM,
            chip_select: DEFAULT_CHIP_SELECT,
            max_speed_hz: DEFAULT_SPEED_HZ,
            mode: SpiMode::MODE_0,
            bits_per_word: 8,
            buffer_size: USER_BUFF_SIZE,
        }
    }
}

/// TOML file structure
#[derive(Debug, serde::Deserialize)]
struct TomlConfigFile {
    driver: Option<TomlDriver>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDriver {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    bus_num: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    chip_select: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_speed")]
    max_speed: Option<u32>,
    mode: Option<u8>,
    bits_per_word: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    buffer_size: Option<u32>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Int(u32),
    Str(String),
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<NumOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Int(n)) => Ok(Some(n)),
        Some(NumOrStr::Str(s)) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Deserialize a clock speed: plain Hz or a string with a kHz/MHz suffix
fn deserialize_opt_speed<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<NumOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Int(n)) => Ok(Some(n)),
        Some(NumOrStr::Str(s)) => parse_speed(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a clock speed like "1 MHz", "500kHz" or "1000000"
pub fn parse_speed(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("mhz") {
        (n.trim(), 1_000_000)
    } else if let Some(n) = lower.strip_suffix("khz") {
        (n.trim(), 1_000)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid speed: {}", s));
    };

    let num: u32 = num_str
        .parse()
        .map_err(|_| format!("invalid speed: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("speed out of range: {}", s))
}

impl DriverConfig {
    /// Parse a configuration from TOML text, starting from the defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: TomlConfigFile = toml::from_str(s)?;
        let mut config = Self::default();
        let driver = file.driver.unwrap_or_default();

        if let Some(name) = driver.name {
            config.name = name;
        }
        if let Some(bus_num) = driver.bus_num {
            config.bus_num = u16::try_from(bus_num)
                .map_err(|_| ConfigError::Invalid(format!("bus_num {} out of range", bus_num)))?;
        }
        if let Some(cs) = driver.chip_select {
            config.chip_select = u8::try_from(cs)
                .map_err(|_| ConfigError::Invalid(format!("chip_select {} out of range", cs)))?;
        }
        if let Some(speed) = driver.max_speed {
            config.max_speed_hz = speed;
        }
        if let Some(mode) = driver.mode {
            config.mode = SpiMode::from_clock_mode(mode)
                .ok_or_else(|| ConfigError::Invalid(format!("SPI mode {} (must be 0-3)", mode)))?;
        }
        if let Some(bits) = driver.bits_per_word {
            config.bits_per_word = bits;
        }
        if let Some(size) = driver.buffer_size {
            config.buffer_size = size as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check every field is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("driver name is empty".into()));
        }
        if self.max_speed_hz == 0 {
            return Err(ConfigError::Invalid("max speed must be non-zero".into()));
        }
        if !(1..=32).contains(&self.bits_per_word) {
            return Err(ConfigError::Invalid(format!(
                "bits_per_word {} (must be 1-32)",
                self.bits_per_word
            )));
        }
        if self.buffer_size < MIN_BUFF_SIZE {
            return Err(ConfigError::Invalid(format!(
                "buffer_size {} (must be at least {})",
                self.buffer_size, MIN_BUFF_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("1000000").unwrap(), 1_000_000);
        assert_eq!(parse_speed("0xF4240").unwrap(), 1_000_000);
        assert_eq!(parse_speed("1 MHz").unwrap(), 1_000_000);
        assert_eq!(parse_speed("500kHz").unwrap(), 500_000);
        assert_eq!(parse_speed("250 Hz").unwrap(), 250);
        assert!(parse_speed("fast").is_err());
        assert!(parse_speed("5000 MHz").is_err());
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = DriverConfig::from_toml_str("").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.name, "cc2500");
        assert_eq!(config.bus_num, 1);
        assert_eq!(config.chip_select, 1);
        assert_eq!(config.max_speed_hz, 1_000_000);
        assert_eq!(config.buffer_size, 1024);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[driver]
bus_num = 0
chip_select = "0x2"
max_speed = "4 MHz"
mode = 3
buffer_size = 0x200
"#;
        let config = DriverConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.bus_num, 0);
        assert_eq!(config.chip_select, 2);
        assert_eq!(config.max_speed_hz, 4_000_000);
        assert_eq!(config.mode, SpiMode::MODE_3);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.name, "cc2500");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            DriverConfig::from_toml_str("[driver]\nmode = 4\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("[driver]\nchip_select = 300\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("[driver]\nbuffer_size = 16\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("[driver]\nname = \"\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("[driver]\nspeed = 1\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
