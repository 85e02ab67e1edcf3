//! Configuration for dataset construction
//!
//! Every constant the pipelines depend on (window length, history depth, the
//! tracked memory region) is supplied here; core logic never hardcodes them.
//! Configuration is plain serde data and can be loaded from TOML:
//!
//! ```
//! use faultcast::config::DatasetConfig;
//!
//! let config = DatasetConfig::from_toml_str(
//!     r#"
//!     [window]
//!     window_duration_ms = 250
//!
//!     [mapping]
//!     base_address = "0x7f9c8b000000"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.window.window_duration_ms, 250);
//! assert_eq!(config.window.history_length, 5);
//! assert_eq!(config.mapping.resolved_base().unwrap(), 0x7f9c_8b00_0000);
//! ```

use crate::perf_script::parse_base_address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Addresses at or above this value are treated as kernel space
pub const DEFAULT_KERNEL_FLOOR: u64 = 0xffff_ffff_0000_0000;

/// Fatal configuration problems; dataset construction cannot proceed
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("base address of the tracked region is unknown: not configured and no `Base Address:` line found")]
    MissingBaseAddress,

    #[error("page_size_bytes must be a non-zero power of two, got {0}")]
    InvalidPageSize(u64),

    #[error("num_pages must be greater than zero")]
    ZeroPages,

    #[error("window_duration_ms must be greater than zero")]
    ZeroWindowDuration,

    #[error("history_length must be greater than zero")]
    ZeroHistory,

    #[error("tracked region overflows the address space: base {base:#x} + {num_pages} pages of {page_size} bytes")]
    RegionOverflow {
        base: u64,
        num_pages: u64,
        page_size: u64,
    },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Windowed-prediction pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Width of one aggregation window
    pub window_duration_ms: u64,

    /// Number of prior windows feeding each feature record (H)
    pub history_length: usize,

    /// Only count faults from this process; `None` counts every pid
    pub target_pid: Option<u32>,

    /// Emit the cursor window at stop time with a `partial` label
    ///
    /// Its successor was never observed, so its label is biased towards 0.
    /// The row is kept and flagged rather than silently dropped.
    pub flush_partial_window: bool,

    /// Cursor jumps wider than this many windows are logged and counted
    ///
    /// Gap windows are still emitted as zero-count rows; a jump this wide
    /// usually means a corrupt or out-of-order timestamp.
    pub max_gap_windows: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_duration_ms: 100,
            history_length: 5,
            target_pid: None,
            flush_partial_window: true,
            max_gap_windows: 100_000,
        }
    }
}

impl WindowConfig {
    pub fn new(window_duration_ms: u64, history_length: usize) -> Self {
        Self {
            window_duration_ms,
            history_length,
            ..Self::default()
        }
    }

    pub fn window_duration_ns(&self) -> u64 {
        self.window_duration_ms.saturating_mul(1_000_000)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_duration_ms == 0 {
            return Err(ConfigError::ZeroWindowDuration);
        }
        if self.history_length == 0 {
            return Err(ConfigError::ZeroHistory);
        }
        Ok(())
    }
}

/// Tracked memory region for the page-stat pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Start of the tracked region (usually the workload's mmap base)
    #[serde(with = "address::option")]
    pub base_address: Option<u64>,

    pub page_size_bytes: u64,

    pub num_pages: u64,

    #[serde(with = "address")]
    pub kernel_floor: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            base_address: None,
            page_size_bytes: 4096,
            num_pages: 1000,
            kernel_floor: DEFAULT_KERNEL_FLOOR,
        }
    }
}

impl MappingConfig {
    pub fn new(base_address: u64, page_size_bytes: u64, num_pages: u64) -> Self {
        Self {
            base_address: Some(base_address),
            page_size_bytes,
            num_pages,
            ..Self::default()
        }
    }

    /// Fill in the base address from mmap-info text (`Base Address: 0x...`)
    ///
    /// An explicitly configured base address wins over the file.
    pub fn with_base_from_mmap_info(mut self, mmap_info: &str) -> Result<Self, ConfigError> {
        if self.base_address.is_none() {
            let base = parse_base_address(mmap_info).ok_or(ConfigError::MissingBaseAddress)?;
            tracing::info!("resolved base address {:#x} from mmap info", base);
            self.base_address = Some(base);
        }
        Ok(self)
    }

    pub fn resolved_base(&self) -> Result<u64, ConfigError> {
        self.base_address.ok_or(ConfigError::MissingBaseAddress)
    }

    /// Size of the tracked region in bytes
    pub fn region_len(&self) -> Option<u64> {
        self.page_size_bytes.checked_mul(self.num_pages)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size_bytes == 0 || !self.page_size_bytes.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize(self.page_size_bytes));
        }
        if self.num_pages == 0 {
            return Err(ConfigError::ZeroPages);
        }
        let base = self.resolved_base()?;
        let overflow = ConfigError::RegionOverflow {
            base,
            num_pages: self.num_pages,
            page_size: self.page_size_bytes,
        };
        match self.region_len().and_then(|len| base.checked_add(len)) {
            Some(_) => Ok(()),
            None => Err(overflow),
        }
    }
}

/// Thresholds for the page promotion label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionThresholds {
    /// Minimum access frequency (exclusive) for a page to be a candidate
    pub access_threshold: u64,

    /// Minimum TLB miss rate in percent (exclusive)
    pub tlb_miss_rate_threshold: f64,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            access_threshold: 1000,
            tlb_miss_rate_threshold: 5.0,
        }
    }
}

/// Complete configuration for both pipelines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub window: WindowConfig,
    pub mapping: MappingConfig,
    pub promotion: PromotionThresholds,
}

impl DatasetConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate both pipelines' settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.mapping.validate()
    }
}

/// Addresses accept either an integer or a `0x`-prefixed hex string
///
/// TOML integers are signed 64-bit, so kernel-range addresses only fit as text.
mod address {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    fn parse<E: de::Error>(raw: Raw) -> Result<u64, E> {
        match raw {
            Raw::Int(v) => Ok(v),
            Raw::Text(s) => {
                let digits = s.trim();
                let parsed = match digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => digits.parse(),
                };
                parsed.map_err(|_| E::custom(format!("invalid address: {s}")))
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        parse(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::{parse, Raw};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(parse)
                .transpose()
        }
    }
}
