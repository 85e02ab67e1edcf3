//! Parsing of `perf script` sample lines and mmap-info files
//!
//! A sample line looks like:
//!
//! ```text
//! python3 16435 10966.398011:          1      page-faults:u:      7fda3ea48290
//! ```
//!
//! i.e. `<comm> <pid> <time>: <count> <event>[:<mods>]: <address>`. Lines that
//! do not match are reported as [`ParseError::Malformed`]; callers drop and
//! count them.

use crate::event::EventType;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Reasons a perf line could not be turned into a sample
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("not a perf sample line: {0:?}")]
    Malformed(String),

    #[error("sample count does not fit in u64: {0}")]
    BadCount(String),

    #[error("address does not fit in u64: {0}")]
    BadAddress(String),
}

/// One parsed perf sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfSample {
    pub count: u64,
    /// Event name as printed by perf, modifiers stripped
    pub event_name: String,
    pub address: u64,
}

impl PerfSample {
    /// Schema event type, `None` for events the dataset does not track
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_perf_name(&self.event_name)
    }
}

fn sample_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r":\s+(\d+)\s+([\w-]+)(?::[ukhGHp]+)?:\s+(?:0x)?([0-9a-fA-F]+)")
            .expect("sample pattern is valid")
    })
}

fn base_address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Base Address:\s*(?:0x|0X)?([0-9a-fA-F]+)").expect("base pattern is valid")
    })
}

/// Parse a single `perf script` line
pub fn parse_line(line: &str) -> Result<PerfSample, ParseError> {
    let caps = sample_pattern()
        .captures(line)
        .ok_or_else(|| ParseError::Malformed(line.trim().to_string()))?;

    let count = caps[1]
        .parse::<u64>()
        .map_err(|_| ParseError::BadCount(caps[1].to_string()))?;
    let address = u64::from_str_radix(&caps[3], 16)
        .map_err(|_| ParseError::BadAddress(caps[3].to_string()))?;

    Ok(PerfSample {
        count,
        event_name: caps[2].to_string(),
        address,
    })
}

/// Find the tracked region's base address in mmap-info text
///
/// The workload writes a line such as `Base Address: 0x7f9c8b000000`. The
/// first such line wins.
pub fn parse_base_address(text: &str) -> Option<u64> {
    base_address_pattern()
        .captures_iter(text)
        .find_map(|caps| u64::from_str_radix(&caps[1], 16).ok())
}
