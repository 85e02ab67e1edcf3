//! Fault and memory-access events consumed by both pipelines
//!
//! Events are produced by an external tracer (perf, eBPF) and delivered to the
//! crate one at a time. They are immutable and consumed exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of memory event reported by the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Read fault
    Read,
    /// Write fault
    Write,
    /// Page fault with no access-type attribution
    Fault,
    TlbLoadMiss,
    TlbStoreMiss,
    CacheMiss,
    CacheReference,
    Branch,
    BranchMiss,
}

impl EventType {
    /// Canonical snake_case label
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Fault => "fault",
            Self::TlbLoadMiss => "tlb_load_miss",
            Self::TlbStoreMiss => "tlb_store_miss",
            Self::CacheMiss => "cache_miss",
            Self::CacheReference => "cache_reference",
            Self::Branch => "branch",
            Self::BranchMiss => "branch_miss",
        }
    }

    /// Map a `perf` event name (e.g. `page-faults`, `dTLB-load-misses`)
    ///
    /// Matching ignores case and treats `-` and `_` alike. Returns `None` for
    /// events with no counterpart in the dataset schema.
    pub fn from_perf_name(name: &str) -> Option<Self> {
        let key = name.to_ascii_lowercase().replace('-', "_");
        let event = match key.as_str() {
            "page_faults" | "faults" | "major_faults" | "minor_faults" => Self::Fault,
            "dtlb_load_misses" | "tlb_load_misses" => Self::TlbLoadMiss,
            "dtlb_store_misses" | "tlb_store_misses" => Self::TlbStoreMiss,
            "cache_misses" => Self::CacheMiss,
            "cache_references" => Self::CacheReference,
            "branches" | "branch_instructions" => Self::Branch,
            "branch_misses" => Self::BranchMiss,
            "read" => Self::Read,
            "write" => Self::Write,
            _ => return None,
        };
        Some(event)
    }

    /// Whether the window tracker counts this event as a page fault
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Read | Self::Write | Self::Fault)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fault/access event delivered by the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Monotonic kernel timestamp in nanoseconds
    pub timestamp_ns: u64,
    pub page_id: u64,
    pub event_type: EventType,
    pub pid: u32,
}

impl FaultEvent {
    pub fn new(timestamp_ns: u64, page_id: u64, event_type: EventType, pid: u32) -> Self {
        Self {
            timestamp_ns,
            page_id,
            event_type,
            pid,
        }
    }

    /// Shorthand for an unattributed page fault
    pub fn fault(timestamp_ns: u64, pid: u32) -> Self {
        Self::new(timestamp_ns, 0, EventType::Fault, pid)
    }
}
