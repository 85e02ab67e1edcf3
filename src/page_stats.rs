//! Per-page event statistics for the page-stat dataset
//!
//! [`PageStatAggregator`] accumulates typed counters per page index.
//! [`PageStatParser`] drives `perf script` lines through the
//! [`PageMapper`](crate::mapper::PageMapper) into the aggregator and keeps
//! diagnostic counters for everything it discounts.

use crate::config::PromotionThresholds;
use crate::event::EventType;
use crate::mapper::{MapError, PageIndex, PageMapper};
use crate::perf_script::{self, PerfSample};
use serde::Serialize;
use std::collections::HashMap;

/// Raw counters for one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounters {
    pub page_faults: u64,
    pub tlb_load_misses: u64,
    pub tlb_store_misses: u64,
    pub cache_misses: u64,
    pub cache_references: u64,
    pub branches: u64,
    pub branch_misses: u64,
}

impl PageCounters {
    fn field_mut(&mut self, event: EventType) -> &mut u64 {
        match event {
            EventType::Read | EventType::Write | EventType::Fault => &mut self.page_faults,
            EventType::TlbLoadMiss => &mut self.tlb_load_misses,
            EventType::TlbStoreMiss => &mut self.tlb_store_misses,
            EventType::CacheMiss => &mut self.cache_misses,
            EventType::CacheReference => &mut self.cache_references,
            EventType::Branch => &mut self.branches,
            EventType::BranchMiss => &mut self.branch_misses,
        }
    }

    /// Events that touched the page: faults, TLB misses and cache references
    pub fn access_frequency(&self) -> u64 {
        self.page_faults
            .saturating_add(self.tlb_load_misses)
            .saturating_add(self.tlb_store_misses)
            .saturating_add(self.cache_references)
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// `100 * numerator / denominator`, or 0 when the denominator is 0
pub fn percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 * 100.0 / denominator as f64
    }
}

/// One output row of the page-stat dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageStatRecord {
    pub page: PageIndex,
    pub page_faults: u64,
    pub tlb_load_misses: u64,
    pub tlb_store_misses: u64,
    pub cache_misses: u64,
    pub cache_references: u64,
    pub branches: u64,
    pub branch_misses: u64,
    pub cache_miss_rate: f64,
    pub branch_miss_rate: f64,
    /// TLB misses per access, in percent
    pub tlb_miss_rate: f64,
    pub access_frequency: u64,
    /// Promotion candidate: hot page with a high TLB miss rate
    pub label: u8,
}

impl PageStatRecord {
    fn from_counters(page: PageIndex, c: &PageCounters, thresholds: &PromotionThresholds) -> Self {
        let access_frequency = c.access_frequency();
        let tlb_misses = c.tlb_load_misses.saturating_add(c.tlb_store_misses);
        let tlb_miss_rate = percent(tlb_misses, access_frequency);
        let promote = access_frequency > thresholds.access_threshold
            && tlb_miss_rate > thresholds.tlb_miss_rate_threshold;

        Self {
            page,
            page_faults: c.page_faults,
            tlb_load_misses: c.tlb_load_misses,
            tlb_store_misses: c.tlb_store_misses,
            cache_misses: c.cache_misses,
            cache_references: c.cache_references,
            branches: c.branches,
            branch_misses: c.branch_misses,
            cache_miss_rate: ratio(c.cache_misses, c.cache_references),
            branch_miss_rate: ratio(c.branch_misses, c.branches),
            tlb_miss_rate,
            access_frequency,
            label: u8::from(promote),
        }
    }
}

/// Accumulates counters per page index in `[0, num_pages)`
#[derive(Debug, Default)]
pub struct PageStatAggregator {
    num_pages: u64,
    counters: HashMap<PageIndex, PageCounters>,
}

impl PageStatAggregator {
    pub fn new(num_pages: u64) -> Self {
        Self {
            num_pages,
            counters: HashMap::new(),
        }
    }

    /// Add `increment` to `page`'s counter for `event`
    ///
    /// Returns `false` (and counts nothing) for a page outside the region.
    pub fn record(&mut self, page: PageIndex, event: EventType, increment: u64) -> bool {
        if page >= self.num_pages {
            return false;
        }
        let field = self.counters.entry(page).or_default().field_mut(event);
        *field = field.saturating_add(increment);
        true
    }

    /// Counters for `page`; unseen pages read as all-zero
    pub fn counters(&self, page: PageIndex) -> PageCounters {
        self.counters.get(&page).copied().unwrap_or_default()
    }

    /// Number of pages with at least one recorded event
    pub fn pages_with_data(&self) -> usize {
        self.counters.len()
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }

    /// One record per page index, zero-filled for unseen pages
    pub fn finalize(&self, thresholds: &PromotionThresholds) -> Vec<PageStatRecord> {
        (0..self.num_pages)
            .map(|page| PageStatRecord::from_counters(page, &self.counters(page), thresholds))
            .collect()
    }
}

/// What happened to the lines fed into a [`PageStatParser`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostics {
    pub lines: u64,
    pub matched: u64,
    pub malformed: u64,
    pub kernel_addresses: u64,
    pub out_of_range: u64,
    pub unknown_events: u64,
    pub counted: u64,
}

/// Parses perf output into per-page statistics
#[derive(Debug)]
pub struct PageStatParser {
    mapper: PageMapper,
    aggregator: PageStatAggregator,
    diagnostics: ParseDiagnostics,
}

impl PageStatParser {
    pub fn new(mapper: PageMapper) -> Self {
        let aggregator = PageStatAggregator::new(mapper.num_pages());
        Self {
            mapper,
            aggregator,
            diagnostics: ParseDiagnostics::default(),
        }
    }

    /// Feed one raw perf line; malformed lines are dropped and counted
    pub fn ingest_line(&mut self, line: &str) {
        self.diagnostics.lines += 1;
        match perf_script::parse_line(line) {
            Ok(sample) => {
                self.diagnostics.matched += 1;
                self.ingest_sample(&sample);
            }
            Err(e) => {
                self.diagnostics.malformed += 1;
                tracing::debug!("dropping perf line: {}", e);
            }
        }
    }

    pub fn ingest_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.ingest_line(line.as_ref());
        }
    }

    /// Map a parsed sample and count it against its page
    pub fn ingest_sample(&mut self, sample: &PerfSample) {
        let page = match self.mapper.map(sample.address) {
            Ok(page) => page,
            Err(MapError::KernelSpace(_)) => {
                self.diagnostics.kernel_addresses += 1;
                return;
            }
            Err(MapError::BelowBase(_) | MapError::BeyondRegion(_)) => {
                self.diagnostics.out_of_range += 1;
                return;
            }
        };

        match sample.event_type() {
            Some(event) => {
                if self.aggregator.record(page, event, sample.count) {
                    self.diagnostics.counted += 1;
                }
            }
            None => self.diagnostics.unknown_events += 1,
        }
    }

    pub fn diagnostics(&self) -> ParseDiagnostics {
        self.diagnostics
    }

    pub fn aggregator(&self) -> &PageStatAggregator {
        &self.aggregator
    }

    /// Emit the full, zero-filled page table
    pub fn finish(&self, thresholds: &PromotionThresholds) -> Vec<PageStatRecord> {
        let d = &self.diagnostics;
        tracing::info!(
            lines = d.lines,
            matched = d.matched,
            malformed = d.malformed,
            kernel = d.kernel_addresses,
            out_of_range = d.out_of_range,
            unknown = d.unknown_events,
            pages_with_data = self.aggregator.pages_with_data(),
            "page statistics parsed"
        );
        self.aggregator.finalize(thresholds)
    }
}
