//! Row rendering for the persisted datasets
//!
//! Both datasets are written one row per record, CSV for spreadsheets and
//! training scripts, JSON for machine consumers. Writing the rendered text to
//! disk is left to the caller.

use crate::dataset::{Dataset, LabeledExample};
use crate::page_stats::PageStatRecord;

/// Column order of the windowed-prediction dataset
pub const WINDOW_COLUMNS: [&str; 8] = [
    "faults_current",
    "total_faults_history",
    "max_faults_history",
    "min_faults_history",
    "trend",
    "window_id",
    "next_window_has_fault",
    "partial_window",
];

/// Column order of the page-stat dataset
pub const PAGE_COLUMNS: [&str; 10] = [
    "page",
    "page_faults",
    "tlb_load_misses",
    "tlb_store_misses",
    "cache_misses",
    "cache_references",
    "cache_miss_rate",
    "access_frequency",
    "branch_miss_rate",
    "label",
];

/// CSV formatter for the windowed-prediction dataset
#[derive(Debug, Default)]
pub struct WindowCsv;

impl WindowCsv {
    pub fn header() -> String {
        WINDOW_COLUMNS.join(",")
    }

    fn format_example(example: &LabeledExample) -> String {
        let f = &example.features;
        format!(
            "{},{},{},{},{},{},{},{}",
            f.faults_current,
            f.total_faults_history,
            f.max_faults_history,
            f.min_faults_history,
            f.trend,
            f.window_id,
            example.label.as_u8(),
            u8::from(example.label.partial),
        )
    }

    pub fn to_csv(dataset: &Dataset) -> String {
        let mut output = Self::header();
        output.push('\n');
        for example in dataset.examples() {
            output.push_str(&Self::format_example(example));
            output.push('\n');
        }
        output
    }
}

/// CSV formatter for the page-stat dataset
#[derive(Debug, Default)]
pub struct PageStatCsv;

impl PageStatCsv {
    pub fn header() -> String {
        PAGE_COLUMNS.join(",")
    }

    fn format_record(r: &PageStatRecord) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            r.page,
            r.page_faults,
            r.tlb_load_misses,
            r.tlb_store_misses,
            r.cache_misses,
            r.cache_references,
            r.cache_miss_rate,
            r.access_frequency,
            r.branch_miss_rate,
            r.label,
        )
    }

    pub fn to_csv(records: &[PageStatRecord]) -> String {
        let mut output = Self::header();
        output.push('\n');
        for record in records {
            output.push_str(&Self::format_record(record));
            output.push('\n');
        }
        output
    }
}

/// JSON array of labeled examples
pub fn window_json(dataset: &Dataset) -> serde_json::Result<String> {
    serde_json::to_string_pretty(dataset.examples())
}

/// JSON array of page records
pub fn page_stats_json(records: &[PageStatRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}
