//! File-level drivers for both dataset variants
//!
//! These glue the core modules to the filesystem: read a perf-script dump and
//! an mmap-info file, run a recorded event stream through a collector, write
//! the rendered CSV. Errors carry the offending path.

use crate::config::{DatasetConfig, WindowConfig};
use crate::dataset::Dataset;
use crate::event::FaultEvent;
use crate::mapper::PageMapper;
use crate::output::{PageStatCsv, WindowCsv};
use crate::page_stats::{PageStatParser, PageStatRecord, ParseDiagnostics};
use crate::source::{Collector, EventSource, ReplaySource, StopSignal};
use crate::window::WindowTracker;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Result of one page-stat run
#[derive(Debug, Clone)]
pub struct PageStatRun {
    pub records: Vec<PageStatRecord>,
    pub diagnostics: ParseDiagnostics,
}

/// Build the page-stat dataset from perf-script text
///
/// When `mmap_info` is given and the config has no explicit base address, the
/// base is taken from its `Base Address:` line.
pub fn page_stats_from_text(
    perf_script: &str,
    mmap_info: Option<&str>,
    config: &DatasetConfig,
) -> Result<PageStatRun> {
    let mut mapping = config.mapping.clone();
    if let Some(info) = mmap_info {
        mapping = mapping
            .with_base_from_mmap_info(info)
            .context("failed to resolve base address from mmap info")?;
    }
    let mapper = PageMapper::new(&mapping).context("invalid page mapping")?;

    let mut parser = PageStatParser::new(mapper);
    parser.ingest_lines(perf_script.lines());
    Ok(PageStatRun {
        records: parser.finish(&config.promotion),
        diagnostics: parser.diagnostics(),
    })
}

/// Same as [`page_stats_from_text`], reading both inputs from disk
pub fn page_stats_from_files(
    perf_script: &Path,
    mmap_info: Option<&Path>,
    config: &DatasetConfig,
) -> Result<PageStatRun> {
    let perf_text = fs::read_to_string(perf_script)
        .with_context(|| format!("failed to read perf script {}", perf_script.display()))?;
    let info_text = mmap_info
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read mmap info {}", path.display()))
        })
        .transpose()?;
    page_stats_from_text(&perf_text, info_text.as_deref(), config)
}

/// Replay a recorded event stream through a collector thread and finalize
pub fn window_dataset_from_events(config: &WindowConfig, events: Vec<FaultEvent>) -> Result<Dataset> {
    let tracker = WindowTracker::new(config.clone()).context("invalid window configuration")?;
    let handle = Collector::spawn(Arc::new(tracker));
    let sender = handle.sender();

    let mut source = ReplaySource::new(events);
    let delivered = source.run(&sender, &StopSignal::new());
    if sender.rejected() > 0 {
        anyhow::bail!("collector rejected {} of {} events", sender.rejected(), delivered);
    }
    Ok(handle.stop())
}

pub fn write_window_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    fs::write(path, WindowCsv::to_csv(dataset))
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_page_stats_csv(records: &[PageStatRecord], path: &Path) -> Result<()> {
    fs::write(path, PageStatCsv::to_csv(records))
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;

    const PERF: &str = "\
python3 16435 10966.398011:          1      page-faults:u:      7fda3ea48290
python3 16435 10966.398012:          3  dTLB-load-misses:u:      7fda3ea49000
python3 16435 10966.398013:          2      page-faults:u:  ffffffffa1000000
garbage line
";

    #[test]
    fn test_page_stats_base_from_mmap_info() {
        let config = DatasetConfig::default();
        let run = page_stats_from_text(PERF, Some("Base Address: 0x7fda3ea48000\n"), &config)
            .unwrap();
        assert_eq!(run.records.len(), 1000);
        assert_eq!(run.records[0].page_faults, 1);
        assert_eq!(run.records[1].tlb_load_misses, 3);
        assert_eq!(run.diagnostics.kernel_addresses, 1);
        assert_eq!(run.diagnostics.malformed, 1);
    }

    #[test]
    fn test_page_stats_missing_base_is_an_error() {
        let err = page_stats_from_text(PERF, Some("nothing here"), &DatasetConfig::default())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("base address"));

        let err = page_stats_from_text(PERF, None, &DatasetConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid page mapping"));
    }

    #[test]
    fn test_explicit_base_wins() {
        let config = DatasetConfig {
            mapping: MappingConfig::new(0x7fda3ea49000, 4096, 10),
            ..DatasetConfig::default()
        };
        let run = page_stats_from_text(PERF, Some("Base Address: 0x1000"), &config).unwrap();
        assert_eq!(run.records.len(), 10);
        assert_eq!(run.records[0].tlb_load_misses, 3);
        assert_eq!(run.diagnostics.out_of_range, 1);
    }

    #[test]
    fn test_files_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let perf = dir.path().join("perf.txt");
        let info = dir.path().join("mmap_info.txt");
        let out = dir.path().join("page_metrics.csv");
        fs::write(&perf, PERF).unwrap();
        fs::write(&info, "Base Address: 0x7fda3ea48000\n").unwrap();

        let run = page_stats_from_files(&perf, Some(&info), &DatasetConfig::default()).unwrap();
        write_page_stats_csv(&run.records, &out).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 1001);
        assert!(text.starts_with("page,page_faults,"));
    }

    #[test]
    fn test_missing_perf_file_names_path() {
        let err = page_stats_from_files(
            Path::new("/nonexistent/perf.txt"),
            None,
            &DatasetConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/perf.txt"));
    }

    #[test]
    fn test_window_dataset_from_events() {
        let window_ns = 100_000_000;
        let events: Vec<FaultEvent> = [3u64, 4, 4, 6]
            .iter()
            .map(|&w| FaultEvent::fault(w * window_ns, 1))
            .collect();
        let ds = window_dataset_from_events(&WindowConfig::new(100, 2), events).unwrap();
        let ids: Vec<u64> = ds.features().map(|f| f.window_id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert!(ds.example_for(5).unwrap().label.next_window_has_fault);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("windows.csv");
        write_window_csv(&ds, &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 5);
    }

    #[test]
    fn test_window_dataset_rejects_bad_config() {
        assert!(window_dataset_from_events(&WindowConfig::new(100, 0), Vec::new()).is_err());
    }
}
