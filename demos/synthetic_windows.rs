//! Synthetic workload through the collector, printed as CSV
//!
//! Simulates a tracer thread emitting bursty page faults and writes the
//! windowed-prediction dataset to stdout (or to the path given as the first
//! argument).
//!
//! ```bash
//! cargo run --example synthetic_windows -- windows.csv
//! ```

use anyhow::{Context, Result};
use faultcast::config::WindowConfig;
use faultcast::event::{EventType, FaultEvent};
use faultcast::logging::init_tracing;
use faultcast::output::WindowCsv;
use faultcast::pipeline::write_window_csv;
use faultcast::source::{Collector, EventSink};
use faultcast::window::WindowTracker;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

const WINDOW_NS: u64 = 100_000_000;

/// Faults every third window with a burst every tenth, interleaved with reads
fn workload(windows: u64) -> Vec<FaultEvent> {
    let mut events = Vec::new();
    for w in 0..windows {
        let faults = match (w % 10, w % 3) {
            (0, _) => 12,
            (_, 0) => 2,
            _ => 0,
        };
        for k in 0..faults {
            let ts = w * WINDOW_NS + k * 5_000;
            events.push(FaultEvent::new(ts, k % 64, EventType::Fault, 4242));
            events.push(FaultEvent::new(ts + 1, k % 64, EventType::CacheMiss, 4242));
        }
    }
    events
}

fn main() -> Result<()> {
    init_tracing(std::env::var_os("FAULTCAST_DEBUG").is_some());

    let mut config = WindowConfig::new(100, 5);
    config.target_pid = Some(4242);
    let tracker = WindowTracker::new(config).context("invalid window configuration")?;
    let handle = Collector::spawn(Arc::new(tracker));

    let sender = handle.sender();
    let producer = thread::spawn(move || {
        for event in workload(60) {
            sender.deliver(event);
        }
    });
    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    let tracker = Arc::clone(handle.tracker());
    let dataset = handle.stop();
    let diagnostics = tracker.diagnostics();
    eprintln!(
        "{} examples, {} faults counted, {} non-fault events skipped",
        dataset.len(),
        diagnostics.counted,
        diagnostics.non_fault
    );

    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => write_window_csv(&dataset, &path)?,
        None => print!("{}", WindowCsv::to_csv(&dataset)),
    }
    Ok(())
}
