// Windowed fault prediction dataset
//
// Fault events are bucketed into fixed windows of `window_duration_ms`. For
// each window w past the first `history_length` ids, a feature record is built
// from count(w) and the H windows before it, and labeled with whether window
// w+1 saw any fault. The label needs the future, so emission trails the
// newest window by one.
//
// Lifecycle:
// - BelowHistory: cursor <= history_length, windows resolve without output
// - Active: windows resolve and emit as the cursor moves forward
// - Finalized: pending windows flushed once, dataset frozen

mod features;
mod tracker;

pub use features::{FeatureRecord, WindowLabel};
pub use tracker::{Ingest, TrackerDiagnostics, TrackerPhase, WindowTracker};
