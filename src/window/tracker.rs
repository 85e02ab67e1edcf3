// Concurrent window tracker: buckets fault timestamps into fixed windows and
// emits lagged (feature, label) pairs.
//
// Every piece of mutable state lives in one `TrackerState` behind one mutex.
// The "compare window id with the cursor, advance or count, append features"
// sequence runs entirely inside a single lock acquisition, so a concurrent
// producer can neither lose an increment to a window being closed nor race
// the advance decision.

use super::features::{FeatureRecord, WindowLabel};
use crate::config::{ConfigError, WindowConfig};
use crate::dataset::{reconcile, Dataset};
use crate::event::FaultEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackerPhase {
    /// Cursor has not passed `history_length`; nothing can be emitted yet
    BelowHistory,
    /// Emitting each window once its successor has seen a fault
    Active,
    /// Terminal; further events are ignored
    Finalized,
}

/// Outcome of delivering one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Counted,
    /// Window already behind the cursor; dropped, never applied retroactively
    Stale,
    /// Tracker already finalized
    Ignored,
    /// Event from a pid other than the configured target
    Filtered,
    /// Event type is not a page fault
    NotAFault,
}

/// Counters for everything the tracker saw or discounted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerDiagnostics {
    pub counted: u64,
    pub stale: u64,
    pub ignored_after_finalize: u64,
    pub filtered_pid: u64,
    pub non_fault: u64,
    /// Windows resolved while still inside the first `history_length` ids
    pub below_history: u64,
    /// Cursor jumps wider than `max_gap_windows`
    pub large_gaps: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Sparse fault counts by window id
    windows: BTreeMap<u64, u64>,
    /// Newest window that has received an event
    cursor: Option<u64>,
    /// First window whose feature/label has not been resolved yet
    next_emit: u64,
    features: Vec<FeatureRecord>,
    labels: Vec<WindowLabel>,
    finalized: Option<Dataset>,
    diagnostics: TrackerDiagnostics,
}

impl TrackerState {
    /// Fault count of a window; absent windows count 0
    fn count(&self, window_id: u64) -> u64 {
        self.windows.get(&window_id).copied().unwrap_or(0)
    }

    /// Resolve window `w`, emitting its pair if it is past the history prefix
    fn emit(&mut self, w: u64, history_length: usize, partial: bool) -> bool {
        let feature = FeatureRecord::compute(w, history_length, |id| self.count(id));
        match feature {
            Some(feature) => {
                let label = WindowLabel::from_next_count(self.count(w.saturating_add(1)), partial);
                self.features.push(feature);
                self.labels.push(label);
                true
            }
            None => {
                self.diagnostics.below_history += 1;
                false
            }
        }
    }

    /// Emit every unresolved window below `end`, in order
    fn emit_until(&mut self, end: u64, history_length: usize) -> usize {
        let mut emitted = 0;
        for w in self.next_emit..end {
            if self.emit(w, history_length, false) {
                emitted += 1;
            }
        }
        self.next_emit = self.next_emit.max(end);
        emitted
    }

    /// Move the cursor forward to `window_id`
    ///
    /// Every window before `window_id - 1` now has a final successor count and
    /// is emitted, gap windows included. `window_id - 1` waits for its
    /// successor: it resolves as soon as a fault lands in `window_id`, or when
    /// the cursor moves past `window_id`.
    fn advance(&mut self, window_id: u64, history_length: usize) -> usize {
        let emitted = self.emit_until(window_id - 1, history_length);
        self.cursor = Some(window_id);
        emitted
    }
}

/// Window tracker shared between a producer and a consumer
///
/// # Example
///
/// ```
/// use faultcast::config::WindowConfig;
/// use faultcast::window::WindowTracker;
///
/// let tracker = WindowTracker::new(WindowConfig::new(100, 2)).unwrap();
/// let window = 100_000_000; // 100ms in ns
/// for w in [1, 2, 3, 4, 5] {
///     tracker.add_fault(w * window);
/// }
/// let dataset = tracker.finalize();
/// // windows 3 and 4 are complete, window 5 is flushed as partial
/// assert_eq!(dataset.len(), 3);
/// assert!(dataset.examples()[2].label.partial);
/// ```
#[derive(Debug)]
pub struct WindowTracker {
    config: WindowConfig,
    window_ns: u64,
    state: Mutex<TrackerState>,
}

impl WindowTracker {
    pub fn new(config: WindowConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window_ns: config.window_duration_ns(),
            config,
            state: Mutex::new(TrackerState::default()),
        })
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Window id containing `timestamp_ns`
    pub fn window_id(&self, timestamp_ns: u64) -> u64 {
        timestamp_ns / self.window_ns
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // No code path panics while holding the lock with state half-updated
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bring the cursor up to `window_id`, or report why the event is dropped
    fn locate(&self, state: &mut TrackerState, window_id: u64) -> Result<usize, Ingest> {
        if state.finalized.is_some() {
            state.diagnostics.ignored_after_finalize += 1;
            return Err(Ingest::Ignored);
        }
        match state.cursor {
            None => {
                state.cursor = Some(window_id);
                state.next_emit = window_id;
                Ok(0)
            }
            Some(cursor) if window_id < cursor => {
                state.diagnostics.stale += 1;
                tracing::debug!(window_id, cursor, "dropping stale fault event");
                Err(Ingest::Stale)
            }
            Some(cursor) if window_id > cursor => {
                let gap = window_id - cursor;
                if gap > self.config.max_gap_windows {
                    state.diagnostics.large_gaps += 1;
                    tracing::warn!(
                        cursor,
                        window_id,
                        gap,
                        "cursor jump exceeds max_gap_windows, emitting zero-count gap windows"
                    );
                }
                Ok(state.advance(window_id, self.config.history_length))
            }
            Some(_) => Ok(0),
        }
    }

    /// Count one fault at `timestamp_ns`
    pub fn add_fault(&self, timestamp_ns: u64) -> Ingest {
        let window_id = self.window_id(timestamp_ns);
        let mut state = self.lock();
        let located = self.locate(&mut state, window_id);
        self.count_fault(located, &mut state, window_id)
    }

    /// Apply the fault, then resolve the window before it
    ///
    /// Once window `w` holds a fault, `w - 1` has its label and its count can
    /// no longer change: the cursor is already past it.
    fn count_fault(
        &self,
        located: Result<usize, Ingest>,
        state: &mut TrackerState,
        window_id: u64,
    ) -> Ingest {
        match located {
            Ok(_) => {
                *state.windows.entry(window_id).or_insert(0) += 1;
                state.diagnostics.counted += 1;
                state.emit_until(window_id, self.config.history_length);
                Ingest::Counted
            }
            Err(outcome) => outcome,
        }
    }

    /// Advance the cursor to the window of `timestamp_ns` without counting
    ///
    /// Returns the number of examples emitted by the advance.
    pub fn update(&self, timestamp_ns: u64) -> usize {
        let window_id = self.window_id(timestamp_ns);
        let mut state = self.lock();
        self.locate(&mut state, window_id).unwrap_or(0)
    }

    /// Deliver a full event: apply the pid and fault-type filters, then count
    pub fn record(&self, event: &FaultEvent) -> Ingest {
        let window_id = self.window_id(event.timestamp_ns);
        let mut state = self.lock();

        if state.finalized.is_some() {
            state.diagnostics.ignored_after_finalize += 1;
            return Ingest::Ignored;
        }
        if let Some(target) = self.config.target_pid {
            if event.pid != target {
                state.diagnostics.filtered_pid += 1;
                return Ingest::Filtered;
            }
        }
        if !event.event_type.is_fault() {
            state.diagnostics.non_fault += 1;
            return Ingest::NotAFault;
        }

        let located = self.locate(&mut state, window_id);
        self.count_fault(located, &mut state, window_id)
    }

    /// Flush unresolved windows and freeze the dataset
    ///
    /// The first call emits, when `flush_partial_window` is set, the cursor
    /// window flagged as partial: its successor was never observed. After an
    /// `update`-only advance the window before the cursor is still waiting on
    /// the cursor window too, and is flushed the same way. Later calls emit
    /// nothing and return the same dataset.
    pub fn finalize(&self) -> Dataset {
        let mut state = self.lock();
        if let Some(dataset) = &state.finalized {
            return dataset.clone();
        }

        let history_length = self.config.history_length;
        if let Some(cursor) = state.cursor {
            if self.config.flush_partial_window {
                for w in state.next_emit..=cursor {
                    state.emit(w, history_length, true);
                }
            }
            state.next_emit = cursor.saturating_add(1);
        }

        let dataset = reconcile(&state.features, &state.labels);
        let summary = dataset.summary();
        tracing::info!(
            windows = summary.windows,
            with_faults = summary.windows_with_faults,
            positive = summary.positive_labels,
            partial = summary.partial_labels,
            stale = state.diagnostics.stale,
            "window tracker finalized"
        );
        state.finalized = Some(dataset.clone());
        dataset
    }

    /// Snapshot of the examples emitted so far
    pub fn dataset(&self) -> Dataset {
        let state = self.lock();
        match &state.finalized {
            Some(dataset) => dataset.clone(),
            None => reconcile(&state.features, &state.labels),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        let state = self.lock();
        if state.finalized.is_some() {
            return TrackerPhase::Finalized;
        }
        match state.cursor {
            Some(cursor) if cursor > self.config.history_length as u64 => TrackerPhase::Active,
            _ => TrackerPhase::BelowHistory,
        }
    }

    /// Newest window that has received a fault
    pub fn current_window(&self) -> Option<u64> {
        self.lock().cursor
    }

    /// Fault count of `window_id` so far (0 if never seen)
    pub fn window_count(&self, window_id: u64) -> u64 {
        self.lock().count(window_id)
    }

    pub fn diagnostics(&self) -> TrackerDiagnostics {
        self.lock().diagnostics
    }
}
