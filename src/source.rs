//! Event delivery from a push source into the window tracker
//!
//! The tracer side is an opaque push source: it calls [`EventSink::deliver`]
//! for every event it observes, typically from a polling loop on its own
//! thread. Two sinks are provided:
//!
//! - [`WindowTracker`] itself, shared through an `Arc`; the producer mutates
//!   tracker state directly under the tracker's lock.
//! - [`EventSender`], the producer end of a [`Collector`] channel. A single
//!   consumer thread owns delivery into the tracker.
//!
//! ```text
//! ┌──────────────────────────┐   unbounded channel   ┌──────────────────────┐
//! │ tracer poll loop         │ ────────────────────▶ │ collector thread     │
//! │   sink.deliver(event)    │                       │   tracker.record()   │
//! └──────────────────────────┘   shutdown channel    │   drain, then exit   │
//!                               ────────────────────▶└──────────────────────┘
//!                                                      │ stop(): finalize once
//! ```
//!
//! Stopping the collector drains events already queued, joins the thread and
//! finalizes the tracker exactly once before the dataset is handed out.

use crate::dataset::Dataset;
use crate::event::FaultEvent;
use crate::window::WindowTracker;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receives events pushed by a tracer
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: FaultEvent);
}

impl EventSink for WindowTracker {
    fn deliver(&self, event: FaultEvent) {
        self.record(&event);
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn deliver(&self, event: FaultEvent) {
        (**self).deliver(event);
    }
}

/// Cooperative stop flag for polling sources
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A producer of fault events
pub trait EventSource {
    /// Push events into `sink` until exhausted or `stop` is raised
    ///
    /// Returns the number of events delivered.
    fn run(&mut self, sink: &dyn EventSink, stop: &StopSignal) -> u64;
}

/// Replays a recorded event sequence
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    events: Vec<FaultEvent>,
}

impl ReplaySource {
    pub fn new(events: Vec<FaultEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for ReplaySource {
    fn run(&mut self, sink: &dyn EventSink, stop: &StopSignal) -> u64 {
        let mut delivered = 0;
        for event in self.events.drain(..) {
            if stop.is_stopped() {
                break;
            }
            sink.deliver(event);
            delivered += 1;
        }
        delivered
    }
}

#[derive(Debug, Default)]
struct ChannelCounters {
    sent: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
}

/// Delivery accounting for one collector channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// Events accepted by the channel
    pub sent: u64,
    /// Events the collector thread handed to the tracker
    pub received: u64,
    /// Events refused because the collector thread had exited
    pub rejected: u64,
    /// Accepted but never handed over: still queued, or lost when the
    /// receiver dropped mid-send at shutdown
    pub undelivered: u64,
}

impl ChannelCounters {
    fn snapshot(&self) -> CollectorStats {
        let sent = self.sent.load(Ordering::SeqCst);
        let received = self.received.load(Ordering::SeqCst);
        CollectorStats {
            sent,
            received,
            rejected: self.rejected.load(Ordering::SeqCst),
            undelivered: sent.saturating_sub(received),
        }
    }
}

/// Producer end of a collector channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<FaultEvent>,
    counters: Arc<ChannelCounters>,
}

impl EventSender {
    fn new(tx: Sender<FaultEvent>, counters: Arc<ChannelCounters>) -> Self {
        Self { tx, counters }
    }

    /// Events pushed after the collector thread exited
    pub fn rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CollectorStats {
        self.counters.snapshot()
    }
}

impl EventSink for EventSender {
    fn deliver(&self, event: FaultEvent) {
        // counted before the send so `received` never overtakes `sent`
        self.counters.sent.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            self.counters.sent.fetch_sub(1, Ordering::SeqCst);
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Spawns the consumer thread that owns delivery into a tracker
pub struct Collector;

impl Collector {
    pub fn spawn(tracker: Arc<WindowTracker>) -> CollectorHandle {
        let (event_tx, event_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        let counters = Arc::new(ChannelCounters::default());

        let worker_tracker = Arc::clone(&tracker);
        let worker_counters = Arc::clone(&counters);
        let worker = thread::spawn(move || {
            Self::consume(&worker_tracker, &worker_counters, event_rx, shutdown_rx)
        });

        CollectorHandle {
            tracker,
            sender: EventSender::new(event_tx, counters),
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        }
    }

    /// Blocking receive loop, cancelled by the shutdown channel
    fn consume(
        tracker: &WindowTracker,
        counters: &ChannelCounters,
        events: Receiver<FaultEvent>,
        shutdown: Receiver<()>,
    ) -> u64 {
        let apply = |event: FaultEvent| {
            tracker.record(&event);
            counters.received.fetch_add(1, Ordering::SeqCst);
        };
        loop {
            let running = select! {
                recv(events) -> msg => match msg {
                    Ok(event) => {
                        apply(event);
                        true
                    }
                    // every sender is gone
                    Err(_) => false,
                },
                recv(shutdown) -> _ => {
                    while let Ok(event) = events.try_recv() {
                        apply(event);
                    }
                    false
                }
            };
            if !running {
                break;
            }
        }

        let stats = counters.snapshot();
        if stats.undelivered > 0 {
            tracing::warn!(
                undelivered = stats.undelivered,
                "events sent during collector shutdown were not delivered"
            );
        }
        tracing::debug!(delivered = stats.received, "collector thread exiting");
        stats.received
    }
}

/// Owner of a running collector
///
/// Dropping the handle without calling [`stop`](Self::stop) still shuts the
/// thread down and finalizes the tracker, so the pending window is never lost.
pub struct CollectorHandle {
    tracker: Arc<WindowTracker>,
    sender: EventSender,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<u64>>,
}

impl CollectorHandle {
    /// A new producer handle; clone freely across tracer threads
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn tracker(&self) -> &Arc<WindowTracker> {
        &self.tracker
    }

    pub fn stats(&self) -> CollectorStats {
        self.sender.stats()
    }

    /// Signal shutdown, drain queued events, join and finalize
    pub fn stop(mut self) -> Dataset {
        self.shutdown_worker();
        self.tracker.finalize()
    }

    fn shutdown_worker(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // the worker may already have exited if every sender was dropped
            let _ = shutdown.send(());
        }
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(delivered) => tracing::info!(delivered, "collector stopped"),
                Err(_) => tracing::warn!("collector thread panicked"),
            }
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown_worker();
        self.tracker.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::event::EventType;

    const WINDOW_NS: u64 = 100_000_000;

    fn tracker() -> Arc<WindowTracker> {
        Arc::new(WindowTracker::new(WindowConfig::new(100, 2)).unwrap())
    }

    fn events(windows: &[u64]) -> Vec<FaultEvent> {
        windows
            .iter()
            .map(|&w| FaultEvent::new(w * WINDOW_NS, 0, EventType::Fault, 1))
            .collect()
    }

    #[test]
    fn test_replay_into_tracker_directly() {
        let t = tracker();
        let mut source = ReplaySource::new(events(&[3, 4, 5, 6]));
        let delivered = source.run(&t, &StopSignal::new());
        assert_eq!(delivered, 4);
        assert!(source.is_empty());
        assert_eq!(t.diagnostics().counted, 4);
    }

    #[test]
    fn test_replay_respects_stop_signal() {
        let t = tracker();
        let stop = StopSignal::new();
        stop.stop();
        let mut source = ReplaySource::new(events(&[3, 4]));
        assert_eq!(source.run(&t, &stop), 0);
        assert_eq!(t.diagnostics().counted, 0);
    }

    #[test]
    fn test_collector_stop_flushes_pending_window() {
        let handle = Collector::spawn(tracker());
        let sender = handle.sender();
        for e in events(&[3, 4, 5, 6]) {
            sender.deliver(e);
        }
        let ds = handle.stop();
        let ids: Vec<u64> = ds.features().map(|f| f.window_id).collect();
        // 3, 4 and 5 resolved as faults land, 6 flushed partial
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert!(ds.examples()[3].label.partial);
    }

    #[test]
    fn test_sender_after_stop_is_rejected() {
        let t = tracker();
        let handle = Collector::spawn(Arc::clone(&t));
        let sender = handle.sender();
        drop(handle.stop());

        sender.deliver(FaultEvent::fault(WINDOW_NS, 1));
        assert_eq!(sender.rejected(), 1);
        assert_eq!(t.diagnostics().counted, 0);
        assert_eq!(sender.stats().undelivered, 0);
    }

    #[test]
    fn test_stats_after_clean_stop() {
        let handle = Collector::spawn(tracker());
        let sender = handle.sender();
        for e in events(&[3, 4, 5]) {
            sender.deliver(e);
        }
        drop(handle.stop());
        let stats = sender.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 3);
        assert_eq!(stats.undelivered, 0);
    }

    #[test]
    fn test_event_dropped_with_receiver_is_undelivered() {
        // the receiver goes away holding an event nobody read
        let (tx, rx) = channel::unbounded();
        let sender = EventSender::new(tx, Arc::new(ChannelCounters::default()));
        sender.deliver(FaultEvent::fault(WINDOW_NS, 1));
        drop(rx);
        sender.deliver(FaultEvent::fault(2 * WINDOW_NS, 1));

        let stats = sender.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.undelivered, 1);
    }

    #[test]
    fn test_drop_finalizes_tracker() {
        let t = tracker();
        {
            let handle = Collector::spawn(Arc::clone(&t));
            let sender = handle.sender();
            for e in events(&[3, 4]) {
                sender.deliver(e);
            }
        }
        assert_eq!(t.phase(), crate::window::TrackerPhase::Finalized);
        assert_eq!(t.diagnostics().counted, 2);
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stopped());
        stop.stop();
        assert!(other.is_stopped());
    }
}
