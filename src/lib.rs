//! Faultcast - page-fault datasets for predictive memory management
//!
//! Two dataset builders share the same event vocabulary:
//!
//! - **Windowed prediction**: fault events are bucketed into fixed time
//!   windows; each completed window yields rolling history features and a
//!   lookahead label saying whether the next window faulted
//!   ([`window::WindowTracker`], [`dataset::Dataset`]).
//! - **Page statistics**: perf-script samples are mapped onto the pages of a
//!   traced region, aggregated per page and labeled as huge-page promotion
//!   candidates ([`page_stats::PageStatParser`]).
//!
//! Events arrive from an external tracer through [`source::EventSink`]; the
//! [`source::Collector`] owns delivery on a dedicated thread and finalizes the
//! tracker exactly once on shutdown.

pub mod config;
pub mod dataset;
pub mod event;
pub mod logging;
pub mod mapper;
pub mod output;
pub mod page_stats;
pub mod perf_script;
pub mod pipeline;
pub mod source;
pub mod window;
