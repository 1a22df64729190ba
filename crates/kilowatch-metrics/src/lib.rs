//! Prometheus metric state for the kilowatch exporter
//!
//! Owns the process registry and every metric family the exporter writes.
//! The collector records readings and scrape bookkeeping here; the HTTP
//! exposition layer renders snapshots from it.

#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod registry;

pub use registry::{ExporterMetrics, InFlightGuard};
