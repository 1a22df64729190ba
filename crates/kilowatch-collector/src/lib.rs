//! Sweep scheduling and circuit breaking for the kilowatch exporter
//!
//! The collector owns the poll loop: every interval it fans one task per
//! (target, sub-resource) pair out through the device poller, skips devices
//! whose breaker is cooling down, and folds every outcome into the shared
//! metric state. No poll failure propagates past the cycle.

#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod breaker;
pub mod sweep;

pub use breaker::{BreakerBoard, BreakerSettings, BreakerSnapshot};
pub use sweep::Collector;
