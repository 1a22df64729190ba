//! # Kilowatch Core
//!
//! Core types and error handling for the kilowatch exporter.
//!
//! This crate provides the foundational pieces used throughout the exporter:
//! - Target, credential, and reading types
//! - Poll outcome classification
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Credentials, OutletReading, PollOutcome, Sample, SensorReading, SubResource, Target,
    TargetKind,
};
