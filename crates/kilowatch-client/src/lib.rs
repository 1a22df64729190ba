//! Redfish device client for the kilowatch exporter
//!
//! Fetches outlet and sensor payloads over HTTPS with Basic auth, bounded
//! retries, and an optional shared admission gate, then extracts typed
//! readings from whatever subset of the schema the firmware provides.

#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod client;
pub mod extract;
pub mod poller;

pub use client::{ClientConfig, DeviceClient, FetchOutcome};
pub use poller::{outlet_url, sensor_url, DevicePoller, RedfishPoller};
