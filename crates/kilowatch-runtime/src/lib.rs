//! Process runtime for the kilowatch exporter
//!
//! The exposition HTTP server and the shutdown plumbing that ties the
//! collector loop, the server, and OS signals together.

#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod server;
pub mod shutdown;

pub use server::ExpositionServer;
pub use shutdown::{ShutdownSignal, SignalHandler};
