//! Logging setup for ai-cfo binaries and tests.
//!
//! Everything in the workspace logs through the `tracing` facade; this crate
//! installs the global subscriber, either human-readable or as JSON lines.

pub mod logging;
