//! Low-level file and clock helpers shared by kiln crates.
//!
//! Covers atomic replacement of state files (credential store), append-only
//! NDJSON logs with size rotation (telemetry), and unix timestamps.

pub mod atomic_io;
pub mod log_rotation;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use log_rotation::{append_line_with_rotation, LogRotationPolicy};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
