//! Shared logging setup and log-emission helpers.

pub mod report;
pub mod telemetry;

pub use report::log_recovery_report;
pub use telemetry::{LogFormat, init, init_with_format};
