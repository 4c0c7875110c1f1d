//! Tracing setup shared by every binary of the workspace.

/// Initialize process-wide tracing from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(subscriber::LogSettings::from_env());
}

/// Subscriber configuration (format, filter).
pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};
