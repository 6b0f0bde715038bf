#![deny(missing_docs)]
//! Shared logging utilities for the progress monitor workspace.
//!
//! This crate provides the `monitor_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every macro accepts an
//! optional leading `session: <id>,` argument that prefixes the line with the
//! session it belongs to, so interleaved sessions stay readable in one log.

#[doc(hidden)]
pub use log as __log;

/// Log target shared by every record emitted through the `monitor_*` macros.
pub const LOG_TARGET: &str = "progress_monitor";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! monitor_trace {
    (session: $session:expr, $($arg:tt)*) => {{
        $crate::__log::trace!(target: $crate::LOG_TARGET, "[{}] {}", $session, format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::trace!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! monitor_debug {
    (session: $session:expr, $($arg:tt)*) => {{
        $crate::__log::debug!(target: $crate::LOG_TARGET, "[{}] {}", $session, format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::debug!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! monitor_info {
    (session: $session:expr, $($arg:tt)*) => {{
        $crate::__log::info!(target: $crate::LOG_TARGET, "[{}] {}", $session, format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::info!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! monitor_warn {
    (session: $session:expr, $($arg:tt)*) => {{
        $crate::__log::warn!(target: $crate::LOG_TARGET, "[{}] {}", $session, format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::warn!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! monitor_error {
    (session: $session:expr, $($arg:tt)*) => {{
        $crate::__log::error!(target: $crate::LOG_TARGET, "[{}] {}", $session, format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::error!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Keep dependency chatter (hyper, wiremock) out of test output.
    let config = ConfigBuilder::new()
        .add_filter_allow_str(LOG_TARGET)
        .build();

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
