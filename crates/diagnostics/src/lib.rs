//! Logging shared by the gap-fill crates
//!
//! Levels are chosen with the TSFILL_LOG environment variable:
//! - `off` (default): nothing is emitted
//! - `error`, `warn`, `info`: progressively more operational detail
//! - `debug`: per-batch and per-page detail from the fill operator

use std::sync::Once;

pub use emit;

/// Environment variable that selects the log level
pub const LOG_ENV: &str = "TSFILL_LOG";

static INIT: Once = Once::new();

/// Parsed TSFILL_LOG setting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Level(emit::Level),
    /// Unrecognized value; logs at info
    Unknown,
}

impl LogSetting {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "off" => LogSetting::Off,
            "debug" => LogSetting::Level(emit::Level::Debug),
            "info" => LogSetting::Level(emit::Level::Info),
            "warn" => LogSetting::Level(emit::Level::Warn),
            "error" => LogSetting::Level(emit::Level::Error),
            _ => LogSetting::Unknown,
        }
    }
}

/// Initialize diagnostics from TSFILL_LOG
///
/// Only the first call has any effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let raw = std::env::var(LOG_ENV).unwrap_or_default();
        let level = match LogSetting::parse(&raw) {
            LogSetting::Off => return,
            LogSetting::Level(level) => level,
            LogSetting::Unknown => {
                // Emitter is not running yet
                eprintln!("Warning: Unknown {LOG_ENV} value '{raw}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // Runtime lives for the rest of the process
        std::mem::forget(rt);
    });
}

/// Operations a user running the tool may want to see
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Detailed processing steps: batch sizes, page boundaries, plans
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Recoverable conditions, such as a frequency token falling back to daily
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures that stop a fill
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
