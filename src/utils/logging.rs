//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Modules that want to silence their own chatter without touching the
//! global filter define the flag and use the crate-root macros:
//! ```rust
//! const ENABLE_LOGS: bool = true;
//!
//! use mindlens::{log_info, log_warn};
//!
//! log_info!("capture uploaded");
//! ```

/// Info-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Debug-level logging for per-tick chatter, gated the same way.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
