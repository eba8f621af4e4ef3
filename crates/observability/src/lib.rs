//! Process-wide tracing/logging setup.

/// Log output configuration.
pub mod logging;

pub use logging::{LogConfig, LogFormat};

/// Initialize process-wide logging with [`LogConfig::from_env`].
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init(&LogConfig::from_env());
}
