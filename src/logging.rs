//! Logger setup for the command line tool.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Installs the stderr logger. `RUST_LOG` wins over `level` when set.
///
/// The returned handle must stay alive for as long as logging is needed.
pub fn setup_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level)?
        .log_to_stderr()
        .start()
}
