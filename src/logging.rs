use tracing::warn;
use tracing_subscriber::{filter::ParseError, fmt, EnvFilter};

use crate::{config::DEFAULT_LOG_LEVEL, Config, DigitizerError, Result};

/// Parses the `DIGITIZER_LOG` directive. A bad directive yields the default
/// filter plus the parse error so it can be reported once logging is up.
pub fn log_filter(directive: &str) -> (EnvFilter, Option<ParseError>) {
    match EnvFilter::try_new(directive) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new(DEFAULT_LOG_LEVEL), Some(err)),
    }
}

/// Installs the process-wide subscriber for the digitizer service.
pub fn init_tracing(config: &Config) -> Result<()> {
    let (filter, rejected) = log_filter(&config.log_level);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| {
            DigitizerError::Configuration(format!("logging was already initialised: {err}"))
        })?;

    if let Some(err) = rejected {
        warn!(
            directive = %config.log_level,
            error = %err,
            "ignoring DIGITIZER_LOG, logging at {DEFAULT_LOG_LEVEL}"
        );
    }
    Ok(())
}
