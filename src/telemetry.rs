use tracing_subscriber::EnvFilter;

use crate::error::{RentbookError, Result};

/// Builds the log filter: `RUST_LOG` wins, otherwise the configured level.
pub fn filter_for(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            RentbookError::Telemetry(format!("invalid log level/filter '{level}': {e}"))
        }),
    }
}

/// Installs a compact stderr subscriber. Stdout stays reserved for command output.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level)?)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| RentbookError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_levels_and_directives() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter_for("warn").is_ok());
        assert!(filter_for("rentbook=debug,info").is_ok());
    }

    #[test]
    fn test_rejects_garbage_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(filter_for("rentbook=loud"), Err(RentbookError::Telemetry(_))));
    }
}
