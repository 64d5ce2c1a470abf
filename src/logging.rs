//! Diagnostic logging through `tracing`.
//!
//! Logs go to stderr so they never interleave with the interactive prompts on
//! stdout. `WYCENNIK_LOG` takes an `EnvFilter` directive and overrides the
//! verbosity flag.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{EstimateError, Result};

/// Environment variable holding an explicit filter directive.
pub const LOG_ENV: &str = "WYCENNIK_LOG";

/// Maps the `-v` count onto a level: warnings only by default.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global subscriber.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let default_level = level_for_verbosity(verbosity);
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| EstimateError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(level_for_verbosity(0), Level::WARN);
        assert_eq!(level_for_verbosity(1), Level::INFO);
        assert_eq!(level_for_verbosity(2), Level::DEBUG);
        assert_eq!(level_for_verbosity(7), Level::TRACE);
    }
}
