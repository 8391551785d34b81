//! Logging setup

use crate::error::{ShapSelectError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_directive` (e.g. `"shap_select=info"`).
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| ShapSelectError::ConfigError(format!("Invalid log directive: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ShapSelectError::ConfigError(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to another test
        let _ = init_logging("shap_select=debug");
        assert!(init_logging("shap_select=debug").is_err());
    }
}
