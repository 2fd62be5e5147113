// Worker configuration from the environment
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Loaded once at startup; never re-read.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator WebSocket URL
    pub server_url: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = std::env::var("SERVER_URL")
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("SERVER_URL"))?;

        Ok(Self { server_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both outcomes in one test; parallel tests must not race on the
    // process environment.
    #[test]
    fn test_from_env() {
        std::env::set_var("SERVER_URL", "ws://127.0.0.1:8765");
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.server_url, "ws://127.0.0.1:8765");

        std::env::remove_var("SERVER_URL");
        assert!(matches!(
            WorkerConfig::from_env(),
            Err(ConfigError::Missing("SERVER_URL"))
        ));
    }
}
