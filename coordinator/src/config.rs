// Coordinator configuration from the environment
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Immutable process-wide configuration, loaded once at startup and passed
/// by reference; never re-read at runtime.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Node JSON-RPC endpoint
    pub rpc_url: String,

    /// HTTP Basic auth credentials for the node
    pub rpc_user: String,
    pub rpc_pass: String,

    /// Address the coinbase reward is paid to
    pub miner_address: String,

    /// Operator notification credentials; absent means notifications are
    /// silently skipped
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: String,
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram = match (env_opt("TELEGRAM_BOT_TOKEN"), env_opt("TELEGRAM_CHANNEL_ID")) {
            (Some(bot_token), Some(channel_id)) => Some(TelegramConfig {
                bot_token,
                channel_id,
            }),
            _ => None,
        };

        Ok(Self {
            rpc_url: require("RPC_URL")?,
            rpc_user: require("RPC_USER")?,
            rpc_pass: require("RPC_PASS")?,
            miner_address: require("MINER_PUBLIC_KEY")?,
            telegram,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env_opt(name).ok_or(ConfigError::Missing(name))
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test covering both outcomes; parallel tests must not race on the
    // process environment.
    #[test]
    fn test_from_env() {
        std::env::set_var("RPC_URL", "http://127.0.0.1:18443");
        std::env::set_var("RPC_USER", "user");
        std::env::set_var("RPC_PASS", "pass");
        std::env::set_var("MINER_PUBLIC_KEY", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
        std::env::remove_var("TELEGRAM_BOT_TOKEN");
        std::env::remove_var("TELEGRAM_CHANNEL_ID");

        let config = CoordinatorConfig::from_env().unwrap();
        assert_eq!(config.rpc_url, "http://127.0.0.1:18443");
        assert!(config.telegram.is_none());

        std::env::set_var("TELEGRAM_BOT_TOKEN", "token");
        std::env::set_var("TELEGRAM_CHANNEL_ID", "-100");
        let config = CoordinatorConfig::from_env().unwrap();
        assert!(config.telegram.is_some());

        std::env::remove_var("RPC_USER");
        let missing = CoordinatorConfig::from_env();
        assert!(matches!(missing, Err(ConfigError::Missing("RPC_USER"))));

        std::env::set_var("RPC_USER", "user");
    }
}
