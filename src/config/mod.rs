//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::net::protocol::Will;
use crate::util::time::Timings;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Seed for starting-slot sampling; entropy when absent
    pub world_seed: Option<u64>,
    pub timings: Timings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:4321".to_string());

        let world_seed = match var("WORLD_SEED") {
            Some(seed) => Some(seed.parse().map_err(|_| ConfigError::InvalidSeed(seed))?),
            None => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("SERVER_ADDR"))?,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            world_seed,
            timings: Timings::default(),
        })
    }
}

/// Robot client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Address of the arena server
    pub server_addr: SocketAddr,
    /// Local address to bind
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Display name; the client identity is used when absent
    pub nick: Option<String>,
    pub want: Will,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let want = match var("WANT") {
            Some(want) => Will::parse(&want).ok_or(ConfigError::InvalidWant(want))?,
            None => Will::Play,
        };

        Ok(Self {
            server_addr: var("SERVER_ADDR")
                .unwrap_or_else(|| "127.0.0.1:4321".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("SERVER_ADDR"))?,
            bind_addr: var("CLIENT_ADDR")
                .unwrap_or_else(|| "0.0.0.0:0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("CLIENT_ADDR"))?,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            nick: var("NICK").filter(|nick| !nick.is_empty()),
            want,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid socket address in {0}")]
    InvalidAddress(&'static str),

    #[error("WORLD_SEED must be an unsigned integer, got {0:?}")]
    InvalidSeed(String),

    #[error("WANT must be \"play\" or \"spectate\", got {0:?}")]
    InvalidWant(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_server_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:4321".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.world_seed, None);
        assert_eq!(config.timings, Timings::default());
    }

    #[test]
    fn test_server_overrides_and_errors() {
        let config =
            Config::from_lookup(lookup(&[("SERVER_ADDR", "127.0.0.1:9000"), ("WORLD_SEED", "17")]))
                .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
        assert_eq!(config.world_seed, Some(17));

        assert!(matches!(
            Config::from_lookup(lookup(&[("SERVER_ADDR", "nowhere")])),
            Err(ConfigError::InvalidAddress("SERVER_ADDR"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("WORLD_SEED", "-1")])),
            Err(ConfigError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_client_config() {
        let config =
            ClientConfig::from_lookup(lookup(&[("NICK", ""), ("WANT", "spectate")])).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:4321".parse::<SocketAddr>().unwrap());
        assert_eq!(config.nick, None);
        assert_eq!(config.want, Will::Spectate);

        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("WANT", "cheer")])),
            Err(ConfigError::InvalidWant(_))
        ));
    }
}
