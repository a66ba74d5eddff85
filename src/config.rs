//! Process configuration, read from the environment (and `.env`).

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("invalid public key: {0}")]
    PublicKey(String),
}

/// Everything the router and REST client need at construction.
#[derive(Clone)]
pub struct Config {
    pub application_id: String,
    /// Hex-encoded Ed25519 public key from the developer portal.
    pub public_key: String,
    pub token: String,
    /// Overwrite the global command set with the registered definitions
    /// before serving.
    pub clear_on_start: bool,
    pub address: String,
    pub port: u16,
}

impl Config {
    /// Load from `DISCORD_APPLICATION_ID`, `DISCORD_PUBLIC_KEY`,
    /// `DISCORD_TOKEN`, `CLEAR_ON_START`, `LISTEN_ADDRESS` and `PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "PORT",
                    reason: e.to_string(),
                }
            })?,
            None => 3000,
        };

        Ok(Self {
            application_id: required("DISCORD_APPLICATION_ID")?,
            public_key: required("DISCORD_PUBLIC_KEY")?,
            token: required("DISCORD_TOKEN")?,
            clear_on_start: lookup("CLEAR_ON_START").is_some_and(|v| is_truthy(&v)),
            address: lookup("LISTEN_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = if self.address == "localhost" {
            "127.0.0.1"
        } else {
            self.address.as_str()
        };
        format!("{}:{}", host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "LISTEN_ADDRESS",
                reason: e.to_string(),
            })
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("application_id", &self.application_id)
            .field("public_key", &self.public_key)
            .field("token", &"<redacted>")
            .field("clear_on_start", &self.clear_on_start)
            .field("address", &self.address)
            .field("port", &self.port)
            .finish()
    }
}
