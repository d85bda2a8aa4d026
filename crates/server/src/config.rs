//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Operator transport authentication. Token issuance lives with the
    // external auth collaborator; this server only checks presented tokens.
    pub operator_token: String,

    // Limits
    pub max_message_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:4000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:4000".to_string()),

            operator_token: {
                let token = env::var("OPERATOR_TOKEN")
                    .map_err(|_| ConfigError::Missing("OPERATOR_TOKEN"))?;
                if token.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "OPERATOR_TOKEN must be at least 32 characters",
                    ));
                }
                token
            },

            max_message_bytes: env::var("MAX_MESSAGE_BYTES")
                .unwrap_or_else(|_| "16384".to_string())
                .parse()
                .unwrap_or(16384),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
