use crate::constants::*;
use std::env;
use time::UtcOffset;
use time::macros::format_description;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub session_secret: String,
    pub utc_offset: UtcOffset,
    pub cors_origin: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSessionSecret,
    InvalidSessionSecret(String),
    InvalidPort(String),
    InvalidUtcOffset(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingSessionSecret => {
                write!(f, "SESSION_SECRET environment variable is required")
            }
            ConfigError::InvalidSessionSecret(msg) => {
                write!(f, "Invalid session secret: {}", msg)
            }
            ConfigError::InvalidPort(port) => {
                write!(f, "Invalid port number: {}", port)
            }
            ConfigError::InvalidUtcOffset(offset) => {
                write!(f, "Invalid UTC offset (expected +HH:MM): {}", offset)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("SERVER_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let data_path = env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());
        let offset = env::var("UTC_OFFSET").unwrap_or_else(|_| DEFAULT_UTC_OFFSET.to_string());
        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|o| !o.trim().is_empty());

        if port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidPort(port));
        }

        let utc_offset =
            parse_utc_offset(&offset).ok_or_else(|| ConfigError::InvalidUtcOffset(offset))?;

        let session_secret =
            env::var("SESSION_SECRET").map_err(|_| ConfigError::MissingSessionSecret)?;

        if session_secret.len() < MIN_SESSION_SECRET_LENGTH {
            return Err(ConfigError::InvalidSessionSecret(format!(
                "must be at least {} bytes long",
                MIN_SESSION_SECRET_LENGTH
            )));
        }

        Ok(Config {
            host,
            port,
            data_path,
            session_secret,
            utc_offset,
            cors_origin,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_utc_offset(value: &str) -> Option<UtcOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") {
        return Some(UtcOffset::UTC);
    }
    UtcOffset::parse(
        value,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .ok()
}
