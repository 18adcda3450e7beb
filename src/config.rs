use std::env;

use thiserror::Error;

pub const DEFAULT_SERVER_NAME: &str = "memoh-mcp";
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub server_version: String,
    pub max_frame_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MCP_SERVER_NAME must not be empty")]
    EmptyServerName,
    #[error("MCP_SERVER_VERSION must not be empty")]
    EmptyServerVersion,
    #[error("MCP_MAX_FRAME_BYTES must be a positive integer")]
    InvalidMaxFrameBytes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_name = match env::var("MCP_SERVER_NAME") {
            Ok(value) => non_empty(value).ok_or(ConfigError::EmptyServerName)?,
            Err(_) => DEFAULT_SERVER_NAME.to_string(),
        };

        let server_version = match env::var("MCP_SERVER_VERSION") {
            Ok(value) => non_empty(value).ok_or(ConfigError::EmptyServerVersion)?,
            Err(_) => env!("CARGO_PKG_VERSION").to_string(),
        };

        let max_frame_bytes = env::var("MCP_MAX_FRAME_BYTES")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|limit| *limit > 0)
                    .ok_or(ConfigError::InvalidMaxFrameBytes)
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        Ok(Self {
            server_name,
            server_version,
            max_frame_bytes,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    Some(value.trim().to_string()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Tests in this module mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var("MCP_SERVER_NAME");
        env::remove_var("MCP_SERVER_VERSION");
        env::remove_var("MCP_MAX_FRAME_BYTES");
    }

    #[test]
    fn parse_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();

        let config = Config::from_env().expect("config should parse");
        assert_eq!(config.server_name, DEFAULT_SERVER_NAME);
        assert_eq!(config.server_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn overrides_are_trimmed() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("MCP_SERVER_NAME", "  memoh  ");
        env::set_var("MCP_SERVER_VERSION", "1.2.3");
        env::set_var("MCP_MAX_FRAME_BYTES", "4096");

        let config = Config::from_env().expect("config should parse");
        assert_eq!(config.server_name, "memoh");
        assert_eq!(config.server_version, "1.2.3");
        assert_eq!(config.max_frame_bytes, 4096);
        clear_env();
    }

    #[test]
    fn empty_server_name_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("MCP_SERVER_NAME", "   ");

        let err = Config::from_env().expect_err("expected empty name error");
        assert!(matches!(err, ConfigError::EmptyServerName));
        clear_env();
    }

    #[test]
    fn zero_frame_limit_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("MCP_MAX_FRAME_BYTES", "0");

        let err = Config::from_env().expect_err("expected invalid frame limit");
        assert!(matches!(err, ConfigError::InvalidMaxFrameBytes));
        clear_env();
    }

    #[test]
    fn non_numeric_frame_limit_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("MCP_MAX_FRAME_BYTES", "lots");

        let err = Config::from_env().expect_err("expected invalid frame limit");
        assert!(matches!(err, ConfigError::InvalidMaxFrameBytes));
        clear_env();
    }
}
