//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Session client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard backend base URL
    pub api_url: String,

    /// Durable credential file
    pub session_file: PathBuf,

    /// Upper bound for every remote call
    pub request_timeout: Duration,

    /// Proactive refresh period
    pub refresh_interval: Duration,

    /// Heartbeat period
    pub heartbeat_interval: Duration,

    /// Keep stored credentials when the backend is unreachable at bootstrap
    pub keep_credentials_offline: bool,

    /// Login email for non-interactive use (optional)
    pub email: Option<String>,

    /// Login password for non-interactive use (optional)
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            session_file: default_session_file(),
            request_timeout: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(600),
            heartbeat_interval: Duration::from_secs(120),
            keep_credentials_offline: false,
            email: None,
            password: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_url = std::env::var("DASHBOARD_API_URL").unwrap_or(defaults.api_url);

        let session_file = std::env::var("DASHBOARD_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_file);

        let request_timeout = env_secs("DASHBOARD_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout);

        let refresh_interval = env_secs("DASHBOARD_REFRESH_INTERVAL_SECS")?
            .unwrap_or(defaults.refresh_interval);

        let heartbeat_interval = env_secs("DASHBOARD_HEARTBEAT_INTERVAL_SECS")?
            .unwrap_or(defaults.heartbeat_interval);

        let keep_credentials_offline = std::env::var("DASHBOARD_KEEP_CREDENTIALS_OFFLINE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let email = std::env::var("DASHBOARD_EMAIL").ok();
        let password = std::env::var("DASHBOARD_PASSWORD").ok();

        let config = Self {
            api_url,
            session_file,
            request_timeout,
            refresh_interval,
            heartbeat_interval,
            keep_credentials_offline,
            email,
            password,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler and transport cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            anyhow::bail!("DASHBOARD_API_URL must start with http:// or https://");
        }
        for (name, value) in [
            ("request timeout", self.request_timeout),
            ("refresh interval", self.refresh_interval),
            ("heartbeat interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(value) => {
            let secs: u64 = value
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", name))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

fn default_session_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plc-dashboard")
        .join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.refresh_interval, Duration::from_secs(600));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(120));
        assert!(config.session_file.ends_with("plc-dashboard/session.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config {
            api_url: "localhost:8080".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
