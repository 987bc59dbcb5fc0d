//! Application configuration loaded from environment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP/WebSocket server port
    pub server_port: u16,
    /// Directory served as the static front-end
    pub web_dir: PathBuf,
    /// Directory for snapshots and locks
    pub data_dir: PathBuf,

    /// Session TTL; refreshed on every authenticated RPC
    pub session_timeout: Duration,
    /// Log filter when RUST_LOG is unset
    pub log_level: String,
    /// Dev mode pins the bootstrap seed for reproducible worlds
    pub enable_dev_mode: bool,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Per-request handler deadline
    pub request_timeout: Duration,
    /// First-run bootstrap deadline
    pub bootstrap_timeout: Duration,
    /// Total graceful-shutdown budget; exceeded = forced exit
    pub shutdown_timeout: Duration,
    /// Pause after closing the listener before the final snapshot
    pub shutdown_grace_period: Duration,
}

/// Snapshot persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub auto_save_interval: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            web_dir: PathBuf::from(env::var("WEB_DIR").unwrap_or_else(|_| "./web".to_string())),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),

            session_timeout: duration_var("SESSION_TIMEOUT", Duration::from_secs(30 * 60))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            enable_dev_mode: bool_var("ENABLE_DEV_MODE", true)?,

            persistence: PersistenceConfig {
                enabled: bool_var("ENABLE_PERSISTENCE", true)?,
                auto_save_interval: duration_var("AUTO_SAVE_INTERVAL", Duration::from_secs(30))?,
            },

            request_timeout: duration_var("REQUEST_TIMEOUT", Duration::from_secs(10))?,
            bootstrap_timeout: duration_var("BOOTSTRAP_TIMEOUT", Duration::from_secs(60))?,
            shutdown_timeout: duration_var("SHUTDOWN_TIMEOUT", Duration::from_secs(30))?,
            shutdown_grace_period: duration_var("SHUTDOWN_GRACE_PERIOD", Duration::from_secs(1))?,
        })
    }

    /// Snapshot file location inside the data dir.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("world.json")
    }

    /// Session sweeper cadence: timeout/10 bounded to [1s, 60s].
    pub fn sweep_interval(&self) -> Duration {
        (self.session_timeout / 10)
            .clamp(Duration::from_secs(1), Duration::from_secs(60))
    }
}

fn bool_var(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{key} must be a boolean, got '{other}'"),
        },
    }
}

fn duration_var(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            parse_duration(&raw).with_context(|| format!("{key} must be a duration like '30s' or '10m'"))
        }
    }
}

/// Parse "90", "90s", "30m", or "2h" into a duration.
fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (number, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    let value: u64 = number.parse().context("duration needs a leading number")?;
    let seconds = match unit.trim() {
        "s" | "" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => anyhow::bail!("unknown duration unit '{other}'"),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45").expect("parses"), Duration::from_secs(45));
        assert_eq!(parse_duration("45s").expect("parses"), Duration::from_secs(45));
        assert_eq!(parse_duration("30m").expect("parses"), Duration::from_secs(1800));
        assert_eq!(parse_duration("2h").expect("parses"), Duration::from_secs(7200));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_sweep_interval_bounds() {
        let mut config = AppConfig {
            server_port: 8080,
            web_dir: PathBuf::from("./web"),
            data_dir: PathBuf::from("./data"),
            session_timeout: Duration::from_secs(1800),
            log_level: "info".into(),
            enable_dev_mode: true,
            persistence: PersistenceConfig {
                enabled: true,
                auto_save_interval: Duration::from_secs(30),
            },
            request_timeout: Duration::from_secs(10),
            bootstrap_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            shutdown_grace_period: Duration::from_secs(1),
        };
        // 1800s / 10 = 180s, clamped to 60s
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));

        config.session_timeout = Duration::from_secs(5);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));

        config.session_timeout = Duration::from_secs(100);
        assert_eq!(config.sweep_interval(), Duration::from_secs(10));
    }
}
