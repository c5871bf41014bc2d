use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::lavalink::backoff::ReconnectPolicy;
use crate::lavalink::LavalinkConfig;
use crate::player::SessionSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Lavalink
    pub lavalink_address: String,
    pub lavalink_password: String,
    pub lavalink_secure: bool,
    pub lavalink_resume_timeout: u64, // En segundos

    // Servidor de archivos
    pub player_hostname: String,
    pub file_server_bind: IpAddr,
    pub file_server_port: u16,
    pub data_dir: PathBuf,

    // Sesiones
    pub auto_leave_delay: u64,    // En segundos
    pub track_cache_grace: u64,   // En segundos
    pub track_cache_cleanup: u64, // En segundos
    pub event_bus_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, applying defaults for unset or
    /// blank variables, and validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,

            lavalink_address: var("LAVALINK_ADDRESS").unwrap_or(defaults.lavalink_address),
            lavalink_password: var("LAVALINK_PASSWORD").unwrap_or(defaults.lavalink_password),
            lavalink_secure: parse_or(var("LAVALINK_SECURE"), "LAVALINK_SECURE", defaults.lavalink_secure)?,
            lavalink_resume_timeout: parse_or(
                var("LAVALINK_RESUME_TIMEOUT"),
                "LAVALINK_RESUME_TIMEOUT",
                defaults.lavalink_resume_timeout,
            )?,

            player_hostname: var("PLAYER_HOSTNAME").unwrap_or(defaults.player_hostname),
            file_server_bind: parse_or(var("FILE_SERVER_BIND"), "FILE_SERVER_BIND", defaults.file_server_bind)?,
            file_server_port: parse_or(var("FILE_SERVER_PORT"), "FILE_SERVER_PORT", defaults.file_server_port)?,
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),

            auto_leave_delay: parse_or(var("AUTO_LEAVE_DELAY"), "AUTO_LEAVE_DELAY", defaults.auto_leave_delay)?,
            track_cache_grace: parse_or(var("TRACK_CACHE_GRACE"), "TRACK_CACHE_GRACE", defaults.track_cache_grace)?,
            track_cache_cleanup: parse_or(
                var("TRACK_CACHE_CLEANUP"),
                "TRACK_CACHE_CLEANUP",
                defaults.track_cache_cleanup,
            )?,
            event_bus_capacity: parse_or(
                var("EVENT_BUS_CAPACITY"),
                "EVENT_BUS_CAPACITY",
                defaults.event_bus_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token and the Lavalink address must not be empty
    /// - The file server port must not be 0, Lavalink needs a fixed URL
    /// - Auto-leave delay, cleanup interval and bus capacity must be > 0
    /// - The player hostname must form a valid URL
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.lavalink_address.trim().is_empty() {
            anyhow::bail!("Lavalink address must not be empty");
        }

        if self.file_server_port == 0 {
            anyhow::bail!("File server port must be fixed, got 0");
        }

        if self.auto_leave_delay == 0 {
            anyhow::bail!("Auto-leave delay must be greater than 0");
        }

        if self.track_cache_cleanup == 0 {
            anyhow::bail!("Track cache cleanup interval must be greater than 0");
        }

        if self.event_bus_capacity == 0 {
            anyhow::bail!("Event bus capacity must be greater than 0");
        }

        self.file_base_url()?;
        Ok(())
    }

    /// Base URL Lavalink uses to reach `/file/<id>`, without trailing slash.
    pub fn file_base_url(&self) -> Result<String> {
        let raw = format!("http://{}:{}", self.player_hostname, self.file_server_port);
        let url = Url::parse(&raw).with_context(|| format!("invalid player hostname '{}'", self.player_hostname))?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn file_server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.file_server_bind, self.file_server_port)
    }

    pub fn lavalink_config(&self) -> LavalinkConfig {
        LavalinkConfig {
            address: self.lavalink_address.clone(),
            password: self.lavalink_password.clone(),
            secure: self.lavalink_secure,
            resume_timeout: self.lavalink_resume_timeout,
            client_name: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            file_base_url: self.file_base_url()?,
            cache_grace: Duration::from_secs(self.track_cache_grace),
            auto_leave_delay: Duration::from_secs(self.auto_leave_delay),
            event_capacity: self.event_bus_capacity,
        })
    }

    pub fn track_cache_cleanup(&self) -> Duration {
        Duration::from_secs(self.track_cache_cleanup)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Secrets (token, Lavalink password) are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Lavalink: {} (secure={}, resume {}s)\n  \
            File server: {} as {}:{} from {}\n  \
            Sessions: auto-leave {}s, cache grace {}s, cleanup every {}s, bus {}",
            self.lavalink_address,
            self.lavalink_secure,
            self.lavalink_resume_timeout,
            self.file_server_addr(),
            self.player_hostname,
            self.file_server_port,
            self.data_dir.display(),
            self.auto_leave_delay,
            self.track_cache_grace,
            self.track_cache_cleanup,
            self.event_bus_capacity,
        )
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{value}'")),
        None => Ok(default),
    }
}

/// The machine's hostname, or `localhost` when it cannot be determined.
fn os_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default, debe proveerse)
            discord_token: String::new(),

            lavalink_address: "localhost:2333".to_string(),
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,
            lavalink_resume_timeout: 60,

            player_hostname: os_hostname(),
            file_server_bind: IpAddr::from([0, 0, 0, 0]),
            file_server_port: 6969,
            data_dir: "data".into(),

            auto_leave_delay: 5,
            track_cache_grace: 30,
            track_cache_cleanup: 300,
            event_bus_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = load(&[("DISCORD_TOKEN", "t"), ("PLAYER_HOSTNAME", "bot-host")]).unwrap();

        assert_eq!(config.lavalink_address, "localhost:2333");
        assert_eq!(config.lavalink_password, "youshallnotpass");
        assert_eq!(config.file_server_port, 6969);
        assert_eq!(config.auto_leave_delay, 5);
        assert_eq!(config.file_base_url().unwrap(), "http://bot-host:6969");
        assert_eq!(config.file_server_addr().to_string(), "0.0.0.0:6969");
    }

    #[test]
    fn missing_token_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn invalid_numbers_and_zero_values_are_rejected() {
        assert!(load(&[("DISCORD_TOKEN", "t"), ("FILE_SERVER_PORT", "abc")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("FILE_SERVER_PORT", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("AUTO_LEAVE_DELAY", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("EVENT_BUS_CAPACITY", "0")]).is_err());
    }

    #[test]
    fn session_settings_follow_the_config() {
        let config = load(&[
            ("DISCORD_TOKEN", "t"),
            ("PLAYER_HOSTNAME", "player"),
            ("FILE_SERVER_PORT", "7000"),
            ("TRACK_CACHE_GRACE", "45"),
        ])
        .unwrap();

        let settings = config.session_settings().unwrap();
        assert_eq!(settings.file_base_url, "http://player:7000");
        assert_eq!(settings.cache_grace, Duration::from_secs(45));
        assert_eq!(settings.auto_leave_delay, Duration::from_secs(5));
    }

    #[test]
    fn summary_hides_secrets() {
        let config = load(&[("DISCORD_TOKEN", "secret-token"), ("LAVALINK_PASSWORD", "pw-123")]).unwrap();
        let summary = config.summary();

        assert!(!summary.contains("secret-token"));
        assert!(!summary.contains("pw-123"));
        assert!(summary.contains("localhost:2333"));
    }
}
