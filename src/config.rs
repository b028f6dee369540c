use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub clock: ClockConfig,
    pub wishlist: WishlistConfig,
    pub scheduler: SchedulerConfig,
    pub messaging: MessagingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// IANA name of the single reference timezone used on both the add path
    /// and the scan path. Read from `APP_TIMEZONE`.
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistConfig {
    /// How long an offer stays valid after it is saved (`expiry = now + window`).
    pub offer_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the expiry scheduler is started at all.
    pub enabled: bool,
    /// Period between two scans of the pending entries.
    pub scan_interval_seconds: u64,
    /// Trailing duration before expiry during which a notification is sent.
    pub notify_window_seconds: u64,
    /// Upper bound on a single notification send.
    pub send_timeout_seconds: u64,
    /// Upper bound on a single store or user-directory call.
    pub store_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub twilio_api_base: String,
    /// International prefix prepended to local subscriber numbers (e.g. `+91`).
    pub country_code: String,
    /// `whatsapp` or `sms`.
    pub channel: String,
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn notify_window(&self) -> Duration {
        Duration::from_secs(self.notify_window_seconds)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds)
    }
}

impl WishlistConfig {
    pub fn offer_window(&self) -> Duration {
        Duration::from_secs(self.offer_window_seconds)
    }
}

impl ClockConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.timezone)
            .map_err(|_| ConfigError::InvalidValue("APP_TIMEZONE".to_string()))
    }
}

impl MessagingConfig {
    /// Twilio credentials, only when all three parts are present and non-empty.
    pub fn twilio_credentials(&self) -> Option<(&str, &str, &str)> {
        let sid = self.twilio_account_sid.as_deref().filter(|s| !s.is_empty())?;
        let token = self.twilio_auth_token.as_deref().filter(|s| !s.is_empty())?;
        let from = self.twilio_from_number.as_deref().filter(|s| !s.is_empty())?;
        Some((sid, token, from))
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: parse_env("PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_env(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            clock: ClockConfig {
                timezone: env::var("APP_TIMEZONE").unwrap_or(defaults.clock.timezone),
            },
            wishlist: WishlistConfig {
                offer_window_seconds: parse_env(
                    "OFFER_WINDOW_SECONDS",
                    defaults.wishlist.offer_window_seconds,
                )?,
            },
            scheduler: SchedulerConfig {
                enabled: parse_bool_env("SCHEDULER_ENABLED", defaults.scheduler.enabled),
                scan_interval_seconds: parse_env(
                    "SCHEDULER_SCAN_INTERVAL_SECONDS",
                    defaults.scheduler.scan_interval_seconds,
                )?,
                notify_window_seconds: parse_env(
                    "SCHEDULER_NOTIFY_WINDOW_SECONDS",
                    defaults.scheduler.notify_window_seconds,
                )?,
                send_timeout_seconds: parse_env(
                    "SCHEDULER_SEND_TIMEOUT_SECONDS",
                    defaults.scheduler.send_timeout_seconds,
                )?,
                store_timeout_seconds: parse_env(
                    "SCHEDULER_STORE_TIMEOUT_SECONDS",
                    defaults.scheduler.store_timeout_seconds,
                )?,
            },
            messaging: MessagingConfig {
                twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
                twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
                twilio_from_number: env::var("TWILIO_FROM_NUMBER").ok(),
                twilio_api_base: env::var("TWILIO_API_BASE")
                    .unwrap_or(defaults.messaging.twilio_api_base),
                country_code: env::var("NOTIFY_COUNTRY_CODE")
                    .unwrap_or(defaults.messaging.country_code),
                channel: env::var("NOTIFY_CHANNEL").unwrap_or(defaults.messaging.channel),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the scheduler spin or never fire.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.tz()?;

        if self.scheduler.scan_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_SCAN_INTERVAL_SECONDS".to_string(),
            ));
        }
        if self.scheduler.notify_window_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_NOTIFY_WINDOW_SECONDS".to_string(),
            ));
        }
        if self.wishlist.offer_window_seconds == 0 {
            return Err(ConfigError::InvalidValue("OFFER_WINDOW_SECONDS".to_string()));
        }
        match self.messaging.channel.as_str() {
            "whatsapp" | "sms" => {}
            _ => return Err(ConfigError::InvalidValue("NOTIFY_CHANNEL".to_string())),
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/offers.db".to_string(),
                max_connections: 5,
            },
            clock: ClockConfig {
                timezone: "Asia/Kolkata".to_string(),
            },
            wishlist: WishlistConfig {
                offer_window_seconds: 300,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                scan_interval_seconds: 60,
                notify_window_seconds: 300,
                send_timeout_seconds: 10,
                store_timeout_seconds: 5,
            },
            messaging: MessagingConfig {
                twilio_account_sid: None,
                twilio_auth_token: None,
                twilio_from_number: None,
                twilio_api_base: "https://api.twilio.com".to_string(),
                country_code: "+91".to_string(),
                channel: "whatsapp".to_string(),
            },
        }
    }
}
