use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub webhooks: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_return_window_days")]
    pub return_window_days: i64,
    #[serde(default = "default_max_save_attempts")]
    pub max_save_attempts: u32,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            return_window_days: default_return_window_days(),
            max_save_attempts: default_max_save_attempts(),
        }
    }
}

fn default_return_window_days() -> i64 { 7 }
fn default_max_save_attempts() -> u32 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub admin_alert_email: Option<String>,
    pub mail_relay_url: Option<String>,
    #[serde(default = "default_side_effect_timeout_ms")]
    pub side_effect_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl NotificationConfig {
    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_alert_email: None,
            mail_relay_url: None,
            side_effect_timeout_ms: default_side_effect_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_side_effect_timeout_ms() -> u64 { 2000 }
fn default_channel_capacity() -> usize { 64 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub payment_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Rate limiting is skipped when no url is set
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `MERCATO_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("MERCATO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
