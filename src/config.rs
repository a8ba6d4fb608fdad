use std::env;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;

/// Runtime configuration loaded once from the environment.
///
/// `TELEGRAM_TOKEN` and `TELEGRAM_CHANNEL_ID` are required; everything else
/// has a default. `MAKE_WEBHOOK_URL` left empty disables the automation POST
/// entirely.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub channel_id: String,
    pub make_webhook_url: String,
    pub port: u16,
    pub media_group_window_seconds: u64,
    pub finalized_group_ttl_seconds: u64,
    pub automation_rich_payload: bool,
    pub relay_queue_capacity: usize,
    pub relay_submit_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Result<Self> {
        let bot_token = env::var("TELEGRAM_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("TELEGRAM_TOKEN is required"));
        }

        let channel_id = env::var("TELEGRAM_CHANNEL_ID").unwrap_or_default();
        if channel_id.trim().is_empty() {
            return Err(anyhow::anyhow!("TELEGRAM_CHANNEL_ID is required"));
        }

        Ok(Config {
            bot_token,
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            channel_id,
            make_webhook_url: env_string("MAKE_WEBHOOK_URL", ""),
            port: env_u16("PORT", 5000),
            media_group_window_seconds: env_u64("MEDIA_GROUP_WINDOW_SECONDS", 2),
            finalized_group_ttl_seconds: env_u64("FINALIZED_GROUP_TTL_SECONDS", 60),
            automation_rich_payload: env_bool("AUTOMATION_RICH_PAYLOAD", false),
            relay_queue_capacity: env_usize("RELAY_QUEUE_CAPACITY", 64).max(1),
            relay_submit_timeout_seconds: env_u64("RELAY_SUBMIT_TIMEOUT_SECONDS", 10).max(1),
        })
    }

    /// Quiescence window measured from the first event of a media group.
    pub fn media_group_window(&self) -> Duration {
        Duration::from_secs(self.media_group_window_seconds)
    }

    /// How long a finalized group id is remembered to absorb stragglers.
    pub fn finalized_group_ttl(&self) -> Duration {
        Duration::from_secs(self.finalized_group_ttl_seconds)
    }

    /// Bounded wait for the HTTP handler's handoff into the relay loop.
    pub fn relay_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_submit_timeout_seconds)
    }
}
