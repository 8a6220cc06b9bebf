use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use shared_types::WEBHOOK_PATH;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub calendar_id: String,
    /// Path to the Google service account key JSON file
    pub credentials_path: String,
    /// Public address Google pushes change notifications to
    pub notification_address: String,
    pub light_agent_base_url: String,
    pub bind_addr: SocketAddr,
    /// Zone whose midnight delimits "today"
    pub timezone: Tz,
    pub tick_interval: Duration,
    pub start_cooldown: Duration,
    pub absence_cooldown: Duration,
    /// Minimum spacing between retries of a failed day-rollover sync
    pub resync_retry: Duration,
    pub watch_ttl: Duration,
    pub light_mirek: Option<u16>,
    pub light_brightness: Option<u8>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Missing optional keys
    /// fall back to their defaults; present but unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("NOTIFICATION_CHANNEL_ENDPOINT")
            .context("NOTIFICATION_CHANNEL_ENDPOINT must be set")?;

        Ok(Self {
            calendar_id: lookup("CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
            credentials_path: lookup("GOOGLE_CREDENTIALS_PATH")
                .unwrap_or_else(|| "credentials.json".to_string()),
            notification_address: webhook_address(&endpoint),
            light_agent_base_url: lookup("HUE_AGENT_BASE_URL")
                .context("HUE_AGENT_BASE_URL must be set")?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            timezone: parse_timezone(&lookup)?,
            tick_interval: Duration::from_secs(parse_or(&lookup, "WATCH_INTERVAL_SECS", 1)?),
            start_cooldown: Duration::from_secs(parse_or(&lookup, "START_COOLDOWN_SECS", 60)?),
            absence_cooldown: Duration::from_secs(parse_or(
                &lookup,
                "ABSENCE_COOLDOWN_SECS",
                60,
            )?),
            resync_retry: Duration::from_secs(parse_or(&lookup, "RESYNC_RETRY_SECS", 60)?),
            watch_ttl: Duration::from_secs(parse_or(&lookup, "WATCH_TTL_SECS", 86_400)?),
            light_mirek: parse_optional(&lookup, "LIGHT_MIREK")?,
            light_brightness: parse_optional(&lookup, "LIGHT_BRIGHTNESS")?,
        })
    }
}

/// Append the webhook path to the public endpoint unless it is already there.
fn webhook_address(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with(WEBHOOK_PATH) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, WEBHOOK_PATH)
    }
}

fn parse_timezone<F>(lookup: &F) -> Result<Tz>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("TIMEZONE") {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|e| anyhow!("TIMEZONE must be an IANA timezone name: {}", e)),
        None => Ok(Tz::UTC),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{} has an invalid value: {:?}", key, raw))
        })
        .transpose()
}
