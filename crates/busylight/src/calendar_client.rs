//! Calendar event source: the trait the scheduler fetches through, and the
//! Google Calendar implementation used in production.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_calendar3::api::{Channel, Event};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::{SourceEvent, CHANNEL_TYPE_WEBHOOK};
use std::time::Duration;

/// Anything that can list a calendar's events inside a time window.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<SourceEvent>>;
}

/// A registered push-notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChannel {
    pub id: String,
    pub resource_id: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl WatchChannel {
    /// Time left before Google stops delivering on this channel. `None`
    /// when no expiration was reported, zero once it has passed.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiration
            .map(|expiration| (expiration - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Client for the Google Calendar API, authenticated with a service account
pub struct GoogleCalendarClient {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub async fn new(credentials_path: &str, calendar_id: &str) -> Result<Self> {
        let key = google_calendar3::yup_oauth2::read_service_account_key(credentials_path)
            .await
            .with_context(|| format!("Failed to read service account key {}", credentials_path))?;

        let auth = google_calendar3::yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("Failed to build authenticator")?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, auth);

        Ok(Self {
            hub,
            calendar_id: calendar_id.to_string(),
        })
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// Ask Google to push change notifications for this calendar to `address`.
    pub async fn register_watch(
        &self,
        channel_id: &str,
        address: &str,
        ttl: Duration,
    ) -> Result<WatchChannel> {
        let expiration = Utc::now()
            + chrono::Duration::from_std(ttl).context("Watch TTL is out of range")?;

        let request = Channel {
            id: Some(channel_id.to_string()),
            address: Some(address.to_string()),
            type_: Some(CHANNEL_TYPE_WEBHOOK.to_string()),
            expiration: Some(expiration.timestamp_millis()),
            ..Default::default()
        };

        let (_, channel) = self
            .hub
            .events()
            .watch(request, &self.calendar_id)
            .doit()
            .await
            .context("Failed to register calendar watch")?;

        tracing::info!(
            "Watching calendar {} on channel {} (resource: {:?})",
            self.calendar_id,
            channel_id,
            channel.resource_id
        );

        Ok(WatchChannel {
            id: channel.id.unwrap_or_else(|| channel_id.to_string()),
            resource_id: channel.resource_id,
            expiration: channel
                .expiration
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }

    pub async fn stop_watch(&self, channel: &WatchChannel) -> Result<()> {
        let request = Channel {
            id: Some(channel.id.clone()),
            resource_id: channel.resource_id.clone(),
            ..Default::default()
        };

        self.hub
            .channels()
            .stop(request)
            .doit()
            .await
            .context("Failed to stop calendar watch")?;

        tracing::info!("Stopped watch channel {}", channel.id);
        Ok(())
    }
}

#[async_trait]
impl EventSource for GoogleCalendarClient {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<SourceEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .events()
                .list(&self.calendar_id)
                .time_min(time_min)
                .time_max(time_max)
                .single_events(true)
                .order_by("startTime");
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, page) = call
                .doit()
                .await
                .with_context(|| format!("Failed to list events of {}", self.calendar_id))?;

            events.extend(page.items.unwrap_or_default().into_iter().map(to_source_event));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(
            "Fetched {} events between {} and {}",
            events.len(),
            time_min,
            time_max
        );
        Ok(events)
    }
}

/// All-day entries only carry a date; they come through without start/end
/// times and are rejected during ingestion.
fn to_source_event(event: Event) -> SourceEvent {
    SourceEvent {
        summary: event.summary.unwrap_or_default(),
        description: event.description.unwrap_or_default(),
        start: event.start.and_then(|s| s.date_time),
        end: event.end.and_then(|e| e.date_time),
        status: event.status,
        recurring: event.recurrence.is_some() || event.recurring_event_id.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use google_calendar3::api::EventDateTime;

    #[test]
    fn test_to_source_event_maps_timed_event() {
        let start = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();
        let event = Event {
            summary: Some("Planning".to_string()),
            start: Some(EventDateTime {
                date_time: Some(start),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(end),
                ..Default::default()
            }),
            status: Some("confirmed".to_string()),
            recurring_event_id: Some("abc123".to_string()),
            ..Default::default()
        };

        let source = to_source_event(event);
        assert_eq!(source.summary, "Planning");
        assert_eq!(source.description, "");
        assert_eq!(source.start, Some(start));
        assert_eq!(source.end, Some(end));
        assert!(source.recurring);
        assert!(!source.is_cancelled());
    }

    #[test]
    fn test_watch_channel_time_to_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        let mut channel = WatchChannel {
            id: "busylight".to_string(),
            resource_id: None,
            expiration: Some(now + chrono::Duration::hours(24)),
        };
        assert_eq!(
            channel.time_to_expiry(now),
            Some(Duration::from_secs(86_400))
        );

        channel.expiration = Some(now - chrono::Duration::minutes(5));
        assert_eq!(channel.time_to_expiry(now), Some(Duration::ZERO));

        channel.expiration = None;
        assert_eq!(channel.time_to_expiry(now), None);
    }

    #[test]
    fn test_to_source_event_all_day_has_no_times() {
        let event = Event {
            summary: Some("Holiday".to_string()),
            start: Some(EventDateTime {
                date: chrono::NaiveDate::from_ymd_opt(2024, 3, 14),
                ..Default::default()
            }),
            ..Default::default()
        };

        let source = to_source_event(event);
        assert_eq!(source.start, None);
        assert_eq!(source.end, None);
        assert!(!source.recurring);
    }
}
