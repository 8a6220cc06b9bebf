//! HTTP client for the light agent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared_types::{Interval, LightState, LIGHT_STATE_PATH};
use std::time::Duration;

use super::IntervalObserver;

/// Turns the light on while an interval is in progress and off otherwise.
pub struct LightSink {
    client: Client,
    url: String,
    mirek: Option<u16>,
    brightness: Option<u8>,
}

impl LightSink {
    pub fn new(base_url: &str, mirek: Option<u16>, brightness: Option<u8>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), LIGHT_STATE_PATH),
            mirek,
            brightness,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post one state change. No retries: the watcher tries again on a
    /// later tick if the condition still holds.
    pub async fn send(&self, state: LightState) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&state)
            .send()
            .await
            .with_context(|| format!("Failed to reach light agent at {}", self.url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::info!("Light agent answered {} (on: {}): {}", status, state.on, body);

        if !status.is_success() {
            anyhow::bail!("Light agent returned {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl IntervalObserver for LightSink {
    fn name(&self) -> &str {
        "light"
    }

    async fn on_interval_start(&self, _interval: &Interval) -> Result<()> {
        self.send(LightState::on(self.mirek, self.brightness)).await
    }

    async fn on_interval_end(&self, _interval: Option<&Interval>) -> Result<()> {
        self.send(LightState::off()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn record(
        State(received): State<Received>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        received.lock().await.push(body);
        StatusCode::OK
    }

    async fn refuse() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "bridge offline")
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn interval() -> Interval {
        Interval::new(
            "focus",
            "",
            Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let sink = LightSink::new("http://hue.local:9000/", None, None).unwrap();
        assert_eq!(sink.url(), "http://hue.local:9000/light/state");
    }

    #[tokio::test]
    async fn test_start_and_end_post_payloads() {
        let received = Received::default();
        let app = Router::new()
            .route(LIGHT_STATE_PATH, post(record))
            .with_state(received.clone());
        let base = serve(app).await;

        let sink = LightSink::new(&base, Some(366), Some(80)).unwrap();
        sink.on_interval_start(&interval()).await.unwrap();
        sink.on_interval_end(Some(&interval())).await.unwrap();

        let bodies = received.lock().await.clone();
        assert_eq!(
            bodies,
            vec![
                serde_json::json!({"on": true, "mirek": 366, "brightness": 80}),
                serde_json::json!({"on": false}),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(LIGHT_STATE_PATH, post(refuse));
        let base = serve(app).await;

        let sink = LightSink::new(&base, None, None).unwrap();
        let err = sink.send(LightState::off()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = LightSink::new(&format!("http://{}", addr), None, None).unwrap();
        assert!(sink.send(LightState::off()).await.is_err());
    }
}
