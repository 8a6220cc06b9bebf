use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use busylight::calendar_client::{GoogleCalendarClient, WatchChannel};
use busylight::config::Config;
use busylight::handlers::AppState;
use busylight::pollers::{CalendarWatcher, WatcherConfig};
use busylight::routes::build_router;
use busylight::services::{Scheduler, SchedulerConfig};
use busylight::sinks::{LightSink, LoggingObserver, Observers};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busylight=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        "Starting busylight for calendar {} (timezone: {})",
        config.calendar_id,
        config.timezone
    );

    let calendar = Arc::new(
        GoogleCalendarClient::new(&config.credentials_path, &config.calendar_id)
            .await
            .context("Failed to authenticate to Google Calendar")?,
    );
    tracing::info!("Authenticated to calendar {}", calendar.calendar_id());

    let scheduler = Arc::new(Scheduler::new(
        calendar.clone(),
        SchedulerConfig {
            timezone: config.timezone,
            start_cooldown: config.start_cooldown,
            absence_cooldown: config.absence_cooldown,
        },
    ));

    let light = LightSink::new(
        &config.light_agent_base_url,
        config.light_mirek,
        config.light_brightness,
    )?;
    tracing::info!("Light agent at {}", light.url());
    let observers = Observers::new()
        .with(Arc::new(LoggingObserver))
        .with(Arc::new(light));

    // Startup sync is best effort; the watcher retries on its first tick.
    match scheduler.sync().await {
        Ok(summary) => tracing::info!(
            "Initial sync: {} events, {} intervals",
            summary.fetched,
            summary.merged
        ),
        Err(e) => tracing::error!("Initial sync failed: {:#}", anyhow::Error::from(e)),
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    let watcher = CalendarWatcher::new(
        scheduler.clone(),
        observers,
        WatcherConfig {
            tick_interval: config.tick_interval,
            resync_retry: config.resync_retry,
        },
    );
    let watcher_handle = tokio::spawn(watcher.run(stop_rx.clone()));

    let channel_id = Uuid::new_v4().to_string();
    let app = build_router(AppState {
        scheduler,
        channel_id: Arc::from(channel_id.as_str()),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let channel = calendar
        .register_watch(&channel_id, &config.notification_address, config.watch_ttl)
        .await?;

    tokio::spawn(warn_on_watch_expiry(channel.clone(), stop_rx.clone()));
    tokio::spawn(shutdown_signal(stop_tx));

    let mut server_stop = stop_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_stop.wait_for(|stopped| *stopped).await;
        })
        .await?;

    tracing::info!("Server stopped, cleaning up");
    if let Err(e) = calendar.stop_watch(&channel).await {
        tracing::warn!("Failed to stop watch channel {}: {:#}", channel.id, e);
    }
    if let Err(e) = watcher_handle.await {
        tracing::error!("Watcher task failed: {}", e);
    }

    tracing::info!("busylight stopped");
    Ok(())
}

/// Push notifications stop once the channel expires; only the day rollover
/// resync keeps the schedule fresh after that.
async fn warn_on_watch_expiry(channel: WatchChannel, mut stop: watch::Receiver<bool>) {
    let Some(remaining) = channel.time_to_expiry(Utc::now()) else {
        return;
    };
    tracing::info!("Watch channel {} expires in {:?}", channel.id, remaining);

    tokio::select! {
        _ = tokio::time::sleep(remaining) => {
            tracing::warn!(
                "Watch channel {} expired; calendar changes are only picked up at the next day rollover",
                channel.id
            );
        }
        _ = stop.wait_for(|stopped| *stopped) => {}
    }
}

/// Flip the stop signal on Ctrl-C or SIGTERM.
async fn shutdown_signal(stop: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping...");
    let _ = stop.send(true);
}
