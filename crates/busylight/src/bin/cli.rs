use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use shared_types::{Interval, LightState};

use busylight::calendar_client::{EventSource, GoogleCalendarClient, WatchChannel};
use busylight::services::scheduler::day_bounds;
use busylight::services::{consolidate, select_upcoming};
use busylight::sinks::LightSink;

#[derive(Parser)]
#[command(name = "busylight-cli")]
#[command(about = "Diagnostics for the calendar busy light")]
#[command(
    long_about = "Inspect what the busy light would do without running the service.\n\n\
    Reads the same environment (and .env file) as the service itself."
)]
struct Cli {
    /// Calendar to read from.
    #[arg(long, default_value = "primary", env = "CALENDAR_ID")]
    calendar_id: String,

    /// Path to the Google service account key JSON file.
    #[arg(long, default_value = "credentials.json", env = "GOOGLE_CREDENTIALS_PATH")]
    credentials: String,

    /// IANA timezone whose midnight delimits "today".
    #[arg(long, default_value = "UTC", env = "TIMEZONE")]
    timezone: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's events, the merged intervals and the upcoming one
    Today,

    /// Send a single on/off payload to the light agent
    Light {
        #[arg(value_enum)]
        state: Switch,

        /// Light agent base URL.
        #[arg(long, env = "HUE_AGENT_BASE_URL")]
        agent_url: String,

        /// Colour temperature sent with "on".
        #[arg(long, env = "LIGHT_MIREK")]
        mirek: Option<u16>,

        /// Brightness sent with "on".
        #[arg(long, env = "LIGHT_BRIGHTNESS")]
        brightness: Option<u8>,
    },

    /// Stop a watch channel left behind by a previous run
    StopWatch {
        #[arg(long)]
        channel_id: String,

        #[arg(long)]
        resource_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Today => show_today(&cli.credentials, &cli.calendar_id, &cli.timezone).await?,
        Commands::Light {
            state,
            agent_url,
            mirek,
            brightness,
        } => {
            let sink = LightSink::new(&agent_url, mirek, brightness)?;
            let payload = match state {
                Switch::On => LightState::on(mirek, brightness),
                Switch::Off => LightState::off(),
            };
            let body = serde_json::to_string(&payload)?;
            sink.send(payload).await?;
            println!("Sent {} to {}", body, sink.url());
        }
        Commands::StopWatch {
            channel_id,
            resource_id,
        } => {
            let client = GoogleCalendarClient::new(&cli.credentials, &cli.calendar_id).await?;
            client
                .stop_watch(&WatchChannel {
                    id: channel_id.clone(),
                    resource_id: Some(resource_id),
                    expiration: None,
                })
                .await?;
            println!("Stopped channel {}", channel_id);
        }
    }

    Ok(())
}

async fn show_today(credentials: &str, calendar_id: &str, timezone: &str) -> anyhow::Result<()> {
    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid timezone: {}", timezone))?;
    let client = GoogleCalendarClient::new(credentials, calendar_id).await?;

    let now = Utc::now();
    let local_now = now.with_timezone(&tz);
    let day = local_now.date_naive();
    let (time_min, time_max) =
        day_bounds(day, &tz).with_context(|| format!("No midnight on {} in {}", day, tz))?;

    let events = client.list_events(time_min, time_max).await?;
    println!("{} events on {} ({}):", events.len(), day, tz);

    let mut intervals = Vec::new();
    for event in events.iter().filter(|e| !e.is_cancelled()) {
        match Interval::from_source(event, &local_now) {
            Ok(interval) => intervals.push(interval),
            Err(e) => println!("  skipped: {}", e),
        }
    }
    intervals.sort_by_key(|i| i.start);
    for interval in &intervals {
        print_interval("  ", interval, &tz);
    }

    let merged = consolidate(intervals);
    println!("\n{} merged intervals:", merged.len());
    for interval in &merged {
        print_interval("  ", interval, &tz);
    }

    match select_upcoming(&merged, now) {
        Some(idx) => {
            print!("\nUpcoming: ");
            print_interval("", &merged[idx], &tz);
        }
        None => println!("\nNothing upcoming today."),
    }

    Ok(())
}

fn print_interval(indent: &str, interval: &Interval, tz: &chrono_tz::Tz) {
    println!(
        "{}{} - {}  {}{}",
        indent,
        interval.start.with_timezone(tz).format("%H:%M"),
        interval.end.with_timezone(tz).format("%H:%M"),
        interval.summary,
        if interval.is_recurring { " (recurring)" } else { "" }
    );
}
