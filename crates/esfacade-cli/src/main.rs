//! esfacade CLI entry point: dumps event streams as JSON lines.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use esfacade_core::StoreError;
use esfacade_core::backend::RecordedEvent;
use esfacade_core::naming::{checked_aggregate_stream_name, type_stream_name};
use esfacade_core::observer::TracingObserver;
use esfacade_core::reader::{StreamHistory, read_all};
use esfacade_event_store::config::DATABASE_URL_VAR;
use esfacade_event_store::{PgStreamBackend, StoreConfig};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "esfacade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// `PostgreSQL` URL; overrides `ESFACADE_DATABASE_URL`
    #[arg(long)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the bundled schema migrations
    Migrate,

    /// Print every event of one aggregate's stream
    Stream {
        /// Aggregate type, e.g. "inventory_item"
        aggregate_type: String,

        /// Aggregate id
        id: Uuid,
    },

    /// Print a window of every event with the given type tag
    ByType {
        /// Event type tag
        event_type: String,

        /// Index of the first event to print
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Maximum number of events to print
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the event lines.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = load_config(cli.database_url)?;
    let backend = PgStreamBackend::connect(&config, Arc::new(TracingObserver)).await?;
    let timeout = config.call_timeout();

    match cli.command {
        Commands::Migrate => {
            backend.migrate().await?;
            tracing::info!("migrations applied");
        }
        Commands::Stream { aggregate_type, id } => {
            let stream = checked_aggregate_stream_name(&aggregate_type, id)?;
            let history = read_all(&backend, &stream, timeout).await?;
            let events = aggregate_events(history, stream)?;
            print_events(events.iter().enumerate())?;
        }
        Commands::ByType {
            event_type,
            start,
            count,
        } => {
            let stream = type_stream_name(&event_type);
            let events = read_all(&backend, &stream, timeout).await?.into_events();
            let window = events
                .iter()
                .enumerate()
                .skip(start)
                .take(count.unwrap_or(usize::MAX));
            print_events(window)?;
        }
    }

    Ok(())
}

fn load_config(database_url: Option<String>) -> Result<StoreConfig, Box<dyn Error>> {
    let config = StoreConfig::from_lookup(|key: &str| {
        if key == DATABASE_URL_VAR && database_url.is_some() {
            database_url.clone()
        } else {
            std::env::var(key).ok()
        }
    })?;
    Ok(config)
}

/// Absent and empty aggregate streams are both "not found".
fn aggregate_events(
    history: StreamHistory,
    stream: String,
) -> Result<Vec<RecordedEvent>, StoreError> {
    let events = history.into_events();
    if events.is_empty() {
        return Err(StoreError::AggregateNotFound { stream });
    }
    Ok(events)
}

fn print_events<'a>(
    events: impl Iterator<Item = (usize, &'a RecordedEvent)>,
) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    for (position, event) in events {
        writeln!(out, "{}", event_line(position, event))?;
    }
    out.flush()
}

/// One output line: position in the listing, origin, type tag and payload.
fn event_line(position: usize, event: &RecordedEvent) -> Value {
    let payload = serde_json::from_slice::<Value>(&event.data)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&event.data).into_owned()));
    json!({
        "position": position,
        "stream": event.stream_name,
        "event_number": event.event_number,
        "event_id": event.event_id,
        "type": event.event_type,
        "payload": payload,
    })
}
