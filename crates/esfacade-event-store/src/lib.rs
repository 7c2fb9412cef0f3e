//! PostgreSQL-backed stream store for esfacade.

pub mod config;
pub mod pg_backend;

use std::sync::Arc;

use esfacade_core::EventStore;
use esfacade_core::codec::EventCodec;
use esfacade_core::event::DomainEvent;
use esfacade_core::observer::ConnectionObserver;
use esfacade_core::publisher::EventPublisher;

pub use config::{ConfigError, StoreConfig};
pub use pg_backend::PgStreamBackend;

/// Connects to `PostgreSQL` and wraps the backend in an [`EventStore`] whose
/// per-call bound covers the backend's whole retry budget.
///
/// # Errors
///
/// Returns `sqlx::Error` if the initial connection fails.
pub async fn open_event_store<E: DomainEvent>(
    config: &StoreConfig,
    codec: EventCodec<E>,
    publisher: Arc<dyn EventPublisher<E>>,
    observer: Arc<dyn ConnectionObserver>,
) -> Result<EventStore<E>, sqlx::Error> {
    let backend = PgStreamBackend::connect(config, observer).await?;
    Ok(EventStore::new(Arc::new(backend), codec, publisher)
        .with_operation_timeout(config.call_timeout()))
}
