//! Store facade: persist-and-publish, and history loads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{Aggregate, replay};
use crate::append::append_to_stream;
use crate::backend::{ExpectedVersion, RecordedEvent, StreamBackend};
use crate::codec::EventCodec;
use crate::error::StoreError;
use crate::event::DomainEvent;
use crate::naming::{checked_aggregate_stream_name, type_stream_name};
use crate::publisher::EventPublisher;
use crate::reader::read_all;

/// Default bound on each backend call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Client-side facade over an append-only stream store.
///
/// Cheap to clone; all clones share one backend handle.
pub struct EventStore<E: DomainEvent> {
    backend: Arc<dyn StreamBackend>,
    codec: Arc<EventCodec<E>>,
    publisher: Arc<dyn EventPublisher<E>>,
    operation_timeout: Duration,
}

impl<E: DomainEvent> Clone for EventStore<E> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            codec: Arc::clone(&self.codec),
            publisher: Arc::clone(&self.publisher),
            operation_timeout: self.operation_timeout,
        }
    }
}

impl<E: DomainEvent> fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("codec", &self.codec)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl<E: DomainEvent> EventStore<E> {
    /// Creates a facade with [`DEFAULT_OPERATION_TIMEOUT`].
    #[must_use]
    pub fn new(
        backend: Arc<dyn StreamBackend>,
        codec: EventCodec<E>,
        publisher: Arc<dyn EventPublisher<E>>,
    ) -> Self {
        Self {
            backend,
            codec: Arc::new(codec),
            publisher,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Overrides the bound on each backend call.
    #[must_use]
    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Appends `events` to the aggregate's stream under `expected`, then
    /// publishes them in append order.
    ///
    /// Returns the stream's new version. Nothing is published when the
    /// append fails; publish failures are logged and do not fail the call.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrencyConflict` if `expected` is stale,
    /// `StoreError::InvalidRequest` if `aggregate_type` is empty or starts
    /// with the projection prefix, and `StoreError::StoreUnavailable` if the
    /// backend cannot be reached.
    #[instrument(
        skip_all,
        fields(aggregate_type = aggregate_type, aggregate_id = %aggregate_id, expected = %expected, count = events.len())
    )]
    pub async fn persist(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        events: &[E],
        expected: ExpectedVersion,
    ) -> Result<i64, StoreError> {
        let stream = checked_aggregate_stream_name(aggregate_type, aggregate_id)?;
        let encoded = events.iter().map(|e| self.codec.encode(e)).collect();

        let version = append_to_stream(
            self.backend.as_ref(),
            &stream,
            expected,
            encoded,
            self.operation_timeout,
        )
        .await?;

        info!(stream = %stream, version, "events persisted");

        for event in events {
            if let Err(err) = self.publisher.publish(event).await {
                warn!(stream = %stream, event_type = event.event_type(), error = %err, "publish failed");
            }
        }

        Ok(version)
    }

    /// Loads the full history of one aggregate, in append order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AggregateNotFound` if the stream is absent or
    /// empty, `StoreError::Decode` if any stored event cannot be decoded,
    /// `StoreError::InvalidRequest` for a reserved `aggregate_type` and
    /// `StoreError::StoreUnavailable` if the backend cannot be reached.
    #[instrument(skip_all, fields(aggregate_type = aggregate_type, aggregate_id = %aggregate_id))]
    pub async fn load_for_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<E>, StoreError> {
        let recorded = self.load_recorded(aggregate_type, aggregate_id).await?;
        self.decode_all(&recorded)
    }

    /// Loads a window of every event tagged `event_type`, across aggregates.
    ///
    /// The whole projection stream is read and decoded before `start_index`
    /// and `max_count` are applied in memory. An absent projection yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if any stored event cannot be decoded and
    /// `StoreError::StoreUnavailable` if the backend cannot be reached.
    #[instrument(skip_all, fields(event_type = event_type, start_index = start_index, max_count = max_count))]
    pub async fn load_by_type(
        &self,
        event_type: &str,
        start_index: usize,
        max_count: usize,
    ) -> Result<Vec<E>, StoreError> {
        let stream = type_stream_name(event_type);
        // TODO: push the window down to the backend instead of reading the
        // whole projection.
        let recorded = read_all(self.backend.as_ref(), &stream, self.operation_timeout)
            .await?
            .into_events();

        let decoded = self.decode_all(&recorded)?;
        Ok(decoded
            .into_iter()
            .skip(start_index)
            .take(max_count)
            .collect())
    }

    /// Loads and replays aggregate `A`, returning it with its version.
    ///
    /// # Errors
    ///
    /// Same as [`load_for_aggregate`](Self::load_for_aggregate).
    pub async fn load_aggregate<A>(&self, aggregate_id: Uuid) -> Result<(A, i64), StoreError>
    where
        A: Aggregate<Event = E>,
    {
        let recorded = self
            .load_recorded(A::AGGREGATE_TYPE, aggregate_id)
            .await?;
        let events = self.decode_all(&recorded)?;
        // The backend's numbering is authoritative, not the event count.
        let version = recorded.last().map_or(-1, |last| last.event_number);
        Ok((replay(aggregate_id, &events), version))
    }

    /// Persists `events` produced by aggregate `A`.
    ///
    /// # Errors
    ///
    /// Same as [`persist`](Self::persist).
    pub async fn save_aggregate<A>(
        &self,
        aggregate_id: Uuid,
        events: &[E],
        expected: ExpectedVersion,
    ) -> Result<i64, StoreError>
    where
        A: Aggregate<Event = E>,
    {
        self.persist(A::AGGREGATE_TYPE, aggregate_id, events, expected)
            .await
    }

    async fn load_recorded(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let stream = checked_aggregate_stream_name(aggregate_type, aggregate_id)?;
        let history = read_all(self.backend.as_ref(), &stream, self.operation_timeout).await?;

        // Absent and empty streams are both "not found".
        let recorded = history.into_events();
        if recorded.is_empty() {
            return Err(StoreError::AggregateNotFound { stream });
        }
        Ok(recorded)
    }

    fn decode_all(&self, recorded: &[RecordedEvent]) -> Result<Vec<E>, StoreError> {
        recorded
            .iter()
            .map(|r| self.codec.decode(&r.event_type, &r.data))
            .collect()
    }
}
