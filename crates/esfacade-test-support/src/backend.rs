//! `StreamBackend` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use esfacade_core::backend::{
    AppendResult, EventData, ExpectedVersion, MAX_PAGE_SIZE, ReadSlice, RecordedEvent,
    SliceStatus, StreamBackend,
};
use esfacade_core::error::BackendError;
use esfacade_core::naming::{TYPE_STREAM_PREFIX, parse_type_stream_name};

/// One `read_forward` call observed by [`InMemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Stream that was read.
    pub stream: String,
    /// Requested start position.
    pub from_position: u64,
    /// Requested page size.
    pub max_count: usize,
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<String, Vec<RecordedEvent>>,
    by_type: HashMap<String, Vec<RecordedEvent>>,
    reads: Vec<ReadRequest>,
}

/// An in-memory stream store with optimistic concurrency and per-type
/// projections.
///
/// Pages are capped at `page_limit` events regardless of the requested
/// size, so pagination can be exercised with small streams.
///
/// # Panics
///
/// Every method panics if the internal mutex is poisoned. `read_forward`
/// panics if asked for more than [`MAX_PAGE_SIZE`] events.
#[derive(Debug)]
pub struct InMemoryBackend {
    page_limit: usize,
    state: Mutex<State>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates a backend serving pages of up to [`MAX_PAGE_SIZE`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_limit(MAX_PAGE_SIZE)
    }

    /// Creates a backend serving pages of at most `page_limit` events.
    ///
    /// # Panics
    ///
    /// Panics if `page_limit` is zero.
    #[must_use]
    pub fn with_page_limit(page_limit: usize) -> Self {
        assert!(page_limit > 0, "page limit must be positive");
        Self {
            page_limit,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of events persisted in `stream` (projection streams included).
    pub fn event_count(&self, stream: &str) -> usize {
        let state = self.state.lock().unwrap();
        Self::lookup(&state, stream).map_or(0, Vec::len)
    }

    /// Snapshot of every `read_forward` call so far.
    pub fn read_requests(&self) -> Vec<ReadRequest> {
        self.state.lock().unwrap().reads.clone()
    }

    fn lookup<'a>(state: &'a State, stream: &str) -> Option<&'a Vec<RecordedEvent>> {
        match parse_type_stream_name(stream) {
            Some(event_type) => state.by_type.get(event_type),
            None => state.streams.get(stream),
        }
    }
}

#[async_trait]
impl StreamBackend for InMemoryBackend {
    async fn read_forward(
        &self,
        stream: &str,
        from_position: u64,
        max_count: usize,
        _resolve_links: bool,
    ) -> Result<ReadSlice, BackendError> {
        assert!(
            max_count <= MAX_PAGE_SIZE,
            "requested {max_count} events, ceiling is {MAX_PAGE_SIZE}"
        );

        let mut state = self.state.lock().unwrap();
        state.reads.push(ReadRequest {
            stream: stream.to_owned(),
            from_position,
            max_count,
        });

        let Some(events) = Self::lookup(&state, stream) else {
            return Ok(ReadSlice::not_found(from_position));
        };

        let start = usize::try_from(from_position)
            .unwrap_or(usize::MAX)
            .min(events.len());
        let end = start
            .saturating_add(max_count.min(self.page_limit))
            .min(events.len());

        Ok(ReadSlice {
            status: SliceStatus::Success,
            events: events[start..end].to_vec(),
            next_position: end as u64,
            is_end_of_stream: end == events.len(),
        })
    }

    async fn append(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, BackendError> {
        if stream.starts_with(TYPE_STREAM_PREFIX) {
            return Err(BackendError::InvalidRequest(format!(
                "{stream} is a projection stream"
            )));
        }

        let mut state = self.state.lock().unwrap();
        let current = state
            .streams
            .get(stream)
            .map(|existing| existing.len() as i64 - 1);

        if !expected.is_satisfied_by(current) {
            return Err(BackendError::WrongExpectedVersion {
                expected,
                actual: current,
            });
        }
        if events.is_empty() {
            return Ok(AppendResult {
                next_expected_version: current.unwrap_or(-1),
            });
        }

        let now = Utc::now();
        let mut version = current.unwrap_or(-1);
        let recorded: Vec<RecordedEvent> = events
            .into_iter()
            .map(|data| {
                version += 1;
                RecordedEvent {
                    event_id: data.event_id,
                    stream_name: stream.to_owned(),
                    event_number: version,
                    event_type: data.event_type,
                    data: data.data,
                    created_at: now,
                }
            })
            .collect();

        for event in &recorded {
            state
                .by_type
                .entry(event.event_type.clone())
                .or_default()
                .push(event.clone());
        }
        state
            .streams
            .entry(stream.to_owned())
            .or_default()
            .extend(recorded);

        Ok(AppendResult {
            next_expected_version: version,
        })
    }
}

/// A backend whose every call fails with the configured error. Useful for
/// testing error translation.
#[derive(Debug)]
pub struct FailingBackend(pub BackendError);

#[async_trait]
impl StreamBackend for FailingBackend {
    async fn read_forward(
        &self,
        _stream: &str,
        _from_position: u64,
        _max_count: usize,
        _resolve_links: bool,
    ) -> Result<ReadSlice, BackendError> {
        Err(self.0.clone())
    }

    async fn append(
        &self,
        _stream: &str,
        _expected: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<AppendResult, BackendError> {
        Err(self.0.clone())
    }
}

/// A backend whose calls never complete. Useful for testing timeouts.
#[derive(Debug)]
pub struct StallingBackend;

#[async_trait]
impl StreamBackend for StallingBackend {
    async fn read_forward(
        &self,
        _stream: &str,
        _from_position: u64,
        _max_count: usize,
        _resolve_links: bool,
    ) -> Result<ReadSlice, BackendError> {
        std::future::pending().await
    }

    async fn append(
        &self,
        _stream: &str,
        _expected: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<AppendResult, BackendError> {
        std::future::pending().await
    }
}
