//! Storage backend abstraction.
//!
//! The facade talks to the append-only stream store exclusively through
//! [`StreamBackend`]. Implementations own connection handling and their own
//! retry budget; they must be safe for concurrent use.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, StoreError};

/// Largest page a single forward read may request.
pub const MAX_PAGE_SIZE: usize = 4096;

/// Optimistic-concurrency precondition for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Accept any current stream version (no concurrency check).
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream must exist, at any version.
    StreamExists,
    /// The stream's last event must have exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Raw sentinel for [`ExpectedVersion::NoStream`].
    pub const NO_STREAM: i64 = -1;
    /// Raw sentinel for [`ExpectedVersion::Any`].
    pub const ANY: i64 = -2;
    /// Raw sentinel for [`ExpectedVersion::StreamExists`].
    pub const STREAM_EXISTS: i64 = -4;

    /// Decodes the integer form used on the wire: `-1` no stream, `-2` any,
    /// `-4` stream exists, and non-negative values an exact version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRequest` for any other negative value.
    pub fn from_raw(raw: i64) -> Result<Self, StoreError> {
        match raw {
            Self::NO_STREAM => Ok(Self::NoStream),
            Self::ANY => Ok(Self::Any),
            Self::STREAM_EXISTS => Ok(Self::StreamExists),
            v if v >= 0 => Ok(Self::Exact(v.unsigned_abs())),
            other => Err(StoreError::InvalidRequest(format!(
                "unsupported expected version {other}"
            ))),
        }
    }

    /// Returns the integer form of this precondition.
    #[must_use]
    pub fn to_raw(self) -> i64 {
        match self {
            Self::NoStream => Self::NO_STREAM,
            Self::Any => Self::ANY,
            Self::StreamExists => Self::STREAM_EXISTS,
            Self::Exact(v) => i64::try_from(v).unwrap_or(i64::MAX),
        }
    }

    /// Checks this precondition against a stream's current version
    /// (`None` when the stream does not exist).
    #[must_use]
    pub fn is_satisfied_by(self, current: Option<i64>) -> bool {
        match (self, current) {
            (Self::Any, _) | (Self::NoStream, None) | (Self::StreamExists, Some(_)) => true,
            (Self::Exact(expected), Some(actual)) => i64::try_from(expected) == Ok(actual),
            _ => false,
        }
    }
}

impl TryFrom<i64> for ExpectedVersion {
    type Error = StoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::NoStream => f.write_str("no stream"),
            Self::StreamExists => f.write_str("stream exists"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// An event ready to be written: type tag plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// Unique event identifier, assigned by the client.
    pub event_id: Uuid,
    /// Type tag naming the payload schema.
    pub event_type: String,
    /// UTF-8 JSON payload.
    pub data: Vec<u8>,
}

/// An event as stored by the backend. Metadata is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The stream the event was originally appended to.
    pub stream_name: String,
    /// Version of the event within its original stream, starting at 0.
    pub event_number: i64,
    /// Type tag naming the payload schema.
    pub event_type: String,
    /// Serialized payload.
    pub data: Vec<u8>,
    /// Backend-assigned timestamp.
    pub created_at: DateTime<Utc>,
}

/// Whether a read slice came from an existing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// The stream exists; the slice may still be empty.
    Success,
    /// The stream has never been written to.
    StreamNotFound,
}

/// One bounded page of a forward read.
#[derive(Debug, Clone)]
pub struct ReadSlice {
    /// Existence of the stream that was read.
    pub status: SliceStatus,
    /// Events in stream order. Links in projection streams are resolved.
    pub events: Vec<RecordedEvent>,
    /// Position to request next. Authoritative; never recomputed by callers.
    pub next_position: u64,
    /// `true` once no further events follow this slice.
    pub is_end_of_stream: bool,
}

impl ReadSlice {
    /// Slice returned for a stream that does not exist.
    #[must_use]
    pub fn not_found(from_position: u64) -> Self {
        Self {
            status: SliceStatus::StreamNotFound,
            events: Vec::new(),
            next_position: from_position,
            is_end_of_stream: true,
        }
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Version of the last event in the stream after the append; `-1` if an
    /// empty batch was written to an absent stream.
    pub next_expected_version: i64,
}

/// The append-only stream store the facade is built on.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Reads up to `max_count` events forward from `from_position`.
    ///
    /// `max_count` never exceeds [`MAX_PAGE_SIZE`]; implementations may
    /// reject larger requests with `BackendError::InvalidRequest`.
    async fn read_forward(
        &self,
        stream: &str,
        from_position: u64,
        max_count: usize,
        resolve_links: bool,
    ) -> Result<ReadSlice, BackendError>;

    /// Appends `events` atomically, in order, if `expected` holds.
    async fn append(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<AppendResult, BackendError>;
}

/// Runs one backend call under the operation timeout.
pub(crate) async fn bounded<T>(
    operation_timeout: Duration,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    tokio::time::timeout(operation_timeout, call)
        .await
        .unwrap_or(Err(BackendError::Timeout))
}
