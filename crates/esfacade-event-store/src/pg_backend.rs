//! `PostgreSQL` implementation of the `StreamBackend` trait.
//!
//! Aggregate streams are rows of `stream_events` keyed by
//! `(stream_name, stream_version)`; their read position is the stream
//! version. Type streams (`$et-*`) are served as resolved projections: every
//! row with the matching `event_type`, in `global_position` order, with the
//! last `global_position` returned as the read position.
//!
//! Appends hold one transaction-scoped advisory lock from before their first
//! insert until commit, so `global_position` values become visible in
//! increasing order and a projection cursor never passes a row that has not
//! committed yet.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use esfacade_core::backend::{
    AppendResult, EventData, ExpectedVersion, MAX_PAGE_SIZE, ReadSlice, RecordedEvent,
    SliceStatus, StreamBackend,
};
use esfacade_core::error::BackendError;
use esfacade_core::naming::{TYPE_STREAM_PREFIX, parse_type_stream_name};
use esfacade_core::observer::ConnectionObserver;

use crate::config::{DEFAULT_MAX_OPERATION_ATTEMPTS, DEFAULT_OPERATION_TIMEOUT, DEFAULT_RETRY_DELAY, StoreConfig};

const SELECT_COLUMNS: &str = "SELECT global_position, event_id, stream_name, stream_version, \
     event_type, payload, recorded_at FROM stream_events";

/// Advisory lock key serializing appends ("esfacade" in ASCII).
const APPEND_LOCK_KEY: i64 = 0x6573_6661_6361_6465;

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// Unique key on `(stream_name, stream_version)`.
const STREAM_VERSION_KEY: &str = "stream_events_stream_name_stream_version_key";
/// Postgres `admin_shutdown`, raised while the server restarts.
const ADMIN_SHUTDOWN: &str = "57P01";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    global_position: i64,
    event_id: Uuid,
    stream_name: String,
    stream_version: i64,
    event_type: String,
    payload: Vec<u8>,
    recorded_at: DateTime<Utc>,
}

impl From<EventRow> for RecordedEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            stream_name: row.stream_name,
            event_number: row.stream_version,
            event_type: row.event_type,
            data: row.payload,
            created_at: row.recorded_at,
        }
    }
}

/// Why one attempt failed.
enum AttemptError {
    /// Connection-level failure worth retrying.
    Transient(String),
    /// The database refused the data itself (SQLSTATE classes 22 and 23).
    Rejected(String),
    /// Anything else.
    Fatal(sqlx::Error),
}

impl From<sqlx::Error> for AttemptError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            Self::Transient(err.to_string())
        } else if is_rejected_data(&err) {
            Self::Rejected(err.to_string())
        } else {
            Self::Fatal(err)
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code == ADMIN_SHUTDOWN),
        _ => false,
    }
}

fn is_rejected_data(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("22") || code.starts_with("23")),
        _ => false,
    }
}

fn is_version_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db.constraint() == Some(STREAM_VERSION_KEY)
    )
}

/// Checks whether `events` were already appended, in order, to `stream`.
///
/// `recorded` holds the `(event_id, stream_name, stream_version)` rows found
/// for the batch's ids. Returns `None` when none of them is recorded.
fn recorded_outcome(
    stream: &str,
    events: &[EventData],
    recorded: &[(Uuid, String, i64)],
) -> Option<Result<AppendResult, BackendError>> {
    if recorded.is_empty() {
        return None;
    }
    let versions: Option<Vec<i64>> = events
        .iter()
        .map(|event| {
            recorded
                .iter()
                .find(|(id, name, _)| *id == event.event_id && name == stream)
                .map(|(_, _, version)| *version)
        })
        .collect();
    let replayed = versions.filter(|versions| {
        versions.windows(2).all(|pair| pair[1] == pair[0] + 1)
    });

    Some(match replayed.as_deref() {
        Some([.., last]) => Ok(AppendResult {
            next_expected_version: *last,
        }),
        _ => Err(BackendError::InvalidRequest(format!(
            "event ids of this batch are already recorded outside {stream}"
        ))),
    })
}

/// PostgreSQL-backed stream store.
///
/// Each operation runs up to `max_operation_attempts` attempts, each bounded
/// by `operation_timeout`. Connection failures are reported to the observer
/// and retried; exhausting the budget yields `BackendError::ConnectionClosed`.
///
/// Appends are idempotent by event id: a batch whose ids are already
/// recorded, in order, in the target stream succeeds without writing, so an
/// attempt whose commit landed after its timeout is not reported as a
/// conflict when retried.
#[derive(Clone)]
pub struct PgStreamBackend {
    pool: PgPool,
    observer: Arc<dyn ConnectionObserver>,
    operation_timeout: Duration,
    max_operation_attempts: u32,
    retry_delay: Duration,
}

impl fmt::Debug for PgStreamBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStreamBackend")
            .field("pool", &self.pool)
            .field("operation_timeout", &self.operation_timeout)
            .field("max_operation_attempts", &self.max_operation_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl PgStreamBackend {
    /// Creates a backend over an existing pool with default retry settings.
    #[must_use]
    pub fn new(pool: PgPool, observer: Arc<dyn ConnectionObserver>) -> Self {
        Self {
            pool,
            observer,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_operation_attempts: DEFAULT_MAX_OPERATION_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the retry budget.
    ///
    /// # Panics
    ///
    /// Panics if `max_operation_attempts` is zero.
    #[must_use]
    pub fn with_retry_policy(
        mut self,
        operation_timeout: Duration,
        max_operation_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        assert!(max_operation_attempts > 0, "at least one attempt is required");
        self.operation_timeout = operation_timeout;
        self.max_operation_attempts = max_operation_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Opens a pool as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the initial connection fails.
    pub async fn connect(
        config: &StoreConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.operation_timeout)
            .connect(&config.database_url)
            .await
            .inspect_err(|err| observer.on_error(err))?;
        observer.on_connected(&redact(&config.database_url));

        Ok(Self::new(pool, observer).with_retry_policy(
            config.operation_timeout,
            config.max_operation_attempts,
            config.retry_delay,
        ))
    }

    /// Applies the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::migrate::MigrateError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut failures = 0_u32;
        loop {
            let reason = match tokio::time::timeout(self.operation_timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(AttemptError::Fatal(err))) => {
                    self.observer.on_error(&err);
                    return Err(BackendError::Other(format!("{operation}: {err}")));
                }
                Ok(Err(AttemptError::Rejected(reason))) => {
                    return Err(BackendError::InvalidRequest(format!("{operation}: {reason}")));
                }
                Ok(Err(AttemptError::Transient(reason))) => reason,
                Err(_) => "attempt timed out".to_owned(),
            };

            failures += 1;
            if failures == 1 {
                self.observer.on_disconnected();
            }
            if failures >= self.max_operation_attempts {
                return Err(BackendError::ConnectionClosed(format!(
                    "{operation} failed after {failures} attempts: {reason}"
                )));
            }
            self.observer.on_reconnecting(failures);
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn try_read(
        &self,
        stream: &str,
        from_position: i64,
        limit: i64,
    ) -> Result<Vec<EventRow>, AttemptError> {
        let rows = match parse_type_stream_name(stream) {
            Some(event_type) => {
                sqlx::query_as::<_, EventRow>(&format!(
                    "{SELECT_COLUMNS} WHERE event_type = $1 AND global_position > $2 \
                     ORDER BY global_position LIMIT $3"
                ))
                .bind(event_type)
                .bind(from_position)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, EventRow>(&format!(
                    "{SELECT_COLUMNS} WHERE stream_name = $1 AND stream_version >= $2 \
                     ORDER BY stream_version LIMIT $3"
                ))
                .bind(stream)
                .bind(from_position)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn try_append(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        events: &[EventData],
    ) -> Result<Result<AppendResult, BackendError>, AttemptError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        if !events.is_empty() {
            let ids: Vec<Uuid> = events.iter().map(|event| event.event_id).collect();
            let recorded: Vec<(Uuid, String, i64)> = sqlx::query_as(
                "SELECT event_id, stream_name, stream_version FROM stream_events \
                 WHERE event_id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
            if let Some(outcome) = recorded_outcome(stream, events, &recorded) {
                debug!(stream, "batch already recorded");
                return Ok(outcome);
            }
        }

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(stream_version) FROM stream_events WHERE stream_name = $1")
                .bind(stream)
                .fetch_one(&mut *tx)
                .await?;

        if !expected.is_satisfied_by(current) {
            return Ok(Err(BackendError::WrongExpectedVersion {
                expected,
                actual: current,
            }));
        }

        let mut version = current.unwrap_or(-1);
        for event in events {
            version += 1;
            match insert_event(&mut tx, stream, version, event).await {
                Ok(()) => {}
                Err(err) if is_version_conflict(&err) => {
                    return Ok(Err(BackendError::WrongExpectedVersion {
                        expected,
                        actual: current,
                    }));
                }
                Err(err) => return Err(err.into()),
            }
        }

        tx.commit().await?;
        Ok(Ok(AppendResult {
            next_expected_version: version,
        }))
    }
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    stream: &str,
    version: i64,
    event: &EventData,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stream_events (event_id, stream_name, stream_version, event_type, payload) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(event.event_id)
    .bind(stream)
    .bind(version)
    .bind(&event.event_type)
    .bind(&event.data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn position(value: i64) -> Result<u64, BackendError> {
    u64::try_from(value).map_err(|_| BackendError::Other(format!("negative position {value}")))
}

/// Strips credentials from a connection URL for logging.
fn redact(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}{}", &database_url[..scheme_end + 3], &database_url[at + 1..])
        }
        _ => database_url.to_owned(),
    }
}

#[async_trait]
impl StreamBackend for PgStreamBackend {
    async fn read_forward(
        &self,
        stream: &str,
        from_position: u64,
        max_count: usize,
        _resolve_links: bool,
    ) -> Result<ReadSlice, BackendError> {
        if max_count == 0 || max_count > MAX_PAGE_SIZE {
            return Err(BackendError::InvalidRequest(format!(
                "page size {max_count} outside 1..={MAX_PAGE_SIZE}"
            )));
        }
        let from = i64::try_from(from_position)
            .map_err(|_| BackendError::InvalidRequest(format!("position {from_position} out of range")))?;
        let is_type_stream = parse_type_stream_name(stream).is_some();
        // One extra row tells us whether the stream continues past this page.
        let limit = i64::try_from(max_count + 1).unwrap_or(i64::MAX);

        let mut rows = self
            .with_retry("read_forward", || self.try_read(stream, from, limit))
            .await?;

        if rows.is_empty() && from_position == 0 {
            return Ok(ReadSlice::not_found(from_position));
        }

        let is_end_of_stream = rows.len() <= max_count;
        rows.truncate(max_count);
        let next_position = match rows.last() {
            // Projections resume after the last global position seen.
            Some(last) if is_type_stream => position(last.global_position)?,
            Some(last) => position(last.stream_version + 1)?,
            None => from_position,
        };
        debug!(stream, from_position, count = rows.len(), next_position, is_end_of_stream, "read slice");

        Ok(ReadSlice {
            status: SliceStatus::Success,
            events: rows.into_iter().map(RecordedEvent::from).collect(),
            next_position,
            is_end_of_stream,
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

        self.with_retry("append", || self.try_append(stream, expected, &events))
            .await?
    }
}
