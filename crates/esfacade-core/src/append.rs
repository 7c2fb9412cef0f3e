//! Guarded appends.
//!
//! Submits one batch under an expected-version precondition. A backend
//! version mismatch becomes `StoreError::ConcurrencyConflict`; every other
//! failure becomes `StoreError::StoreUnavailable`. Conflicts are never
//! retried here: only the caller knows how to merge.

use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{EventData, ExpectedVersion, StreamBackend, bounded};
use crate::error::{BackendError, StoreError};

/// Appends `events` to `stream` if `expected` matches its current version.
///
/// Returns the version of the last event written.
///
/// # Errors
///
/// Returns `StoreError::ConcurrencyConflict` if the precondition fails,
/// `StoreError::StoreUnavailable` if the backend fails or times out.
pub async fn append_to_stream(
    backend: &dyn StreamBackend,
    stream: &str,
    expected: ExpectedVersion,
    events: Vec<EventData>,
    operation_timeout: Duration,
) -> Result<i64, StoreError> {
    let count = events.len();
    match bounded(operation_timeout, backend.append(stream, expected, events)).await {
        Ok(result) => {
            debug!(
                stream,
                %expected,
                count,
                version = result.next_expected_version,
                "appended events"
            );
            Ok(result.next_expected_version)
        }
        Err(err @ BackendError::WrongExpectedVersion { .. }) => {
            debug!(stream, %expected, error = %err, "append rejected");
            Err(err.into_store_error(stream))
        }
        Err(err) => {
            warn!(stream, %expected, count, error = %err, "append failed");
            Err(err.into_store_error(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::backend::{AppendResult, ReadSlice};

    const TIMEOUT: Duration = Duration::from_secs(1);

    struct StubBackend {
        result: Mutex<Option<Result<AppendResult, BackendError>>>,
    }

    #[async_trait]
    impl StreamBackend for StubBackend {
        async fn read_forward(
            &self,
            _stream: &str,
            _from_position: u64,
            _max_count: usize,
            _resolve_links: bool,
        ) -> Result<ReadSlice, BackendError> {
            unreachable!("append never reads")
        }

        async fn append(
            &self,
            _stream: &str,
            _expected: ExpectedVersion,
            _events: Vec<EventData>,
        ) -> Result<AppendResult, BackendError> {
            self.result.lock().unwrap().take().expect("single call")
        }
    }

    fn stub(result: Result<AppendResult, BackendError>) -> StubBackend {
        StubBackend {
            result: Mutex::new(Some(result)),
        }
    }

    fn event() -> EventData {
        EventData {
            event_id: Uuid::new_v4(),
            event_type: "t".into(),
            data: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_returns_new_version() {
        let backend = stub(Ok(AppendResult {
            next_expected_version: 1,
        }));

        let version = append_to_stream(
            &backend,
            "s",
            ExpectedVersion::NoStream,
            vec![event(), event()],
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_becomes_conflict() {
        let backend = stub(Err(BackendError::WrongExpectedVersion {
            expected: ExpectedVersion::Exact(0),
            actual: Some(3),
        }));

        let result =
            append_to_stream(&backend, "s", ExpectedVersion::Exact(0), vec![event()], TIMEOUT)
                .await;

        match result {
            Err(StoreError::ConcurrencyConflict {
                stream,
                expected,
                actual,
            }) => {
                assert_eq!(stream, "s");
                assert_eq!(expected, ExpectedVersion::Exact(0));
                assert_eq!(actual, Some(3));
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_not_a_conflict() {
        let backend = stub(Err(BackendError::Timeout));

        let result =
            append_to_stream(&backend, "s", ExpectedVersion::Any, vec![event()], TIMEOUT).await;

        assert!(matches!(result, Err(StoreError::StoreUnavailable(_))));
    }
}
