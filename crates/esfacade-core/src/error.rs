//! Error types surfaced by the store facade and its backend seam.

use thiserror::Error;

use crate::backend::ExpectedVersion;

/// Errors returned to callers of the store facade.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The expected-version precondition of an append did not hold.
    ///
    /// Nothing was written. Callers re-read, reapply and retry.
    #[error("concurrency conflict on stream {stream}: expected {expected}, actual {}", display_version(.actual))]
    ConcurrencyConflict {
        /// The stream the append targeted.
        stream: String,
        /// The precondition the caller supplied.
        expected: ExpectedVersion,
        /// The stream's current version when known; `None` if the backend
        /// did not report it.
        actual: Option<i64>,
    },

    /// The aggregate stream is absent or holds no events.
    #[error("aggregate not found: {stream}")]
    AggregateNotFound {
        /// The aggregate stream that was read.
        stream: String,
    },

    /// The backend could not be reached within its retry and timeout budget.
    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record could not be rebuilt into its declared event type.
    #[error("cannot decode event of type {event_type}: {reason}")]
    Decode {
        /// The stored type tag.
        event_type: String,
        /// What went wrong.
        reason: String,
    },

    /// The request itself was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn display_version(actual: &Option<i64>) -> String {
    actual.map_or_else(|| "unknown".to_owned(), |v| v.to_string())
}

/// The storage backend's native failure type.
///
/// Never returned by the facade; the append engine and the paginated
/// reader translate it into a [`StoreError`].
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The stream was not at the expected version.
    #[error("wrong expected version: expected {expected}, actual {actual:?}")]
    WrongExpectedVersion {
        /// The precondition that failed.
        expected: ExpectedVersion,
        /// The stream's actual version, `None` when the stream is absent.
        actual: Option<i64>,
    },

    /// The operation did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// The connection was lost and the retry budget is exhausted.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The backend rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Translates a backend failure on `stream` into the facade taxonomy.
    ///
    /// Only a version mismatch becomes a concurrency conflict; timeouts and
    /// connection failures become `StoreUnavailable`.
    #[must_use]
    pub fn into_store_error(self, stream: &str) -> StoreError {
        match self {
            Self::WrongExpectedVersion { expected, actual } => StoreError::ConcurrencyConflict {
                stream: stream.to_owned(),
                expected,
                actual,
            },
            Self::InvalidRequest(reason) => StoreError::InvalidRequest(reason),
            other @ (Self::Timeout | Self::ConnectionClosed(_) | Self::Other(_)) => {
                StoreError::StoreUnavailable(format!("{stream}: {other}"))
            }
        }
    }
}

/// A publisher failed to deliver an event.
///
/// Logged by the facade, never escalated as an append failure.
#[derive(Debug, Clone, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_conflict_display_names_stream_and_versions() {
        let err = StoreError::ConcurrencyConflict {
            stream: "inventory_item-1".into(),
            expected: ExpectedVersion::NoStream,
            actual: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "concurrency conflict on stream inventory_item-1: expected no stream, actual 1"
        );
    }

    #[test]
    fn test_concurrency_conflict_display_with_unknown_actual() {
        let err = StoreError::ConcurrencyConflict {
            stream: "s".into(),
            expected: ExpectedVersion::Exact(3),
            actual: None,
        };
        assert!(err.to_string().ends_with("expected 3, actual unknown"));
    }

    #[test]
    fn test_decode_display() {
        let err = StoreError::Decode {
            event_type: "inventory.item_created".into(),
            reason: "unknown event type".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot decode event of type inventory.item_created: unknown event type"
        );
    }

    #[test]
    fn test_wrong_expected_version_becomes_conflict() {
        let err = BackendError::WrongExpectedVersion {
            expected: ExpectedVersion::NoStream,
            actual: Some(1),
        }
        .into_store_error("inventory_item-1");
        match err {
            StoreError::ConcurrencyConflict {
                stream,
                expected,
                actual,
            } => {
                assert_eq!(stream, "inventory_item-1");
                assert_eq!(expected, ExpectedVersion::NoStream);
                assert_eq!(actual, Some(1));
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_and_connection_loss_become_unavailable() {
        for backend_err in [
            BackendError::Timeout,
            BackendError::ConnectionClosed("reset by peer".into()),
            BackendError::Other("disk full".into()),
        ] {
            let err = backend_err.into_store_error("s");
            assert!(matches!(err, StoreError::StoreUnavailable(_)), "got {err:?}");
        }
    }

    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<StoreError>();
            assert_send_sync::<BackendError>();
            assert_send_sync::<PublishError>();
        }
    };
}
