//! Paginated forward reads.
//!
//! Stitches the backend's bounded pages into one ordered history. The
//! cursor always comes from the backend's reported next position.

use std::time::Duration;

use tracing::debug;

use crate::backend::{MAX_PAGE_SIZE, RecordedEvent, SliceStatus, StreamBackend, bounded};
use crate::error::StoreError;

/// Complete contents of a stream, or the signal that it does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHistory {
    /// The backend reported that the stream has never been written to.
    Absent,
    /// Every event of the stream in append order. May be empty.
    Present(Vec<RecordedEvent>),
}

impl StreamHistory {
    /// Returns `true` if the stream does not exist.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the events, treating an absent stream as empty.
    #[must_use]
    pub fn into_events(self) -> Vec<RecordedEvent> {
        match self {
            Self::Absent => Vec::new(),
            Self::Present(events) => events,
        }
    }
}

/// Reads the whole of `stream` forward from its first position, requesting
/// [`MAX_PAGE_SIZE`] events per page.
///
/// # Errors
///
/// Returns `StoreError::StoreUnavailable` if a page read fails or times out.
pub async fn read_all(
    backend: &dyn StreamBackend,
    stream: &str,
    operation_timeout: Duration,
) -> Result<StreamHistory, StoreError> {
    read_all_paged(backend, stream, MAX_PAGE_SIZE, operation_timeout).await
}

/// Like [`read_all`], with an explicit page size.
///
/// # Errors
///
/// Returns `StoreError::StoreUnavailable` if a page read fails or times out,
/// or if the backend's cursor stops advancing before the end of the stream.
///
/// # Panics
///
/// Panics if `page_size` is zero or exceeds [`MAX_PAGE_SIZE`].
pub async fn read_all_paged(
    backend: &dyn StreamBackend,
    stream: &str,
    page_size: usize,
    operation_timeout: Duration,
) -> Result<StreamHistory, StoreError> {
    assert!(
        (1..=MAX_PAGE_SIZE).contains(&page_size),
        "page size {page_size} outside 1..={MAX_PAGE_SIZE}"
    );

    let mut events = Vec::new();
    let mut position = 0_u64;
    let mut pages = 0_usize;

    loop {
        let slice = bounded(
            operation_timeout,
            backend.read_forward(stream, position, page_size, true),
        )
        .await
        .map_err(|e| e.into_store_error(stream))?;
        pages += 1;

        if slice.status == SliceStatus::StreamNotFound {
            if pages == 1 {
                debug!(stream, "stream absent");
                return Ok(StreamHistory::Absent);
            }
            return Err(StoreError::StoreUnavailable(format!(
                "{stream}: stream vanished at position {position}"
            )));
        }

        debug!(
            stream,
            from = position,
            count = slice.events.len(),
            next = slice.next_position,
            end = slice.is_end_of_stream,
            "read page"
        );

        events.extend(slice.events);

        if slice.is_end_of_stream {
            break;
        }
        if slice.next_position <= position {
            return Err(StoreError::StoreUnavailable(format!(
                "{stream}: cursor did not advance past position {position}"
            )));
        }
        position = slice.next_position;
    }

    debug!(stream, pages, total = events.len(), "stream read complete");
    Ok(StreamHistory::Present(events))
}
