//! Stream naming.
//!
//! Stream names are the only handle to persisted history, so the format is
//! fixed: `"{aggregate_type}-{aggregate_id}"` for aggregate streams and
//! `"$et-{event_type}"` for the backend's per-type projection streams. The
//! id is rendered in canonical lowercase hyphenated form, which always takes
//! [`uuid::fmt::Hyphenated::LENGTH`] characters, so the split point is
//! unambiguous.

use uuid::Uuid;

use crate::error::StoreError;

/// Prefix of the backend's event-type projection streams.
pub const TYPE_STREAM_PREFIX: &str = "$et-";

/// Returns the stream holding the history of one aggregate instance.
///
/// `aggregate_type` is not validated; a type starting with
/// [`TYPE_STREAM_PREFIX`] yields a projection stream name. Use
/// [`checked_aggregate_stream_name`] for caller-supplied types.
#[must_use]
pub fn aggregate_stream_name(aggregate_type: &str, aggregate_id: Uuid) -> String {
    format!("{aggregate_type}-{}", aggregate_id.hyphenated())
}

/// Like [`aggregate_stream_name`], rejecting types that could collide with
/// a projection stream.
///
/// # Errors
///
/// Returns `StoreError::InvalidRequest` if `aggregate_type` is empty or
/// starts with [`TYPE_STREAM_PREFIX`].
pub fn checked_aggregate_stream_name(
    aggregate_type: &str,
    aggregate_id: Uuid,
) -> Result<String, StoreError> {
    if aggregate_type.is_empty() {
        return Err(StoreError::InvalidRequest(
            "aggregate type must not be empty".to_owned(),
        ));
    }
    if aggregate_type.starts_with(TYPE_STREAM_PREFIX) {
        return Err(StoreError::InvalidRequest(format!(
            "aggregate type {aggregate_type} uses the reserved prefix {TYPE_STREAM_PREFIX}"
        )));
    }
    Ok(aggregate_stream_name(aggregate_type, aggregate_id))
}

/// Returns the projection stream linking every event of `event_type`.
#[must_use]
pub fn type_stream_name(event_type: &str) -> String {
    format!("{TYPE_STREAM_PREFIX}{event_type}")
}

/// Splits an aggregate stream name back into its type and id.
///
/// Returns `None` for names not produced by [`aggregate_stream_name`].
#[must_use]
pub fn parse_aggregate_stream_name(stream: &str) -> Option<(&str, Uuid)> {
    let id_len = uuid::fmt::Hyphenated::LENGTH;
    let split = stream.len().checked_sub(id_len + 1)?;
    if !stream.is_char_boundary(split) {
        return None;
    }
    let (aggregate_type, rest) = stream.split_at(split);
    let id = rest.strip_prefix('-')?;
    if aggregate_type.is_empty() {
        return None;
    }
    let aggregate_id = Uuid::try_parse(id).ok()?;
    // Reject ids that are not in the canonical form we emit.
    (aggregate_id.hyphenated().to_string() == id).then_some((aggregate_type, aggregate_id))
}

/// Returns the event type of a projection stream name.
#[must_use]
pub fn parse_type_stream_name(stream: &str) -> Option<&str> {
    stream
        .strip_prefix(TYPE_STREAM_PREFIX)
        .filter(|event_type| !event_type.is_empty())
}
