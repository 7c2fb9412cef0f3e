//! Event codec backed by an explicit type registry.
//!
//! Encoding turns an event into `(type tag, UTF-8 JSON bytes)`. Decoding
//! looks the stored tag up in the registry and deserializes the payload as
//! the registered schema, so the concrete variant is recovered from the tag
//! alone.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::backend::EventData;
use crate::error::StoreError;
use crate::event::DomainEvent;

type Decoder<E> = Box<dyn Fn(&[u8]) -> serde_json::Result<E> + Send + Sync>;

/// Bidirectional mapping between `E` and its stored form.
pub struct EventCodec<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> fmt::Debug for EventCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort_unstable();
        f.debug_struct("EventCodec").field("event_types", &tags).finish()
    }
}

impl<E: DomainEvent> Default for EventCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DomainEvent> EventCodec<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers the payload schema `P` under `event_type`, with `wrap`
    /// lifting a decoded payload into `E`.
    ///
    /// # Panics
    ///
    /// Panics if `event_type` is already registered.
    #[must_use]
    pub fn register<P>(mut self, event_type: &'static str, wrap: fn(P) -> E) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        let previous = self.decoders.insert(
            event_type,
            Box::new(move |bytes: &[u8]| serde_json::from_slice::<P>(bytes).map(wrap)),
        );
        assert!(previous.is_none(), "event type {event_type} registered twice");
        self
    }

    /// Returns `true` if `event_type` has a registered schema.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Encodes `event` with a fresh event id.
    #[must_use]
    pub fn encode(&self, event: &E) -> EventData {
        EventData {
            event_id: Uuid::new_v4(),
            event_type: event.event_type().to_owned(),
            // A serde_json::Value always serializes.
            data: serde_json::to_vec(&event.to_payload()).unwrap_or_default(),
        }
    }

    /// Rebuilds an event from its stored tag and payload.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the tag is not registered or the
    /// payload does not match the registered schema.
    pub fn decode(&self, event_type: &str, data: &[u8]) -> Result<E, StoreError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| StoreError::Decode {
                event_type: event_type.to_owned(),
                reason: "unknown event type".to_owned(),
            })?;
        decoder(data).map_err(|e| StoreError::Decode {
            event_type: event_type.to_owned(),
            reason: e.to_string(),
        })
    }
}
