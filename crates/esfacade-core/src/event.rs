//! Domain event abstraction.

/// Trait that all persisted domain events implement.
///
/// Usually implemented by an enum whose variants wrap one payload struct
/// each. The type tag identifies the payload schema and is what the
/// [`EventCodec`](crate::codec::EventCodec) registry is keyed on.
pub trait DomainEvent: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the type tag of this event (e.g. `"inventory.item_created"`).
    fn event_type(&self) -> &'static str;

    /// Serializes the variant's payload (without the tag) to JSON.
    fn to_payload(&self) -> serde_json::Value;
}
