//! Aggregate replay.

use uuid::Uuid;

use crate::event::DomainEvent;

/// An entity whose state is rebuilt by replaying its event history.
pub trait Aggregate: Send + Sync + Sized {
    /// Type name used in the aggregate's stream name.
    const AGGREGATE_TYPE: &'static str;

    /// The events this aggregate consumes.
    type Event: DomainEvent;

    /// Creates the empty state of aggregate `id`.
    fn new(id: Uuid) -> Self;

    /// Applies one event.
    fn apply(&mut self, event: &Self::Event);
}

/// Rebuilds aggregate `id` by applying `events` in order.
pub fn replay<'a, A, I>(id: Uuid, events: I) -> A
where
    A: Aggregate,
    I: IntoIterator<Item = &'a A::Event>,
{
    let mut aggregate = A::new(id);
    for event in events {
        aggregate.apply(event);
    }
    aggregate
}
