//! `EventPublisher` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use esfacade_core::error::PublishError;
use esfacade_core::event::DomainEvent;
use esfacade_core::publisher::EventPublisher;

/// A publisher that records every event it receives, in order.
#[derive(Debug)]
pub struct RecordingPublisher<E> {
    published: Mutex<Vec<E>>,
}

impl<E> Default for RecordingPublisher<E> {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> RecordingPublisher<E> {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all published events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<E> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl<E: DomainEvent> EventPublisher<E> for RecordingPublisher<E> {
    async fn publish(&self, event: &E) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A publisher that rejects every event and counts the attempts.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    attempts: AtomicUsize,
}

impl FailingPublisher {
    /// Number of publish calls received.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: DomainEvent> EventPublisher<E> for FailingPublisher {
    async fn publish(&self, _event: &E) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError("bus offline".into()))
    }
}
