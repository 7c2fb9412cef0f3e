//! Shared test backends, publishers and fixtures for esfacade.

mod backend;
pub mod inventory;
mod observer;
mod publisher;

pub use backend::{FailingBackend, InMemoryBackend, ReadRequest, StallingBackend};
pub use observer::{LifecycleSignal, RecordingObserver};
pub use publisher::{FailingPublisher, RecordingPublisher};
