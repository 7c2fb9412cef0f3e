//! Connection lifecycle observation.
//!
//! Backends report lifecycle changes through a [`ConnectionObserver`]
//! supplied at construction. These are observability signals only: they
//! never fail an in-flight operation on their own.

use tracing::{error, info};

/// Callbacks for backend connection lifecycle changes.
pub trait ConnectionObserver: Send + Sync {
    /// The backend established its connection.
    fn on_connected(&self, _endpoint: &str) {}

    /// The connection was lost.
    fn on_disconnected(&self);

    /// The backend is about to retry; `attempt` starts at 1.
    fn on_reconnecting(&self, attempt: u32);

    /// The backend hit an error it will not retry.
    fn on_error(&self, error: &dyn std::error::Error);
}

/// Reports lifecycle changes through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_connected(&self, endpoint: &str) {
        info!(endpoint, "event store connected");
    }

    fn on_disconnected(&self) {
        error!("event store disconnected");
    }

    fn on_reconnecting(&self, attempt: u32) {
        error!(attempt, "event store reconnecting");
    }

    fn on_error(&self, err: &dyn std::error::Error) {
        error!(error = %err, "event store error occurred");
    }
}
