//! Observer that records connection lifecycle callbacks.

use std::sync::Mutex;

use esfacade_core::observer::ConnectionObserver;

/// One lifecycle callback received by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// `on_connected(endpoint)`.
    Connected(String),
    /// `on_disconnected()`.
    Disconnected,
    /// `on_reconnecting(attempt)`.
    Reconnecting(u32),
    /// `on_error(error)`, with the error's display text.
    Error(String),
}

/// An observer that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    signals: Mutex<Vec<LifecycleSignal>>,
}

impl RecordingObserver {
    /// Returns a snapshot of the callbacks received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn signals(&self) -> Vec<LifecycleSignal> {
        self.signals.lock().unwrap().clone()
    }

    fn record(&self, signal: LifecycleSignal) {
        self.signals.lock().unwrap().push(signal);
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_connected(&self, endpoint: &str) {
        self.record(LifecycleSignal::Connected(endpoint.to_owned()));
    }

    fn on_disconnected(&self) {
        self.record(LifecycleSignal::Disconnected);
    }

    fn on_reconnecting(&self, attempt: u32) {
        self.record(LifecycleSignal::Reconnecting(attempt));
    }

    fn on_error(&self, error: &dyn std::error::Error) {
        self.record(LifecycleSignal::Error(error.to_string()));
    }
}
