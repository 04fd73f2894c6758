use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::application::{RetryNotice, TurnRenderer};
use crate::domain::ConnectionStatus;

/// One call made on a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    UserMessage(String),
    Pending,
    PendingUpdated(String),
    Retry(u32),
    Finalized(String),
    Notice(String),
    InputEnabled(bool),
    Status(ConnectionStatus),
}

/// Headless [`TurnRenderer`] that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.lock().clone()
    }

    /// Return the recorded events and start over.
    pub fn take_events(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn notices(&self) -> Vec<String> {
        self.collect(|e| match e {
            RenderEvent::Notice(n) => Some(n.clone()),
            _ => None,
        })
    }

    pub fn pending_updates(&self) -> Vec<String> {
        self.collect(|e| match e {
            RenderEvent::PendingUpdated(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn finalized(&self) -> Vec<String> {
        self.collect(|e| match e {
            RenderEvent::Finalized(text) => Some(text.clone()),
            _ => None,
        })
    }

    /// The most recent input state; input starts out disabled.
    pub fn input_enabled(&self) -> bool {
        self.lock()
            .iter()
            .rev()
            .find_map(|e| match e {
                RenderEvent::InputEnabled(enabled) => Some(*enabled),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn collect<T>(&self, pick: impl Fn(&RenderEvent) -> Option<T>) -> Vec<T> {
        self.lock().iter().filter_map(pick).collect()
    }

    fn record(&self, event: RenderEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RenderEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TurnRenderer for RecordingRenderer {
    fn show_user_message(&self, text: &str) {
        self.record(RenderEvent::UserMessage(text.to_string()));
    }

    fn show_pending(&self) {
        self.record(RenderEvent::Pending);
    }

    fn update_pending(&self, text: &str) {
        self.record(RenderEvent::PendingUpdated(text.to_string()));
    }

    fn show_retry(&self, notice: &RetryNotice) {
        self.record(RenderEvent::Retry(notice.attempt));
    }

    fn finalize_pending(&self, text: &str) {
        self.record(RenderEvent::Finalized(text.to_string()));
    }

    fn show_notice(&self, message: &str) {
        self.record(RenderEvent::Notice(message.to_string()));
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.record(RenderEvent::InputEnabled(enabled));
    }

    fn show_status(&self, status: ConnectionStatus) {
        self.record(RenderEvent::Status(status));
    }
}
