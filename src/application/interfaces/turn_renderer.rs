use std::time::Duration;

use crate::domain::ConnectionStatus;

/// A pending retry, announced before the controller sleeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-indexed retry number.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub reason: String,
}

impl RetryNotice {
    pub fn message(&self) -> String {
        format!(
            "Connection interrupted, reconnecting... ({}/{})",
            self.attempt, self.max_retries
        )
    }
}

/// The presentation surface a chat session drives.
///
/// Calls arrive in turn order: `show_user_message`, `show_pending`, any number
/// of `update_pending` / `show_retry`, then exactly one `finalize_pending`.
pub trait TurnRenderer: Send + Sync {
    fn show_user_message(&self, text: &str);

    /// Show the "thinking" placeholder for the assistant reply.
    fn show_pending(&self);

    /// Replace the placeholder with the cumulative reply text so far.
    fn update_pending(&self, text: &str);

    fn show_retry(&self, notice: &RetryNotice);

    /// Fix the placeholder with the final reply text.
    fn finalize_pending(&self, text: &str);

    fn show_notice(&self, message: &str);

    fn set_input_enabled(&self, enabled: bool);

    fn show_status(&self, status: ConnectionStatus);
}
