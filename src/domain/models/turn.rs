use std::sync::Arc;

use super::message::ChatMessage;
use crate::domain::DomainError;

/// Lifecycle of one chat turn.
///
/// ```text
/// idle -> sending -> streaming -> finalizing -> completed
///   |        ^  |         |            ^   |
///   |        +--+---------+ (retry)    |   +------> failed
///   +----------------------------------+ (aborted before sending)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

impl TurnState {
    pub fn can_transition_to(&self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Idle, Sending) => true,
            (Sending, Sending) | (Streaming, Sending) => true,
            (Sending, Streaming) => true,
            (Idle | Sending | Streaming, Finalizing) => true,
            (Finalizing, Completed) | (Finalizing, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Sending => "sending",
            TurnState::Streaming => "streaming",
            TurnState::Finalizing => "finalizing",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
        }
    }
}

/// The unit of work for one user message.
///
/// Holds the history snapshot every attempt re-sends, and the text
/// accumulated by the current attempt.
#[derive(Debug, Clone)]
pub struct Turn {
    snapshot: Arc<[ChatMessage]>,
    output: String,
    state: TurnState,
    attempts: u32,
}

impl Turn {
    pub fn new(snapshot: impl Into<Arc<[ChatMessage]>>) -> Self {
        Self {
            snapshot: snapshot.into(),
            output: String::new(),
            state: TurnState::Idle,
            attempts: 0,
        }
    }

    pub fn snapshot(&self) -> Arc<[ChatMessage]> {
        Arc::clone(&self.snapshot)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn transition(&mut self, next: TurnState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::internal(format!(
                "invalid turn transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Enter `sending` for a fresh attempt. Output from an interrupted
    /// attempt is discarded; the next attempt replays from the start.
    pub fn begin_attempt(&mut self) -> Result<(), DomainError> {
        self.transition(TurnState::Sending)?;
        self.attempts += 1;
        self.output.clear();
        Ok(())
    }

    pub fn mark_streaming(&mut self) -> Result<(), DomainError> {
        self.transition(TurnState::Streaming)
    }

    pub fn append(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    /// Leave `finalizing` for `completed` or `failed`.
    pub fn finish(&mut self, succeeded: bool) -> Result<(), DomainError> {
        self.transition(if succeeded {
            TurnState::Completed
        } else {
            TurnState::Failed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn() -> Turn {
        Turn::new(vec![ChatMessage::user("Hi")])
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut turn = turn();
        turn.begin_attempt().unwrap();
        turn.mark_streaming().unwrap();
        turn.append("He");
        turn.append("llo");
        turn.transition(TurnState::Finalizing).unwrap();
        turn.finish(true).unwrap();
        assert_eq!(turn.state(), TurnState::Completed);
        assert_eq!(turn.output(), "Hello");
    }

    #[test]
    fn retry_loops_back_to_sending_and_clears_output() {
        let mut turn = turn();
        turn.begin_attempt().unwrap();
        turn.mark_streaming().unwrap();
        turn.append("partial");

        turn.begin_attempt().unwrap();
        assert_eq!(turn.state(), TurnState::Sending);
        assert_eq!(turn.output(), "");
        assert_eq!(turn.attempts(), 2);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut turn = turn();
        turn.begin_attempt().unwrap();
        turn.transition(TurnState::Finalizing).unwrap();
        turn.finish(false).unwrap();
        assert_eq!(turn.state(), TurnState::Failed);

        assert!(turn.transition(TurnState::Finalizing).is_err());
        assert!(turn.finish(true).is_err());
        assert_eq!(turn.state(), TurnState::Failed);
        assert!(turn.begin_attempt().is_err());
    }

    #[test]
    fn terminal_edge_requires_finalizing() {
        let mut turn = turn();
        turn.begin_attempt().unwrap();
        turn.mark_streaming().unwrap();
        assert!(turn.finish(true).is_err());
        assert_eq!(turn.state(), TurnState::Streaming);

        let mut aborted = Turn::new(vec![ChatMessage::user("Hi")]);
        aborted.transition(TurnState::Finalizing).unwrap();
        aborted.finish(false).unwrap();
        assert_eq!(aborted.attempts(), 0);
    }

    #[test]
    fn cannot_stream_before_sending() {
        let mut turn = turn();
        assert!(turn.mark_streaming().is_err());
        assert_eq!(turn.state(), TurnState::Idle);
    }
}
