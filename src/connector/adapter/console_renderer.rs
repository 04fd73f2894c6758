use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::application::{RetryNotice, TurnRenderer};
use crate::domain::ConnectionStatus;

const ASSISTANT_PREFIX: &str = "assistant> ";

#[derive(Default)]
struct ConsoleState {
    spinner: Option<ProgressBar>,
    /// Reply text already written to the terminal for the current turn.
    printed: String,
    input_enabled: bool,
}

/// Terminal [`TurnRenderer`]: a spinner while waiting, then the reply written
/// out incrementally as deltas arrive.
#[derive(Default)]
pub struct ConsoleRenderer {
    state: Mutex<ConsoleState>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_enabled(&self) -> bool {
        self.lock().input_enabled
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spinner() -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Thinking...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    /// Print a line without tearing the spinner.
    fn line(state: &ConsoleState, text: &str) {
        match &state.spinner {
            Some(spinner) => spinner.suspend(|| println!("{}", text)),
            None => println!("{}", text),
        }
    }

    /// Bring the terminal in line with `text`, writing only what is new.
    fn write_reply(state: &mut ConsoleState, text: &str) {
        if let Some(spinner) = state.spinner.take() {
            spinner.finish_and_clear();
        }
        let mut out = std::io::stdout().lock();
        if state.printed.is_empty() {
            let _ = write!(out, "{}", ASSISTANT_PREFIX);
        }
        match text.strip_prefix(state.printed.as_str()) {
            Some(rest) => {
                let _ = write!(out, "{}", rest);
            }
            None => {
                let _ = write!(out, "\n{}{}", ASSISTANT_PREFIX, text);
            }
        }
        let _ = out.flush();
        state.printed = text.to_string();
    }
}

impl TurnRenderer for ConsoleRenderer {
    fn show_user_message(&self, _text: &str) {
        self.lock().printed.clear();
    }

    fn show_pending(&self) {
        let mut state = self.lock();
        if let Some(old) = state.spinner.replace(Self::spinner()) {
            old.finish_and_clear();
        }
    }

    fn update_pending(&self, text: &str) {
        Self::write_reply(&mut self.lock(), text);
    }

    fn show_retry(&self, notice: &RetryNotice) {
        let mut state = self.lock();
        if !state.printed.is_empty() {
            println!();
            state.printed.clear();
        }
        if state.spinner.is_none() {
            state.spinner = Some(Self::spinner());
        }
        if let Some(spinner) = &state.spinner {
            spinner.set_message(notice.message());
        }
    }

    fn finalize_pending(&self, text: &str) {
        let mut state = self.lock();
        Self::write_reply(&mut state, text);
        println!();
        state.printed.clear();
    }

    fn show_notice(&self, message: &str) {
        Self::line(&self.lock(), &format!("[notice] {}", message));
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.lock().input_enabled = enabled;
    }

    fn show_status(&self, status: ConnectionStatus) {
        if status == ConnectionStatus::Checking {
            return;
        }
        Self::line(
            &self.lock(),
            &format!("[status] {}: {}", status.label(), status.input_hint()),
        );
    }
}
