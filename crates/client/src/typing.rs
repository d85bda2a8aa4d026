//! Typing signal debouncer
//!
//! Keystrokes arrive far faster than the server needs to hear about them.
//! The debouncer emits `true` once when composing starts, and `false` on
//! submit or after the idle window passes without input. The caller ticks
//! [`TypingDebouncer::poll_idle`] (a UI timer) and forwards emitted values as
//! `set_typing` events. The clock is passed in so tests control time.

use std::time::{Duration, Instant};

/// Idle window after the last keystroke before typing is considered stopped.
pub const TYPING_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct TypingDebouncer {
    idle_timeout: Duration,
    typing: bool,
    last_input: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new() -> Self {
        Self::with_timeout(TYPING_IDLE_TIMEOUT)
    }

    pub fn with_timeout(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            typing: false,
            last_input: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// A keystroke happened. Emits `Some(true)` only for the first one after
    /// an idle or submitted state.
    pub fn on_input(&mut self, now: Instant) -> Option<bool> {
        self.last_input = Some(now);
        if self.typing {
            None
        } else {
            self.typing = true;
            Some(true)
        }
    }

    /// The message was submitted. Emits `Some(false)` if a start was emitted.
    pub fn on_submit(&mut self) -> Option<bool> {
        self.last_input = None;
        if self.typing {
            self.typing = false;
            Some(false)
        } else {
            None
        }
    }

    /// Periodic tick. Emits `Some(false)` once the idle window has elapsed
    /// since the last keystroke.
    pub fn poll_idle(&mut self, now: Instant) -> Option<bool> {
        if !self.typing {
            return None;
        }
        let last = self.last_input?;
        if now.duration_since(last) >= self.idle_timeout {
            self.typing = false;
            self.last_input = None;
            Some(false)
        } else {
            None
        }
    }
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
