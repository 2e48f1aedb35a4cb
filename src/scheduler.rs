/// Cancellable delayed tasks, independent of the host's timer primitive
///
/// The agent never holds a real timer. It asks the host to start or clear one
/// by token and accepts a firing only if that token is still the live one, so a
/// callback that races a cancellation is harmless.
use serde::{Deserialize, Serialize};

pub type TimerToken = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TimerCommand {
    #[serde(rename_all = "camelCase")]
    Schedule { token: TimerToken, delay_ms: u32 },
    Cancel { token: TimerToken },
}

/// At most one pending task; scheduling again pushes it back
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: u32,
    next_token: TimerToken,
    pending: Option<TimerToken>,
}

impl Debouncer {
    pub fn new(delay_ms: u32) -> Self {
        Debouncer {
            delay_ms,
            next_token: 1,
            pending: None,
        }
    }

    /// Start the quiet period over, cancelling whatever was pending
    pub fn schedule(&mut self) -> Vec<TimerCommand> {
        let mut commands: Vec<TimerCommand> = self.cancel_pending().into_iter().collect();

        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.pending = Some(token);

        commands.push(TimerCommand::Schedule {
            token,
            delay_ms: self.delay_ms,
        });
        commands
    }

    pub fn cancel_pending(&mut self) -> Option<TimerCommand> {
        self.pending.take().map(|token| TimerCommand::Cancel { token })
    }

    /// Consume a timer firing. True only for the live token.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        if self.pending == Some(token) {
            self.pending = None;
            true
        } else {
            log::debug!("Ignoring stale timer {}", token);
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
