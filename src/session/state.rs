//! Conversation state machine data: the step a session is in plus the
//! recipients and message bodies accumulated so far.

use serde::{Deserialize, Serialize};

use crate::phone::PhoneNumber;

/// The steps of the broadcast conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Idle,
    WaitingNumbers,
    ConfirmingNumbers,
    WaitingMessages,
    ConfirmingMessages,
}

impl Step {
    /// Whether the session is collecting recipient numbers.
    pub fn accepts_numbers(&self) -> bool {
        matches!(self, Self::WaitingNumbers | Self::ConfirmingNumbers)
    }

    /// Whether the session is collecting message bodies.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, Self::WaitingMessages | Self::ConfirmingMessages)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WaitingNumbers => "waiting_numbers",
            Self::ConfirmingNumbers => "confirming_numbers",
            Self::WaitingMessages => "waiting_messages",
            Self::ConfirmingMessages => "confirming_messages",
        };
        write!(f, "{s}")
    }
}

/// Per-session record: current step, accumulated recipients (deduplicated,
/// insertion order preserved), and queued message bodies (duplicates
/// allowed).
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub step: Step,
    pub numbers: Vec<PhoneNumber>,
    pub messages: Vec<String>,
}

impl SessionState {
    /// Merge a batch of numbers, skipping any already present. Returns how
    /// many were actually added; merging an already-present number adds 0
    /// and leaves ordering untouched.
    pub fn merge_numbers<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = PhoneNumber>,
    {
        let mut added = 0;
        for number in batch {
            if !self.numbers.contains(&number) {
                self.numbers.push(number);
                added += 1;
            }
        }
        added
    }

    /// Queue a message body. Insertion order preserved, duplicates allowed.
    pub fn push_message(&mut self, body: impl Into<String>) {
        self.messages.push(body.into());
    }

    /// Reset to the default `{Idle, [], []}`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ── Tests ───────────────────────────────────────────────────────────
