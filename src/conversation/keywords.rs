//! Conversation control tokens.

/// Starts a new broadcast (case-insensitive).
pub const START_KEYWORD: &str = "spam";

/// Cancels the session and revokes authorization (case-insensitive).
pub const CANCEL_KEYWORD: &str = "cancelar";

/// Fires the broadcast. Case-sensitive exact literal so a casual "enviar"
/// in conversation can never trigger an early dispatch.
pub const SEND_TRIGGER: &str = "ENVIAR";

/// Closes the number-collection phase (case-insensitive).
const CONFIRM_KEYWORDS: [&str; 4] = ["confirmar", "confirm", "ok", "listo"];

pub fn is_start(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(START_KEYWORD)
}

pub fn is_cancellation(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(CANCEL_KEYWORD)
}

/// Confirmation is detected by containment, word by word, so "listo, son
/// todos" still closes the phase. The send trigger deliberately gets no
/// such leniency.
pub fn is_confirmation(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| CONFIRM_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)))
}

pub fn is_send_trigger(text: &str) -> bool {
    text.trim() == SEND_TRIGGER
}

// ── Tests ───────────────────────────────────────────────────────────
