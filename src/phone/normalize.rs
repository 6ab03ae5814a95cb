//! Phone number canonicalization for the Peruvian mobile numbering plan.
//!
//! Canonical form is `51` followed by a 9-digit subscriber number that
//! always starts with `9`. Numbers are never mutated once produced;
//! equality is exact string match.

use std::fmt;

use serde::Serialize;

/// Country calling code the canonical form is anchored to.
pub const COUNTRY_PREFIX: &str = "51";

/// Subscriber numbers are 9 digits.
const SUBSCRIBER_LEN: usize = 9;

/// Canonical length: country prefix + subscriber number.
const CANONICAL_LEN: usize = COUNTRY_PREFIX.len() + SUBSCRIBER_LEN;

/// A canonicalized recipient phone number.
///
/// Can only be produced by [`normalize`] or [`normalize_strict`], so every
/// value in circulation holds the canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize a free-form identifier, stripping all non-digit characters
/// first. Total and deterministic; returns `None` for every shape that is
/// not a valid mobile number.
pub fn normalize(raw: &str) -> Option<PhoneNumber> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    canonicalize(&digits)
}

/// Lenient-separator variant: strips only whitespace, hyphens, dots,
/// parentheses, and a leading `+`. Any other non-digit character rejects
/// the whole candidate.
pub fn normalize_strict(raw: &str) -> Option<PhoneNumber> {
    let mut digits = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            '+' | '-' | '.' | '(' | ')' => {}
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    canonicalize(&digits)
}

/// Shape check over a cleaned digit string:
/// - 9 digits starting with `9` → prefix the country code
/// - 11 digits starting with `51` and a `9` right after → accept as-is
/// - anything else → invalid
fn canonicalize(digits: &str) -> Option<PhoneNumber> {
    if digits.len() == SUBSCRIBER_LEN && digits.starts_with('9') {
        return Some(PhoneNumber(format!("{COUNTRY_PREFIX}{digits}")));
    }
    if digits.len() == CANONICAL_LEN
        && digits.starts_with(COUNTRY_PREFIX)
        && digits[COUNTRY_PREFIX.len()..].starts_with('9')
    {
        return Some(PhoneNumber(digits.to_string()));
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────
