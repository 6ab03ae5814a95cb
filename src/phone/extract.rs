//! Identifier extraction from free text and line-oriented files.
//!
//! Two strategies: line/separator mode first, pattern-scan fallback when it
//! yields nothing. Both deduplicate on the canonical number and preserve
//! first-seen order.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::AsyncBufReadExt;

use crate::error::ExtractError;

use super::normalize::{normalize, normalize_strict, PhoneNumber};

/// Loose shape for the pattern scan: optional `+`/country prefix, then a
/// subscriber-like run of digits and separators, 8-21 characters long.
static CANDIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?(?:51[\s.\-]*)?9[\d\s.\-()]{7,20}").expect("candidate pattern must compile")
});

/// Collects normalized numbers, dropping duplicates while preserving
/// first-seen order.
struct OrderedSet {
    seen: HashSet<PhoneNumber>,
    numbers: Vec<PhoneNumber>,
}

impl OrderedSet {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            numbers: Vec::new(),
        }
    }

    fn insert(&mut self, number: PhoneNumber) {
        if self.seen.insert(number.clone()) {
            self.numbers.push(number);
        }
    }

    fn into_vec(self) -> Vec<PhoneNumber> {
        self.numbers
    }

    fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

/// Extract valid numbers from free text.
///
/// Line/separator mode splits on line breaks, commas, and semicolons and
/// normalizes each trimmed fragment as a whole candidate. When that finds
/// nothing, a pattern scan over the raw text picks up numbers embedded in
/// prose.
pub fn extract_from_text(text: &str) -> Vec<PhoneNumber> {
    let mut out = OrderedSet::new();

    for fragment in text.split(['\n', ',', ';']) {
        if let Some(number) = normalize_strict(fragment.trim()) {
            out.insert(number);
        }
    }

    if out.is_empty() {
        for m in CANDIDATE_PATTERN.find_iter(text) {
            if let Some(number) = normalize(m.as_str()) {
                out.insert(number);
            }
        }
    }

    out.into_vec()
}

/// Extract valid numbers from a line-oriented file (CSV/TXT), streamed
/// line by line. Only the first delimiter-separated field per line is a
/// candidate.
pub async fn extract_from_file(path: &Path) -> Result<Vec<PhoneNumber>, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.display().to_string()));
    }

    let file = tokio::fs::File::open(path).await?;
    let reader = tokio::io::BufReader::new(file);
    let mut lines = reader.lines();

    let mut out = OrderedSet::new();
    while let Some(line) = lines.next_line().await? {
        let candidate = line
            .split([',', ';', '\t'])
            .next()
            .unwrap_or_default()
            .trim();
        if let Some(number) = normalize_strict(candidate) {
            out.insert(number);
        }
    }

    Ok(out.into_vec())
}

// ── Tests ───────────────────────────────────────────────────────────
