//! Jitter policy for the dispatch loop.
//!
//! Randomized gaps between sends avoid fixed-interval patterns the
//! platform's anti-abuse detection keys on. Bounds are configurable so
//! tests can inject a zero-delay policy.

use std::time::Duration;

use rand::Rng;

/// Inclusive min/max bounds for one gap, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl GapRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        // Normalize inverted bounds rather than panicking mid-dispatch.
        if min_ms <= max_ms {
            Self { min_ms, max_ms }
        } else {
            Self {
                min_ms: max_ms,
                max_ms: min_ms,
            }
        }
    }

    pub fn zero() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Draw a uniformly distributed duration within the bounds.
    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Pacing for a dispatch run: one gap between recipients, a shorter one
/// between payloads to the same recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterPolicy {
    pub recipient_gap: GapRange,
    pub payload_gap: GapRange,
}

impl Default for JitterPolicy {
    fn default() -> Self {
        Self {
            recipient_gap: GapRange::new(3000, 8000),
            payload_gap: GapRange::new(1000, 3000),
        }
    }
}

impl JitterPolicy {
    /// No delays at all. For tests.
    pub fn zero() -> Self {
        Self {
            recipient_gap: GapRange::zero(),
            payload_gap: GapRange::zero(),
        }
    }

    /// Build the policy from environment variables, falling back to the
    /// baseline bounds.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            recipient_gap: GapRange::new(
                env_ms("DISPATCH_RECIPIENT_GAP_MIN_MS", defaults.recipient_gap.min_ms),
                env_ms("DISPATCH_RECIPIENT_GAP_MAX_MS", defaults.recipient_gap.max_ms),
            ),
            payload_gap: GapRange::new(
                env_ms("DISPATCH_PAYLOAD_GAP_MIN_MS", defaults.payload_gap.min_ms),
                env_ms("DISPATCH_PAYLOAD_GAP_MAX_MS", defaults.payload_gap.max_ms),
            ),
        }
    }
}

fn env_ms(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// ── Tests ───────────────────────────────────────────────────────────
