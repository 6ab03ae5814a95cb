//! Recipient identifier handling: normalization and extraction.

pub mod extract;
pub mod normalize;

pub use extract::{extract_from_file, extract_from_text};
pub use normalize::{normalize, normalize_strict, PhoneNumber, COUNTRY_PREFIX};
