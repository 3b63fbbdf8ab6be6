//! Key normalization for status lookups.

use serde::{Deserialize, Serialize};

const INTERNATIONAL_PREFIX: &str = "+92";
const TRUNK_PREFIX: &str = "0";

/// Store fields a status lookup can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupField {
    /// Case-insensitive exact match on the stored email.
    Email,
    /// Exact match on either the applicant or guardian phone.
    Phone,
    TransactionId,
}

impl LookupField {
    pub const fn label(self) -> &'static str {
        match self {
            LookupField::Email => "email",
            LookupField::Phone => "phone",
            LookupField::TransactionId => "transactionId",
        }
    }
}

/// Canonical phone format: separators stripped, `+92` rewritten to the local
/// trunk prefix `0`.
pub fn normalize_phone(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();

    match compact.strip_prefix(INTERNATIONAL_PREFIX) {
        Some(rest) => format!("{TRUNK_PREFIX}{rest}"),
        None => compact,
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Ordered phone keys to try: the normalized form first, then the raw value
/// for records stored before normalization existed.
pub fn phone_candidates(raw: &str) -> Vec<String> {
    let normalized = normalize_phone(raw);
    let original = raw.trim().to_string();

    let mut candidates = vec![normalized];
    if !original.is_empty() && !candidates.contains(&original) {
        candidates.push(original);
    }
    candidates.retain(|candidate| !candidate.is_empty());
    candidates
}
