// 🏷️ Record Classifier - headquarters vs branch, derived from the code alone
//
// A SWIFT/BIC code is 8 or 11 characters:
//   BANK CC LL [BBB]
//   ^^^^^^^^ institution prefix (bank + country + location)
//            ^^^ branch part, "XXX" = primary office (headquarters)
//
// Malformed codes are accepted as-is. They just classify oddly.

use serde::{Deserialize, Serialize};

/// Literal suffix marking a headquarters code
pub const HEADQUARTERS_SUFFIX: &str = "XXX";

/// Number of leading characters shared by a headquarters and its branches
pub const PREFIX_LEN: usize = 8;

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_headquarter: bool,

    /// First 8 characters, absent for codes shorter than that
    pub prefix: Option<String>,
}

/// Classify a raw code string.
///
/// Pure and total: every input yields a result.
pub fn classify(code: &str) -> Classification {
    Classification {
        is_headquarter: is_headquarter(code),
        prefix: institution_prefix(code).map(str::to_string),
    }
}

/// True iff the code ends with the exact, case-sensitive suffix `XXX`
pub fn is_headquarter(code: &str) -> bool {
    code.ends_with(HEADQUARTERS_SUFFIX)
}

/// Borrowed first-8-characters of a code, `None` when the code is shorter.
///
/// Counts characters, not bytes, so garbage input never splits a code point.
pub fn institution_prefix(code: &str) -> Option<&str> {
    match code.char_indices().nth(PREFIX_LEN) {
        Some((end, _)) => Some(&code[..end]),
        None if code.chars().count() == PREFIX_LEN => Some(code),
        None => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
