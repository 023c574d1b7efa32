//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, which is
//! close enough for BPE tokenizers on English text and JSON.

use serde::Serialize;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a value as it would be sent: compact JSON.
pub fn estimate_json_tokens<T: Serialize + ?Sized>(value: &T) -> usize {
    let json = serde_json::to_string(value).unwrap_or_default();
    estimate_tokens(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn json_is_measured_compact() {
        // {"a":1} is 7 chars
        assert_eq!(estimate_json_tokens(&serde_json::json!({"a": 1})), 2);
    }
}
