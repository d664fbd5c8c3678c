//! Character-based token estimation
//!
//! The gateway bills by token counts. When the upstream provider reports
//! usage figures those are authoritative; this estimator covers the pre-flight
//! admission check and responses that arrive without a usage block. The policy
//! is `ceil(chars / 3)`, matching the resale price calibration.

use thiserror::Error;

/// Hard cap on text length accepted for estimation, bounding both request
/// size and the cost of the estimate itself.
pub const MAX_MESSAGE_CHARS: usize = 100_000;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 3;

/// Estimation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenEstimateError {
    #[error("text too large: {length} characters exceeds the {limit} maximum")]
    PayloadTooLarge { length: usize, limit: usize },
}

/// Estimate the token count of `text` as `ceil(chars / 3)`.
///
/// Pure and deterministic. Fails with [`TokenEstimateError::PayloadTooLarge`]
/// when the text exceeds [`MAX_MESSAGE_CHARS`].
pub fn estimate_tokens(text: &str) -> Result<u64, TokenEstimateError> {
    let length = text.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(TokenEstimateError::PayloadTooLarge {
            length,
            limit: MAX_MESSAGE_CHARS,
        });
    }
    Ok(estimate_tokens_uncapped(text))
}

/// Estimate without the size cap. The cap bounds text the gateway accepts
/// from callers; provider output in a response lacking a usage block still
/// has to be billed whatever its length.
pub fn estimate_tokens_uncapped(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens("").unwrap(), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a").unwrap(), 1);
        assert_eq!(estimate_tokens("abc").unwrap(), 1);
        assert_eq!(estimate_tokens("abcd").unwrap(), 2);
        assert_eq!(estimate_tokens("abcdef").unwrap(), 2);
        assert_eq!(estimate_tokens("abcdefg").unwrap(), 3);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 3 multi-byte characters -> 1 token
        assert_eq!(estimate_tokens("日本語").unwrap(), 1);
    }

    #[test]
    fn test_deterministic() {
        let text = "the same text estimated twice";
        assert_eq!(
            estimate_tokens(text).unwrap(),
            estimate_tokens(text).unwrap()
        );
    }

    #[test]
    fn test_at_limit_accepted() {
        let text = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(estimate_tokens(&text).is_ok());
    }

    #[test]
    fn test_uncapped_agrees_with_capped_within_limit() {
        let text = "a short reply";
        assert_eq!(estimate_tokens(text).unwrap(), estimate_tokens_uncapped(text));
    }

    #[test]
    fn test_uncapped_accepts_over_limit_text() {
        let text = "x".repeat(MAX_MESSAGE_CHARS + 2);
        assert_eq!(
            estimate_tokens_uncapped(&text),
            (MAX_MESSAGE_CHARS + 2).div_ceil(3) as u64
        );
    }

    #[test]
    fn test_over_limit_rejected() {
        let text = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            estimate_tokens(&text),
            Err(TokenEstimateError::PayloadTooLarge {
                length: MAX_MESSAGE_CHARS + 1,
                limit: MAX_MESSAGE_CHARS,
            })
        );
    }
}
