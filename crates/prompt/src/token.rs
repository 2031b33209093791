//! Token estimation.
//!
//! A deterministic word/punctuation heuristic, not a tokenizer call:
//! `ceil((words + punctuation / 2) * multiplier)` where the multiplier
//! depends on the kind of content. Dense content (SQL, JSON, schema)
//! tokenizes into more pieces per word than prose.

use querylens_core::text::{punctuation_count, word_count};
use querylens_core::ContentType;

/// Estimate the token count of `text` for the given content type.
pub fn count_tokens(text: &str, content_type: ContentType) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    let units = word_count(text) as f64 + punctuation_count(text) as f64 / 2.0;
    (units * content_type.multiplier()).ceil() as usize
}

/// Estimate tokens for several fragments of the same type.
pub fn count_all<'a>(texts: impl IntoIterator<Item = &'a str>, content_type: ContentType) -> usize {
    texts
        .into_iter()
        .map(|t| count_tokens(t, content_type))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(count_tokens("", ContentType::Text), 0);
        assert_eq!(count_tokens("   \n", ContentType::Sql), 0);
    }

    #[test]
    fn words_and_half_punctuation() {
        // 11 words, 1 punctuation mark
        let q = "What is the total deposit amount for UK players last month?";
        assert_eq!(count_tokens(q, ContentType::Text), 12);
    }

    #[test]
    fn multiplier_rounds_up() {
        // 4 words + 2 punctuation -> 5 units
        assert_eq!(count_tokens("SELECT SUM(amount) FROM deposits", ContentType::Sql), 7);
        assert_eq!(count_tokens("a b c d e", ContentType::Schema), 6);
    }

    #[test]
    fn sums_fragments() {
        assert_eq!(count_all(["one two", "three"], ContentType::Business), 3);
    }
}
