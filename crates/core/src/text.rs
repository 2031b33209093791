//! Lightweight text helpers shared by the extractors and the prompt builder.

use sha2::{Digest, Sha256};

/// A word of the question with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// Text with surrounding punctuation removed, original casing.
    pub text: String,
    /// Lower-cased `text`.
    pub lower: String,
    /// Word index.
    pub index: usize,
    /// Byte offset of the raw token in the source string.
    pub offset: usize,
}

/// Split a question into words, stripping leading/trailing punctuation.
///
/// Tokens that are pure punctuation are skipped. Inner characters such as
/// `_`, `-`, `.` or `%` are kept so "net_revenue" and "2.5%" survive.
pub fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut offset = 0;
    for raw in text.split_whitespace() {
        let start = text[offset..].find(raw).map(|p| p + offset).unwrap_or(offset);
        offset = start + raw.len();
        let trimmed = raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '$' || c == '%'));
        if trimmed.is_empty() {
            continue;
        }
        out.push(Word {
            text: trimmed.to_string(),
            lower: trimmed.to_lowercase(),
            index: out.len(),
            offset: start,
        });
    }
    out
}

/// Index of the last word starting at or before byte `offset`.
pub fn word_index_at(words: &[Word], offset: usize) -> usize {
    words
        .iter()
        .rposition(|w| w.offset <= offset)
        .map(|i| words[i].index)
        .unwrap_or(0)
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of ASCII punctuation characters.
pub fn punctuation_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_punctuation()).count()
}

/// Case-insensitive phrase match on word boundaries.
pub fn contains_phrase(haystack_lower: &str, phrase: &str) -> bool {
    let needle = phrase.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let bytes = haystack_lower.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack_lower[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            return true;
        }
        from = start + 1;
        while !haystack_lower.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "what", "which", "who", "whom",
    "how", "why", "when", "where", "of", "for", "in", "on", "at", "to", "from", "by", "with",
    "and", "or", "but", "not", "do", "does", "did", "me", "my", "our", "we", "us", "i", "you",
    "it", "its", "this", "that", "these", "those", "there", "their", "them", "they", "can",
    "could", "would", "should", "will", "show", "give", "get", "tell", "find", "list", "all",
    "any", "some", "each", "per", "than", "as", "into", "about", "between", "much", "many",
];

pub fn is_stopword(word_lower: &str) -> bool {
    STOPWORDS.contains(&word_lower)
}

/// Hex SHA-256 of the trimmed, lower-cased question.
pub fn question_hash(question: &str) -> String {
    let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    hex_digest(normalized.as_bytes())
}

/// Deterministic cache key over `(operation, question hash, parameters)`.
pub fn cache_key(operation: &str, question_hash: &str, parameters: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(question_hash.as_bytes());
    for p in parameters {
        hasher.update([0u8]);
        hasher.update(p.as_bytes());
    }
    format!("{operation}:{}", to_hex(&hasher.finalize()))
}

fn hex_digest(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
