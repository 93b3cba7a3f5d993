//! Term extraction for the membership index.
//!
//! Pipeline: lowercase → whitespace split → trim leading/trailing ASCII
//! punctuation → drop tokens shorter than [`MIN_TOKEN_LEN`] characters →
//! de-duplicate (first occurrence wins).
//!
//! Indexing and querying share this function, so a query term matches a show
//! exactly when both produce the same token.

use smallvec::SmallVec;
use std::collections::HashSet;

/// Minimum token length, in characters.
pub const MIN_TOKEN_LEN: usize = 3;

/// Tokens for one piece of text. Most show names fit inline.
pub type Tokens = SmallVec<[String; 8]>;

/// Tokenize text into unique index terms.
///
/// # Example
///
/// ```
/// use theater_core::tokenizer::tokenize;
///
/// let tokens = tokenize("The Opera House, Opera!");
/// assert_eq!(tokens.as_slice(), ["the", "opera", "house"]);
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Tokens {
    tokens_of(text.split_whitespace())
}

/// Terms indexed for a show: tokens of its name followed by its details.
#[must_use]
pub fn show_terms(name: &str, details: &str) -> Tokens {
    tokens_of(name.split_whitespace().chain(details.split_whitespace()))
}

fn tokens_of<'a>(words: impl Iterator<Item = &'a str>) -> Tokens {
    let mut seen = HashSet::new();
    words
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|token| seen.insert(token.clone()))
        .collect()
}
