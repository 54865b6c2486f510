//! Prefix completion for the query language.
//!
//! Works on raw text only: the token being typed is the last
//! whitespace-delimited word before the cursor. Candidates come from the fixed
//! vocabularies in canonical order (fields, operators, functions, keywords)
//! and are kept when they start with that word, ignoring case.

use crate::vocabulary::{FIELDS, FUNCTIONS, KEYWORDS, OPERATORS};

/// Returns the byte offset where the partial token starts, and the partial token.
///
/// `cursor` is a byte offset; it is clamped to the input and moved back to the
/// nearest character boundary. Leading `(` characters are not part of the
/// partial token, so `(pri` completes like `pri`.
pub fn partial_token(raw: &str, cursor: usize) -> (usize, &str) {
    let mut end = cursor.min(raw.len());
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    let before = &raw[..end];
    let word_start = before
        .rfind(char::is_whitespace)
        .map(|i| i + before[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let word = &before[word_start..];
    let trimmed = word.trim_start_matches('(');
    (end - trimmed.len(), trimmed)
}

/// Suggests completions for the token under the cursor.
pub fn suggest(raw: &str, cursor: usize) -> Vec<String> {
    let (_, partial) = partial_token(raw, cursor);
    let partial = partial.to_lowercase();

    FIELDS
        .iter()
        .chain(OPERATORS)
        .chain(FUNCTIONS)
        .chain(KEYWORDS)
        .filter(|candidate| candidate.to_lowercase().starts_with(&partial))
        .map(|candidate| candidate.to_string())
        .collect()
}
