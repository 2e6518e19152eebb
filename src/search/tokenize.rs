//! Script-aware tokenizer for the multilingual corpus.
//!
//! A token is a maximal run of letters from the accepted ranges (basic Latin,
//! Latin-1 Supplement through Latin Extended-B, Greek and Coptic, Greek
//! Extended), lower-cased, at least two characters long and not a stopword.
//! Everything else (digits, punctuation, combining marks, other scripts) is a
//! boundary.
//!
//! [`tokenize`] returns a lazy iterator borrowing the input; calling it again
//! on the same text yields the same sequence.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Tokens shorter than this (in characters) are dropped.
pub const MIN_TOKEN_CHARS: usize = 2;

/// German, English and Latin function words.
const STOPWORD_LIST: &str = "
    der die das des dem den und oder ein eine eines einer einem einen
    mit von zu zum zur im in am an auf aus bei durch für gegen ohne um
    ist sind war waren wird werden wurde wurden sein seine seinen ihrer ihre
    the and of to in for on with a an is are was were be been being
    et non sed nec ut ad ex qui quae quod
";

static STOPWORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOPWORD_LIST.split_whitespace().collect());

/// Whether `token` (already lower-cased) is in the stopword set.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Number of distinct stopwords; recorded in the index summary.
pub fn stopword_count() -> usize {
    STOPWORDS.len()
}

/// Whether `c` belongs to one of the accepted letter ranges.
#[inline]
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphabetic()
        || ('\u{00C0}'..='\u{024F}').contains(&c)
        || ('\u{0370}'..='\u{03FF}').contains(&c)
        || ('\u{1F00}'..='\u{1FFF}').contains(&c)
}

/// Split raw text into normalized, filtered tokens.
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens { rest: text }
}

/// Iterator returned by [`tokenize`].
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let start = self.rest.find(is_token_char)?;
            let tail = &self.rest[start..];
            let end = tail.find(|c: char| !is_token_char(c)).unwrap_or(tail.len());
            let raw = &tail[..end];
            self.rest = &tail[end..];

            if raw.chars().nth(MIN_TOKEN_CHARS - 1).is_none() {
                continue;
            }
            let token = raw.to_lowercase();
            if is_stopword(&token) {
                continue;
            }
            return Some(token);
        }
    }
}
