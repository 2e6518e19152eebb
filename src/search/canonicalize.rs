//! Text canonicalization applied before tokenization.
//!
//! Corpus text arrives from TEI extraction with arbitrary whitespace and, for
//! polytonic Greek in particular, sometimes in decomposed Unicode form. The
//! tokenizer only accepts precomposed letters, so a decomposed "ἐν" would be
//! split on its combining accent. Canonicalization makes the same visual text
//! produce the same tokens, and therefore the same vector, at build and query
//! time.
//!
//! # Processing Pipeline
//!
//! 1. **Unicode NFC normalization** - "ε\u{0301}" → "έ"
//! 2. **Whitespace normalization** - collapse runs, trim

use unicode_normalization::UnicodeNormalization;

/// Characters kept in a document's metadata snippet.
pub const SNIPPET_CHARS: usize = 400;

/// Canonicalize text for tokenization and embedding.
///
/// The output is deterministic: the same visual input always produces the
/// same output.
pub fn canonicalize_for_embedding(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    normalize_whitespace(&normalized)
}

/// Join the main and annotation fields of a document into one canonical body.
pub fn combine_fields(main: &str, notes: &str) -> String {
    let mut joined = String::with_capacity(main.len() + notes.len() + 1);
    joined.push_str(main);
    joined.push(' ');
    joined.push_str(notes);
    canonicalize_for_embedding(&joined)
}

/// Normalize whitespace: collapse runs to a single space, trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_whitespace = true; // Start as true to trim leading

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_whitespace {
                result.push(' ');
                prev_whitespace = true;
            }
        } else {
            result.push(c);
            prev_whitespace = false;
        }
    }

    result.trim_end().to_string()
}

/// Truncate string to at most N characters, respecting char boundaries.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Split canonical text into pieces of at most `max_chars` characters for
/// backends with a bounded input window.
///
/// A piece ends after the last `.` in its window when that falls in the
/// second half of the window; otherwise it is cut hard at `max_chars`.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_len {
        let end = (start + max_chars).min(char_len);
        let mut cut = end;
        if end < char_len {
            let window = &text[bounds[start]..bounds[end]];
            if let Some(dot) = window.rfind('.') {
                let after_dot = text[..bounds[start] + dot + 1].chars().count();
                if after_dot >= start + max_chars / 2 && after_dot > start {
                    cut = after_dot;
                }
            }
        }
        let piece = text[bounds[start]..bounds[cut]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        start = cut;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_nfc_normalization() {
        let composed = "caf\u{00E9}";
        let decomposed = "cafe\u{0301}";
        assert_ne!(composed, decomposed);

        assert_eq!(
            canonicalize_for_embedding(composed),
            canonicalize_for_embedding(decomposed)
        );
    }

    #[test]
    fn test_polytonic_greek_composes() {
        // epsilon + combining psili + combining acute
        let decomposed = "\u{03B5}\u{0313}\u{0301}ν";
        let canonical = canonicalize_for_embedding(decomposed);
        assert_eq!(canonical.chars().count(), 2);
        assert!(canonical.starts_with('\u{1F14}'));
    }

    #[test]
    fn test_whitespace_normalization() {
        assert_eq!(normalize_whitespace("  a \n\t b   c  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \n "), "");
    }

    #[test]
    fn test_combine_fields() {
        assert_eq!(combine_fields("Text  main", "\nnotes "), "Text main notes");
        assert_eq!(combine_fields("", ""), "");
        assert_eq!(combine_fields("only", ""), "only");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "θεοτόκος";
        assert_eq!(truncate_to_chars(text, 3), "θεο");
        assert_eq!(truncate_to_chars(text, 100), text);
        assert_eq!(truncate_to_chars("", 5), "");
    }

    #[test]
    fn test_chunk_text_short_input_single_chunk() {
        assert_eq!(chunk_text("kurz.", 4000), vec!["kurz."]);
        assert!(chunk_text("", 4000).is_empty());
    }

    #[test]
    fn test_chunk_text_prefers_sentence_boundary() {
        let text = "Erster Satz hier. Zweiter Satz folgt";
        let chunks = chunk_text(text, 20);
        assert_eq!(chunks[0], "Erster Satz hier.");
        assert_eq!(chunks.concat().replace(' ', ""), text.replace(' ', ""));
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn test_chunk_text_hard_cut_without_boundary() {
        let text = "θ".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].chars().count(), 5);
    }
}
