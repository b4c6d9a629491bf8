//! Efficient text processing utilities

use std::borrow::Cow;
use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref SENTENCE_END_REGEX: Regex = Regex::new(r#"[.!?]['")\]]*\s+"#).unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Normalize whitespace efficiently
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Truncate text to max length with ellipsis if needed. Never splits a
    /// UTF-8 character.
    pub fn truncate_with_ellipsis(text: &str, max_len: usize) -> Cow<'_, str> {
        if text.len() <= max_len {
            return Cow::Borrowed(text);
        }
        if max_len <= 3 {
            return Cow::Borrowed("...");
        }
        let mut cut = max_len - 3;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut result = String::with_capacity(max_len);
        result.push_str(&text[..cut]);
        result.push_str("...");
        Cow::Owned(result)
    }

    /// Split text into sentences, keeping terminal punctuation with each
    /// sentence. A trailing fragment without punctuation is returned as the
    /// final sentence.
    pub fn split_sentences(text: &str) -> Vec<&str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in SENTENCE_END_REGEX.find_iter(text) {
            let end = m.end();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }

        sentences
    }

    /// Keep only the first `n` sentences of `text`.
    pub fn first_sentences(text: &str, n: usize) -> String {
        Self::split_sentences(text)
            .into_iter()
            .take(n)
            .collect::<Vec<&str>>()
            .join(" ")
    }
}
