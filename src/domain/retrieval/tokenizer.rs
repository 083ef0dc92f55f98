//! Lexical tokenization shared by indexing and querying
//!
//! Policy: text is lowercased and split on every character that is not
//! alphanumeric. CJK ideographs and kana become one token per character,
//! since word segmentation needs a dictionary.

use std::collections::BTreeMap;

/// Whether a character is indexed as a standalone token
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x309F   // Hiragana
        | 0x30A0..=0x30FF // Katakana
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x4E00..=0x9FFF // CJK Unified Ideographs
        | 0xF900..=0xFAFF // CJK Compatibility Ideographs
        | 0x20000..=0x2A6DF
    )
}

/// Split text into lexical terms
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Term frequencies of a text, sorted by term
pub fn term_frequencies(text: &str) -> Vec<(String, u32)> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

/// Distinct query terms, in first-seen order
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms = tokenize(query);
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
    terms
}
