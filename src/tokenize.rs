//! Word splitting and length-based topic routing.

/// Split `content` into words no longer than `max_len` characters.
///
/// Runs of whitespace separate words; empty words never appear. Words keep
/// their order of appearance.
pub fn words(content: &str, max_len: usize) -> impl Iterator<Item = &str> {
    content
        .split_whitespace()
        .filter(move |word| word_length(word) <= max_len)
}

/// Length of a word in characters.
pub fn word_length(word: &str) -> usize {
    word.chars().count()
}

/// Topic a word is published to: its length as a decimal string.
pub fn topic_for(word: &str) -> String {
    word_length(word).to_string()
}
