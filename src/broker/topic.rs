//! Routing-key matching for topic exchanges.
//!
//! Keys and patterns are `.`-separated words. In a pattern `*` matches exactly
//! one word and `#` matches zero or more words.

/// Returns true when `routing_key` matches the binding `pattern`.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_words(rest, &key[1..]),
        Some((word, rest)) => key
            .split_first()
            .is_some_and(|(first, key_rest)| first == word && matches_words(rest, key_rest)),
    }
}
