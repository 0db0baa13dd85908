//! Message key normalization.
//!
//! A message is addressed by a key that has been folded on its first
//! character only. `Foo` and `foo` name the same message, while `fOo` and
//! `foo` do not: every character after the first keeps its case exactly.
//! Whitespace is replaced one-for-one with [`JOIN_CHAR`].
//!
//! Case mapping uses the full Unicode tables (`Ć` folds to `ć`). When a
//! mapping would expand into several characters whose own folding differs
//! (so that normalizing twice would give a different key), the character is
//! left untouched instead.

use crate::MessageKey;

/// Character substituted for whitespace in keys and page titles.
pub const JOIN_CHAR: char = '_';

/// Normalize a raw message identifier into its canonical cache key.
///
/// ```
/// use msgcache_core::normalize_key;
///
/// assert_eq!(normalize_key("Foo bar").as_str(), "foo_bar");
/// assert_eq!(normalize_key("ĆAB").as_str(), "ćAB");
/// ```
pub fn normalize_key(raw: &str) -> MessageKey {
    MessageKey::from_normalized(fold(raw, lower_first))
}

/// Upper-case the first character, leaving the rest untouched.
pub fn ucfirst(raw: &str) -> String {
    map_first(raw, upper_first)
}

/// Lower-case the first character, leaving the rest untouched.
pub fn lcfirst(raw: &str) -> String {
    map_first(raw, lower_first)
}

/// Page-title form of a key: first character upper-cased, whitespace joined.
///
/// `normalize_key(&title_key(k)) == normalize_key(k)` for every `k`.
pub fn title_key(raw: &str) -> String {
    fold(raw, upper_first)
}

fn fold(raw: &str, first: fn(char) -> String) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    if let Some(c) = chars.next() {
        push_joined(&mut out, &first(c));
    }
    for c in chars {
        out.push(join_whitespace(c));
    }
    out
}

fn map_first(raw: &str, first: fn(char) -> String) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) => {
            let mut out = first(c);
            out.push_str(chars.as_str());
            out
        }
        None => String::new(),
    }
}

fn push_joined(out: &mut String, s: &str) {
    out.extend(s.chars().map(join_whitespace));
}

fn join_whitespace(c: char) -> char {
    if c.is_whitespace() {
        JOIN_CHAR
    } else {
        c
    }
}

fn lower_first(c: char) -> String {
    let lowered: String = c.to_lowercase().collect();
    match lowered.chars().next() {
        Some(head) if head.to_lowercase().eq(std::iter::once(head)) => lowered,
        _ => c.to_string(),
    }
}

fn upper_first(c: char) -> String {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        // Only accept mappings that fold back to the original character.
        (Some(u), None) if u.to_lowercase().eq(c.to_lowercase()) => u.to_string(),
        _ => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_key_table() {
        let cases = [
            ("Foo", "foo"),
            ("foo", "foo"),
            ("fOo", "fOo"),
            ("FOO", "fOO"),
            ("Foo bar", "foo_bar"),
            ("Ćab", "ćab"),
            ("Ćab_e 3", "ćab_e_3"),
            ("ĆAB", "ćAB"),
            ("ćab", "ćab"),
            ("ćaB", "ćaB"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_key(raw).as_str(), expected, "normalizing {raw:?}");
        }
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_key("").as_str(), "");
    }

    #[test]
    fn test_whitespace_is_not_collapsed() {
        assert_eq!(normalize_key("a  b\tc").as_str(), "a__b_c");
        assert_eq!(normalize_key(" lead").as_str(), "_lead");
    }

    #[test]
    fn test_cyrillic_first_letter() {
        assert_eq!(normalize_key("Воскресенье").as_str(), "воскресенье");
    }

    #[test]
    fn test_ucfirst_and_title_key() {
        assert_eq!(ucfirst("go"), "Go");
        assert_eq!(ucfirst("ćab"), "Ćab");
        assert_eq!(ucfirst(""), "");
        assert_eq!(lcfirst("Go"), "go");
        assert_eq!(title_key("foo bar"), "Foo_bar");
    }

    #[test]
    fn test_expanding_uppercase_is_left_alone() {
        // 'ß' upper-cases to "SS", which would not fold back.
        assert_eq!(ucfirst("ßx"), "ßx");
        assert_eq!(normalize_key(&title_key("ßx")).as_str(), "ßx");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn prop_normalize_is_idempotent(raw in "\\PC{0,24}") {
            let once = normalize_key(&raw);
            let twice = normalize_key(once.as_str());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_only_first_char_changes_case(raw in "[a-zA-Z][a-zA-Z0-9]{0,16}") {
            let key = normalize_key(&raw);
            prop_assert_eq!(&key.as_str()[1..], &raw[1..]);
        }

        #[test]
        fn prop_title_key_normalizes_back(raw in "\\PC{0,24}") {
            let key = normalize_key(&raw);
            prop_assert_eq!(normalize_key(&title_key(key.as_str())), key);
        }
    }
}
