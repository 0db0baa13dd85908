//! MSGCACHE Core - Message Cache Types
//!
//! Pure data structures shared by the cache layers: message keys, language
//! codes, fallback chains, cached values and transaction epochs, plus key
//! normalization and configuration. No I/O lives here.

pub mod config;
pub mod error;
pub mod normalize;
pub mod title;

pub use config::MessageCacheConfig;
pub use error::{
    ConfigError, InvariantViolation, MsgCacheError, MsgCacheResult, SourceError,
    TransactionError, ValidationError,
};
pub use normalize::{lcfirst, normalize_key, title_key, ucfirst, JOIN_CHAR};
pub use title::{figure_message, page_name, PageChange};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// MESSAGE KEYS
// ============================================================================

/// Normalized message key.
///
/// Can only be produced through [`normalize_key`], so two keys compare equal
/// exactly when they address the same message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MessageKey(String);

impl MessageKey {
    /// Normalize `raw` into a key. Equivalent to [`normalize_key`].
    pub fn new(raw: impl AsRef<str>) -> Self {
        normalize_key(raw.as_ref())
    }

    pub(crate) fn from_normalized(normalized: String) -> Self {
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Title-cased form used for message page names (`go` -> `Go`).
    pub fn to_title(&self) -> String {
        title_key(&self.0)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageKey {
    /// Normalizes; deserialized keys go through here too.
    fn from(raw: String) -> Self {
        normalize_key(&raw)
    }
}

impl From<MessageKey> for String {
    fn from(key: MessageKey) -> Self {
        key.0
    }
}

impl AsRef<str> for MessageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// LANGUAGE CODES
// ============================================================================

/// Maximum accepted length for a language code.
pub const MAX_LANGUAGE_CODE_LEN: usize = 35;

/// Opaque language identifier (`de`, `ru`, `zh-hans`).
///
/// Codes are stored lower-case and carry no ordering of their own; the only
/// meaningful order between languages is the one a [`FallbackChain`] gives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Parse and validate a language code.
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        if code.is_empty() {
            return Err(ValidationError::InvalidLanguageCode {
                code: code.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if code.len() > MAX_LANGUAGE_CODE_LEN {
            return Err(ValidationError::InvalidLanguageCode {
                code: code.to_string(),
                reason: format!("longer than {MAX_LANGUAGE_CODE_LEN} characters"),
            });
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ValidationError::InvalidLanguageCode {
                code: code.to_string(),
                reason: "only ASCII letters, digits and '-' are allowed".to_string(),
            });
        }
        if code.starts_with('-') || code.ends_with('-') {
            return Err(ValidationError::InvalidLanguageCode {
                code: code.to_string(),
                reason: "must not start or end with '-'".to_string(),
            });
        }
        Ok(Self(code.to_ascii_lowercase()))
    }

    /// Returns true if `code` would parse.
    pub fn is_valid(code: &str) -> bool {
        Self::parse(code).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

impl AsRef<str> for LanguageCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// FALLBACK CHAINS
// ============================================================================

/// Ordered list of languages probed for a message.
///
/// Invariants:
/// - the first element is the requested language
/// - the content language is present, and last unless it was requested
/// - no language appears twice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackChain {
    languages: Vec<LanguageCode>,
    content: LanguageCode,
}

impl FallbackChain {
    /// Build a chain from a requested language, its graph fallbacks and the
    /// content language. The first occurrence of a language wins; the content
    /// language is held back from the graph order and appended at the end.
    pub fn build<I>(requested: &LanguageCode, fallbacks: I, content: &LanguageCode) -> Self
    where
        I: IntoIterator<Item = LanguageCode>,
    {
        let mut languages: Vec<LanguageCode> = vec![requested.clone()];
        for lang in fallbacks {
            if lang != *content && !languages.contains(&lang) {
                languages.push(lang);
            }
        }
        if !languages.contains(content) {
            languages.push(content.clone());
        }
        Self {
            languages,
            content: content.clone(),
        }
    }

    pub fn requested(&self) -> &LanguageCode {
        &self.languages[0]
    }

    pub fn content_language(&self) -> &LanguageCode {
        &self.content
    }

    pub fn languages(&self) -> &[LanguageCode] {
        &self.languages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LanguageCode> {
        self.languages.iter()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Always false; a chain holds at least the requested language.
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl<'a> IntoIterator for &'a FallbackChain {
    type Item = &'a LanguageCode;
    type IntoIter = std::slice::Iter<'a, LanguageCode>;

    fn into_iter(self) -> Self::IntoIter {
        self.languages.iter()
    }
}

// ============================================================================
// CACHED VALUES
// ============================================================================

/// Value held for a (key, language) pair.
///
/// `Absent` is a real value: a message known to be missing is cached as
/// such so it never triggers another round-trip to the content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedText {
    Text(String),
    Absent,
}

impl CachedText {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Absent => None,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Absent => None,
        }
    }
}

impl From<Option<String>> for CachedText {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Absent, Self::Text)
    }
}

impl From<&str> for CachedText {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CachedText {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Identifier of one write transaction.
/// UUIDv7, so epochs sort by the time the transaction began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionEpoch(Uuid);

impl TransactionEpoch {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionEpoch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write waiting for its transaction to commit.
///
/// At most one exists per (key, language); a later write in the same
/// transaction replaces `text` in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvalidation {
    pub key: MessageKey,
    pub lang: LanguageCode,
    pub text: CachedText,
    pub epoch: TransactionEpoch,
    pub queued_at: Timestamp,
}

impl PendingInvalidation {
    pub fn new(key: MessageKey, lang: LanguageCode, text: CachedText, epoch: TransactionEpoch) -> Self {
        Self {
            key,
            lang,
            text,
            epoch,
            queued_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::parse(code).expect("valid language code")
    }

    #[test]
    fn test_language_code_is_lowercased() {
        assert_eq!(lang("DE").as_str(), "de");
        assert_eq!(lang("zh-Hans").as_str(), "zh-hans");
    }

    #[test]
    fn test_language_code_rejects_invalid() {
        assert!(LanguageCode::parse("").is_err());
        assert!(LanguageCode::parse("de/ru").is_err());
        assert!(LanguageCode::parse("d e").is_err());
        assert!(LanguageCode::parse("-de").is_err());
        assert!(LanguageCode::parse(&"a".repeat(MAX_LANGUAGE_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_language_code_serde_validates() {
        let parsed: LanguageCode = serde_json::from_str("\"ru\"").expect("deserialize");
        assert_eq!(parsed, lang("ru"));
        assert!(serde_json::from_str::<LanguageCode>("\"not valid\"").is_err());
    }

    #[test]
    fn test_message_key_is_normalized() {
        assert_eq!(MessageKey::new("Go"), MessageKey::new("go"));
        assert_ne!(MessageKey::new("gO"), MessageKey::new("go"));
        assert_eq!(MessageKey::new("go").to_title(), "Go");
    }

    #[test]
    fn test_message_key_deserialize_normalizes() {
        let key: MessageKey = serde_json::from_str("\"Foo bar\"").expect("deserialize");
        assert_eq!(key.as_str(), "foo_bar");
        assert_eq!(key, MessageKey::new("foo_bar"));
        assert_eq!(serde_json::to_string(&key).expect("serialize"), "\"foo_bar\"");
    }

    #[test]
    fn test_fallback_chain_shape() {
        let chain = FallbackChain::build(&lang("ab"), vec![lang("ru"), lang("en")], &lang("de"));
        assert_eq!(chain.languages(), &[lang("ab"), lang("ru"), lang("en"), lang("de")]);
        assert_eq!(chain.requested(), &lang("ab"));
        assert_eq!(chain.content_language(), &lang("de"));
    }

    #[test]
    fn test_fallback_chain_moves_content_language_last() {
        let chain = FallbackChain::build(&lang("fit"), vec![lang("de"), lang("fi")], &lang("de"));
        assert_eq!(chain.languages(), &[lang("fit"), lang("fi"), lang("de")]);
    }

    #[test]
    fn test_fallback_chain_for_content_language() {
        let chain = FallbackChain::build(&lang("de"), vec![lang("en")], &lang("de"));
        assert_eq!(chain.languages(), &[lang("de"), lang("en")]);
        assert_eq!(chain.content_language(), &lang("de"));
    }

    #[test]
    fn test_cached_text_conversions() {
        assert_eq!(CachedText::from(None), CachedText::Absent);
        assert_eq!(CachedText::from(Some("x".to_string())).as_deref(), Some("x"));
        assert!(CachedText::Absent.is_absent());
        assert_eq!(CachedText::from("y").into_option(), Some("y".to_string()));
    }

    fn lang_strategy() -> impl Strategy<Value = LanguageCode> {
        "[a-z]{2,3}".prop_map(|code| LanguageCode::parse(&code).expect("generated code is valid"))
    }

    proptest! {
        #[test]
        fn prop_fallback_chain_invariants(
            requested in lang_strategy(),
            fallbacks in proptest::collection::vec(lang_strategy(), 0..6),
            content in lang_strategy(),
        ) {
            let chain = FallbackChain::build(&requested, fallbacks, &content);
            prop_assert_eq!(chain.requested(), &requested);
            prop_assert!(chain.languages().contains(&content));
            if requested != content {
                prop_assert_eq!(chain.languages().last(), Some(&content));
            }
            let mut seen = std::collections::HashSet::new();
            for lang in &chain {
                prop_assert!(seen.insert(lang.clone()), "duplicate {} in chain", lang);
            }
        }
    }
}
