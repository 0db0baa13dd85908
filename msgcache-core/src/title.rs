//! Message page titles.
//!
//! Every message customization is stored as a page. Pages in the content
//! language are named after the message (`Go`); pages in any other language
//! carry the language code as a suffix (`Go/ru`).

use crate::{normalize_key, title_key, LanguageCode, MessageKey, ValidationError};
use serde::{Deserialize, Serialize};

/// Split a page title into its message key and language.
///
/// The suffix after the last `/` is taken as the language only when it is a
/// valid language code; otherwise the whole title is the message name and
/// the page belongs to the content language.
pub fn figure_message(
    title: &str,
    content_language: &LanguageCode,
) -> Result<(MessageKey, LanguageCode), ValidationError> {
    let (name, lang) = match title.rsplit_once('/') {
        Some((name, suffix)) if !name.is_empty() => match LanguageCode::parse(suffix) {
            Ok(lang) => (name, lang),
            Err(_) => (title, content_language.clone()),
        },
        _ => (title, content_language.clone()),
    };

    let key = normalize_key(name);
    if key.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok((key, lang))
}

/// Page title holding `key` in `lang`. Inverse of [`figure_message`].
pub fn page_name(key: &MessageKey, lang: &LanguageCode, content_language: &LanguageCode) -> String {
    let base = title_key(key.as_str());
    if lang == content_language {
        base
    } else {
        format!("{base}/{lang}")
    }
}

/// Notification that a message page changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChange {
    /// Page title, e.g. `Go` or `Go/ru`.
    pub title: String,
    /// New page text, or `None` when the page was deleted.
    pub text: Option<String>,
}

impl PageChange {
    pub fn edited(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: Some(text.into()),
        }
    }

    pub fn deleted(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::parse(code).expect("valid language code")
    }

    #[test]
    fn test_figure_message_content_language() {
        let (key, code) = figure_message("Go", &lang("de")).expect("figure");
        assert_eq!(key.as_str(), "go");
        assert_eq!(code, lang("de"));
    }

    #[test]
    fn test_figure_message_with_suffix() {
        let (key, code) = figure_message("FallbackLanguageTest-Full/ru", &lang("de")).expect("figure");
        assert_eq!(key.as_str(), "fallbackLanguageTest-Full");
        assert_eq!(code, lang("ru"));
    }

    #[test]
    fn test_figure_message_invalid_suffix_keeps_whole_title() {
        let (key, code) = figure_message("Foo/bar baz", &lang("de")).expect("figure");
        assert_eq!(key.as_str(), "foo/bar_baz");
        assert_eq!(code, lang("de"));
    }

    #[test]
    fn test_figure_message_rejects_empty() {
        assert_eq!(figure_message("", &lang("de")), Err(ValidationError::EmptyTitle));
        // A bare suffix is not a message name.
        let (key, code) = figure_message("/ru", &lang("de")).expect("figure");
        assert_eq!(key.as_str(), "/ru");
        assert_eq!(code, lang("de"));
    }

    #[test]
    fn test_page_name_roundtrip() {
        let content = lang("de");
        let key = MessageKey::new("sunday");
        assert_eq!(page_name(&key, &content, &content), "Sunday");
        assert_eq!(page_name(&key, &lang("ru"), &content), "Sunday/ru");

        let (back, code) = figure_message("Sunday/ru", &content).expect("figure");
        assert_eq!(back, key);
        assert_eq!(code, lang("ru"));
    }
}
