//! Configuration types

use crate::{ConfigError, LanguageCode, MsgCacheError, MsgCacheResult};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`MessageCacheConfig::content_language`].
pub const ENV_CONTENT_LANGUAGE: &str = "MSGCACHE_CONTENT_LANGUAGE";
/// Environment variable overriding [`MessageCacheConfig::enabled`].
pub const ENV_ENABLED: &str = "MSGCACHE_ENABLED";

/// Message cache configuration.
///
/// `content_language` is required; everything else has a default.
///
/// ```toml
/// content_language = "de"
/// enabled = true
/// preload_languages = ["de", "en"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCacheConfig {
    /// Wiki base language, the last resort of every fallback chain.
    pub content_language: LanguageCode,
    /// When false, page customizations are ignored and only the built-in
    /// localisation is served.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Languages populated eagerly by `MessageCache::warm`.
    #[serde(default)]
    pub preload_languages: Vec<LanguageCode>,
}

fn default_enabled() -> bool {
    true
}

impl MessageCacheConfig {
    /// Create a config for the given content language with defaults.
    pub fn new(content_language: LanguageCode) -> Self {
        Self {
            content_language,
            enabled: default_enabled(),
            preload_languages: Vec::new(),
        }
    }

    /// Enable or disable page customizations.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the languages to populate on warm-up.
    pub fn with_preload_languages(mut self, langs: Vec<LanguageCode>) -> Self {
        self.preload_languages = langs;
        self
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(input: &str) -> MsgCacheResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| {
            let message = e.message().to_string();
            if message.contains("content_language") && message.contains("missing") {
                MsgCacheError::Config(ConfigError::MissingRequired {
                    field: "content_language".to_string(),
                })
            } else {
                MsgCacheError::Config(ConfigError::Parse { reason: message })
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MSGCACHE_*` environment overrides.
    pub fn apply_env_overrides(self) -> MsgCacheResult<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> MsgCacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(code) = lookup(ENV_CONTENT_LANGUAGE) {
            self.content_language = LanguageCode::parse(&code).map_err(|e| {
                MsgCacheError::Config(ConfigError::InvalidValue {
                    field: ENV_CONTENT_LANGUAGE.to_string(),
                    value: code.clone(),
                    reason: e.to_string(),
                })
            })?;
        }
        if let Some(flag) = lookup(ENV_ENABLED) {
            self.enabled = match flag.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(MsgCacheError::Config(ConfigError::InvalidValue {
                        field: ENV_ENABLED.to_string(),
                        value: other.to_string(),
                        reason: "expected true/false or 1/0".to_string(),
                    }))
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - preload_languages has no duplicates
    pub fn validate(&self) -> MsgCacheResult<()> {
        for (i, lang) in self.preload_languages.iter().enumerate() {
            if self.preload_languages[..i].contains(lang) {
                return Err(MsgCacheError::Config(ConfigError::InvalidValue {
                    field: "preload_languages".to_string(),
                    value: lang.to_string(),
                    reason: "listed more than once".to_string(),
                }));
            }
        }
        Ok(())
    }
}
