//! MSGCACHE Test Utilities
//!
//! Shared test infrastructure for the MSGCACHE workspace:
//! - Tracing setup for tests
//! - Proptest generators for keys and language codes
//! - A seeded message cache fixture (content language `de`, `ab -> ru`)
//! - Assertions on MSGCACHE error kinds

use std::sync::Once;

pub use msgcache_core::{
    normalize_key, CachedText, ConfigError, LanguageCode, MessageCacheConfig, MessageKey,
    MsgCacheError, MsgCacheResult, PageChange, SourceError, TransactionError, ValidationError,
};
pub use msgcache_storage::{
    AutoCommit, DeferredUpdateQueue, InMemoryContentSource, InMemoryLocalisation, MessageCache,
    StaticFallbackGraph, Transaction,
};

use tracing_subscriber::EnvFilter;

/// Environment variable holding the test log filter.
pub const LOG_ENV: &str = "MSGCACHE_LOG";

/// Filter used when [`LOG_ENV`] is unset.
pub const DEFAULT_LOG_FILTER: &str = "msgcache_core=debug,msgcache_storage=debug";

static TRACING: Once = Once::new();

/// Install a `fmt` subscriber writing to the test output.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Parse a language code known to be valid.
#[track_caller]
pub fn lang(code: &str) -> LanguageCode {
    match LanguageCode::parse(code) {
        Ok(lang) => lang,
        Err(e) => panic!("invalid test language code {code:?}: {e}"),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys, titles and language codes.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid language code (`de`, `ab`, `zh-hans`).
    pub fn arb_language_code() -> impl Strategy<Value = LanguageCode> {
        "[a-z]{2,3}(-[a-z]{2,4})?".prop_map(|code| lang(&code))
    }

    /// Generate a raw message name as callers type it: mixed case, spaces,
    /// non-ASCII letters.
    pub fn arb_raw_key() -> impl Strategy<Value = String> {
        "[A-Za-zĆćÉéŁł][A-Za-z0-9ĆćÉé _-]{0,24}"
    }

    /// Generate a page title, with or without a language suffix.
    pub fn arb_page_title() -> impl Strategy<Value = String> {
        (arb_raw_key(), proptest::option::of(arb_language_code())).prop_map(|(name, lang)| {
            match lang {
                Some(lang) => format!("{name}/{lang}"),
                None => name,
            }
        })
    }

    /// Generate message text, possibly empty.
    pub fn arb_message_text() -> impl Strategy<Value = String> {
        "[ -~]{0,40}"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built message cache with a seeded content source.
    //!
    //! Content language `de`; `ab` falls back to `ru`, `fit` to `fi`. Pages:
    //!
    //! | title                                   | text      |
    //! |-----------------------------------------|-----------|
    //! | `FallbackLanguageTest-Full/ab`          | `ab`      |
    //! | `FallbackLanguageTest-Full/ru`          | `ru`      |
    //! | `FallbackLanguageTest-Full`             | `de`      |
    //! | `FallbackLanguageTest-Partial/ru`       | `ru`      |
    //! | `FallbackLanguageTest-Partial`          | `de`      |
    //! | `FallbackLanguageTest-ContLang`         | `de`      |
    //! | `Sunday/ru`                             | `ru`      |
    //! | `MessageCacheTest-FullKeyTest/ab`       | `ab`      |
    //! | `MessageCacheTest-FullKeyTest/ru`       | `ru`      |
    //! | `FallbackLanguageTest-NoDervContLang`   | `de/none` |

    use std::sync::Arc;

    use super::*;

    /// Built-in `go` in the content language.
    pub const GO_DE: &str = "Ausführen";

    /// Built-in `sunday` in `ab`.
    pub const SUNDAY_AB: &str = "амҽыш";

    pub fn content_language() -> LanguageCode {
        lang("de")
    }

    pub fn fallback_graph() -> StaticFallbackGraph {
        StaticFallbackGraph::new()
            .with_fallbacks(lang("ab"), vec![lang("ru")])
            .with_fallbacks(lang("fit"), vec![lang("fi")])
    }

    pub fn localisation() -> InMemoryLocalisation {
        InMemoryLocalisation::new()
            .with_message(lang("ab"), "sunday", SUNDAY_AB)
            .with_message(lang("ru"), "sunday", "воскресенье")
            .with_message(lang("de"), "sunday", "Sonntag")
            .with_message(lang("de"), "go", GO_DE)
    }

    /// Content source holding the pages listed in the module docs.
    pub fn seeded_source() -> MsgCacheResult<InMemoryContentSource> {
        let source = InMemoryContentSource::new(content_language());
        for (title, text) in [
            ("FallbackLanguageTest-Full/ab", "ab"),
            ("FallbackLanguageTest-Full/ru", "ru"),
            ("FallbackLanguageTest-Full", "de"),
            ("FallbackLanguageTest-Partial/ru", "ru"),
            ("FallbackLanguageTest-Partial", "de"),
            ("FallbackLanguageTest-ContLang", "de"),
            ("Sunday/ru", "ru"),
            ("MessageCacheTest-FullKeyTest/ab", "ab"),
            ("MessageCacheTest-FullKeyTest/ru", "ru"),
            ("FallbackLanguageTest-NoDervContLang", "de/none"),
        ] {
            source.put_page(title, text)?;
        }
        Ok(source)
    }

    /// A fresh cache with its collaborators exposed.
    pub struct MessageCacheFixture {
        pub cache: MessageCache,
        pub source: Arc<InMemoryContentSource>,
        pub queue: DeferredUpdateQueue,
    }

    impl MessageCacheFixture {
        pub fn new() -> MsgCacheResult<Self> {
            Self::with_config(MessageCacheConfig::new(content_language()))
        }

        pub fn with_config(config: MessageCacheConfig) -> MsgCacheResult<Self> {
            init_test_tracing();
            let source = Arc::new(seeded_source()?);
            let cache = MessageCache::new(
                config,
                source.clone(),
                Arc::new(fallback_graph()),
                Arc::new(localisation()),
            )?;
            Ok(Self {
                cache,
                source,
                queue: DeferredUpdateQueue::new(),
            })
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on MSGCACHE error kinds.

    use super::*;

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &MsgCacheResult<T>) {
        match result {
            Err(MsgCacheError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_transaction_error<T: std::fmt::Debug>(result: &MsgCacheResult<T>) {
        match result {
            Err(MsgCacheError::Transaction(_)) => {}
            other => panic!("expected transaction error, got {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &MsgCacheResult<T>) {
        match result {
            Err(MsgCacheError::Config(_)) => {}
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
