//! Error types for MSGCACHE operations

use crate::{LanguageCode, MessageKey, TransactionEpoch};
use thiserror::Error;

/// Content source errors.
///
/// These are recovered locally by the cache: a failed population answers
/// absent, a failed resync keeps the last in-process value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Content source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Failed to load messages for language {lang}: {reason}")]
    LoadFailed { lang: LanguageCode, reason: String },

    #[error("Failed to fetch {key} in {lang}: {reason}")]
    FetchFailed {
        key: MessageKey,
        lang: LanguageCode,
        reason: String,
    },
}

/// Transaction usage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction {epoch} is not open")]
    NotOpen { epoch: TransactionEpoch },

    #[error("Transaction {epoch} already finished")]
    AlreadyFinished { epoch: TransactionEpoch },

    #[error("Unknown transaction {epoch}")]
    UnknownTransaction { epoch: TransactionEpoch },

    #[error("Deferred update queue lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid language code {code:?}: {reason}")]
    InvalidLanguageCode { code: String, reason: String },

    #[error("Message title is empty")]
    EmptyTitle,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Broken internal invariants. These indicate a defect, not a runtime condition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Resync fired without a live registration for {key} in {lang} (transaction {epoch})")]
    MissingRegistration {
        key: MessageKey,
        lang: LanguageCode,
        epoch: TransactionEpoch,
    },
}

/// Master error type for all MSGCACHE errors.
#[derive(Debug, Clone, Error)]
pub enum MsgCacheError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Result type alias for MSGCACHE operations.
pub type MsgCacheResult<T> = Result<T, MsgCacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::parse(code).expect("valid language code")
    }

    #[test]
    fn test_source_error_display_load_failed() {
        let err = SourceError::LoadFailed {
            lang: lang("ru"),
            reason: "connection reset".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ru"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_source_error_display_fetch_failed() {
        let err = SourceError::FetchFailed {
            key: MessageKey::new("Go"),
            lang: lang("de"),
            reason: "timeout".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("go"));
        assert!(msg.contains("de"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_transaction_error_display_not_open() {
        let epoch = TransactionEpoch::new();
        let msg = format!("{}", TransactionError::NotOpen { epoch });
        assert!(msg.contains("not open"));
        assert!(msg.contains(&epoch.to_string()));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "content_language".to_string(),
            value: "d e".to_string(),
            reason: "not a language code".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("content_language"));
        assert!(msg.contains("d e"));
        assert!(msg.contains("not a language code"));
    }

    #[test]
    fn test_msgcache_error_from_variants() {
        let source = MsgCacheError::from(SourceError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(matches!(source, MsgCacheError::Source(_)));

        let txn = MsgCacheError::from(TransactionError::UnknownTransaction {
            epoch: TransactionEpoch::new(),
        });
        assert!(matches!(txn, MsgCacheError::Transaction(_)));

        let validation = MsgCacheError::from(ValidationError::EmptyTitle);
        assert!(matches!(validation, MsgCacheError::Validation(_)));

        let config = MsgCacheError::from(ConfigError::MissingRequired {
            field: "content_language".to_string(),
        });
        assert!(matches!(config, MsgCacheError::Config(_)));

        let invariant = MsgCacheError::from(InvariantViolation::MissingRegistration {
            key: MessageKey::new("go"),
            lang: lang("de"),
            epoch: TransactionEpoch::new(),
        });
        assert!(matches!(invariant, MsgCacheError::Invariant(_)));
    }
}
