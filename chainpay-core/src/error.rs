//! Failure classes shared by every engine.
//!
//! Each module keeps its own error enum; `class()` on those enums maps them
//! onto this taxonomy so callers (HTTP layer, processors) can branch without
//! matching on module-specific variants.

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Validation,
    InsufficientFunds,
    InvalidTransaction,
    DerivationFailed,
    ConfirmationTimeout,
    Cancelled,
    UnresolvedWebhookTarget,
    /// A remote node, signer or rate source failed.
    Upstream,
    /// The persistent store failed.
    Storage,
}

impl ErrorClass {
    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::Storage | ErrorClass::Upstream | ErrorClass::ConfirmationTimeout
        )
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Validation => "validation",
            ErrorClass::InsufficientFunds => "insufficient_funds",
            ErrorClass::InvalidTransaction => "invalid_transaction",
            ErrorClass::DerivationFailed => "derivation_failed",
            ErrorClass::ConfirmationTimeout => "confirmation_timeout",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::UnresolvedWebhookTarget => "unresolved_webhook_target",
            ErrorClass::Upstream => "upstream",
            ErrorClass::Storage => "storage",
        };
        f.write_str(name)
    }
}
