use thiserror::Error;

/// Errors returned by the wager placement and settlement operations.
///
/// Every variant except `StoreUnavailable` is a terminal validation or
/// state error and must not be retried. `StoreUnavailable` signals a
/// transient persistence failure and is always safe to retry: a retried
/// placement either fails `DuplicateWager` (the wager made it in) or
/// proceeds cleanly, and settlement resumes at per-wager granularity.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Stake amount is zero or negative.
    #[error("stake amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Selection is not one of the market's options.
    #[error("'{selection}' is not a valid option for market {market_id}")]
    InvalidSelection {
        market_id: String,
        selection: String,
    },

    /// No market with the given id.
    #[error("market {0} not found")]
    MarketNotFound(String),

    /// Market is closed, resolved, or past its grace period.
    #[error("market {0} is no longer accepting wagers")]
    MarketClosed(String),

    /// Market has already been resolved with a different outcome.
    #[error("market {0} has already been resolved")]
    AlreadyResolved(String),

    /// User already holds a wager on this market.
    #[error("user {user_id} already has a wager on market {market_id}")]
    DuplicateWager {
        user_id: String,
        market_id: String,
    },

    /// Balance cannot cover the attempted debit.
    #[error("balance {balance} cannot cover a debit of {debit}")]
    InsufficientBalance { balance: i64, debit: i64 },

    /// No user with the given id.
    #[error("user {0} not found")]
    UserNotFound(String),

    /// Underlying store failed; retryable.
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl LedgerError {
    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}
