pub mod sqlite;

pub use sqlite::SqliteLedgerStore;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::{Market, NewWager, Wager, WagerOutcome};

/// Per-user refund summary produced by cancelling a market
#[derive(Debug, Clone)]
pub struct UserRefund {
    pub user_id: String,
    /// Total stake returned to this user, summed across their wagers
    pub amount: i64,
    /// How many wagers the refund covers
    pub wager_count: i64,
}

/// Durable storage for balances, markets and wagers.
///
/// Implementations must serialize operations touching a single user's
/// balance or a single wager so that no update is lost under concurrent
/// access. The compound operations (`debit_and_create_wager`,
/// `settle_wager`, `cancel_market`) must each be applied as one atomic
/// unit: either every write in them lands or none does.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Register a user with their starting balance.
    async fn create_user(
        &self,
        user_id: &str,
        starting_balance: i64,
        referral_code: Option<&str>,
    ) -> Result<(), LedgerError>;

    /// Current balance, read fresh from the store.
    async fn balance(&self, user_id: &str) -> Result<i64, LedgerError>;

    /// Atomically add `delta` to the user's balance. A negative delta
    /// that would take the balance below zero fails
    /// `InsufficientBalance` and changes nothing. Returns the new
    /// balance.
    async fn adjust_balance(&self, user_id: &str, delta: i64) -> Result<i64, LedgerError>;

    async fn create_market(&self, market: &Market) -> Result<(), LedgerError>;

    async fn market(&self, market_id: &str) -> Result<Option<Market>, LedgerError>;

    /// Flip the market to resolved with its winning option. First
    /// writer wins; a later call against an already-resolved market is
    /// a no-op.
    async fn set_market_resolved(
        &self,
        market_id: &str,
        winning_option: &str,
    ) -> Result<(), LedgerError>;

    /// The user's wager on a market, if any.
    async fn wager_for(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Option<Wager>, LedgerError>;

    /// The user's most recent wagers, newest first. Input to the
    /// streak-bonus computation.
    async fn recent_wagers(&self, user_id: &str, limit: i64) -> Result<Vec<Wager>, LedgerError>;

    /// All wagers on a market still awaiting settlement.
    async fn pending_wagers(&self, market_id: &str) -> Result<Vec<Wager>, LedgerError>;

    /// Atomically debit the stake from the user's balance and record
    /// the wager. Fails `InsufficientBalance` without side effects if
    /// the conditional debit cannot apply, and `DuplicateWager` if the
    /// user already has a wager on the market (enforced by a store
    /// uniqueness constraint, not a pre-check).
    async fn debit_and_create_wager(&self, wager: &NewWager) -> Result<Wager, LedgerError>;

    /// Atomically flip a wager from pending to resolved with the given
    /// outcome, crediting `credit` minor units to its owner in the same
    /// unit of work. Returns `false` without any balance change if the
    /// wager was not in pending state, which makes retried settlements
    /// skip already-paid wagers.
    async fn settle_wager(
        &self,
        wager_id: i64,
        outcome: WagerOutcome,
        credit: i64,
    ) -> Result<bool, LedgerError>;

    /// Delete a market and every wager on it, crediting each bettor's
    /// summed stakes back in the same unit of work. Fails
    /// `AlreadyResolved` for a settled market, whose winners were
    /// already paid. Returns the per-user refund summaries.
    async fn cancel_market(&self, market_id: &str) -> Result<Vec<UserRefund>, LedgerError>;
}
