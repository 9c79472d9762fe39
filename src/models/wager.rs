use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's stake on one option of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    /// Store-assigned wager identifier
    pub id: i64,

    /// Owning user
    pub user_id: String,

    /// Market this wager is placed on
    pub market_id: String,

    /// Selected option, in the market's canonical spelling
    pub selection: String,

    /// Bonus category, frozen from the market at placement time
    pub category: String,

    /// Stake amount in minor currency units (always positive)
    pub stake: i64,

    /// Odds multiplier resolved server-side at placement time
    pub odds: f64,

    /// Bonus fraction frozen at placement time; 0 if none
    pub bonus_fraction: f64,

    /// Stake times odds, computed at placement for display. Excludes
    /// the bonus, which is applied to winnings at settlement only.
    pub potential_payout: i64,

    /// Settlement status
    pub status: WagerStatus,

    /// Outcome, set once when the wager is resolved
    pub outcome: Option<WagerOutcome>,

    /// When the wager was placed
    pub created_at: DateTime<Utc>,
}

/// A wager ready to be recorded, before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewWager {
    pub user_id: String,
    pub market_id: String,
    pub selection: String,
    pub category: String,
    pub stake: i64,
    pub odds: f64,
    pub bonus_fraction: f64,
    pub potential_payout: i64,
    pub created_at: DateTime<Utc>,
}

/// Settlement status of a wager; transitions `pending -> resolved`
/// exactly once and never reverses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Pending,
    Resolved,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Resolved => "resolved",
        }
    }
}

/// Outcome of a resolved wager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WagerOutcome {
    Won,
    Lost,
}

impl WagerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerOutcome::Won => "won",
            WagerOutcome::Lost => "lost",
        }
    }
}
