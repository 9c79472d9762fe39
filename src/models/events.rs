use serde::{Deserialize, Serialize};

/// Kind of a balance-mutating transaction, recorded in the external
/// append-only transaction log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Stake debit at wager placement
    Bet,
    /// Payout credit at settlement
    Win,
    /// Stake returned when a market is cancelled
    Refund,
    /// Admin-granted bonus credit
    Bonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Bet => "bet",
            TransactionKind::Win => "win",
            TransactionKind::Refund => "refund",
            TransactionKind::Bonus => "bonus",
        }
    }
}

/// Kind of a user-facing notification emitted by the engines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    BetPlaced,
    BetWon,
    BetLost,
    MarketCancelled,
    /// Best-effort achievement-progress check triggered by a placement
    Achievement,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::BetPlaced => "bet_placed",
            NotifyKind::BetWon => "bet_won",
            NotifyKind::BetLost => "bet_lost",
            NotifyKind::MarketCancelled => "market_cancelled",
            NotifyKind::Achievement => "achievement",
        }
    }
}
