use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::{BonusRules, OddsTable};
use crate::error::LedgerError;
use crate::models::{Market, MarketKind, Wager};

/// Bettor-declared confidence level for a game wager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// Fixed multiplier for this confidence level
    pub fn multiplier(&self, odds: &OddsTable) -> f64 {
        match self {
            Confidence::Low => odds.low,
            Confidence::Medium => odds.medium,
            Confidence::High => odds.high,
        }
    }
}

/// Resolve the true odds multiplier for a selection on a market.
///
/// Game markets pay by the bettor's confidence level; prop markets pay
/// the admin-configured odds of the chosen option. Any odds value a
/// caller claims is advisory only and never enters this computation.
pub fn resolve_odds(
    market: &Market,
    selection: &str,
    confidence: Confidence,
    odds: &OddsTable,
) -> Result<f64, LedgerError> {
    match &market.kind {
        MarketKind::Game { .. } => Ok(confidence.multiplier(odds)),
        MarketKind::Prop { options } => {
            let wanted = selection.trim().to_lowercase();
            options
                .iter()
                .find(|opt| opt.label.to_lowercase() == wanted)
                .map(|opt| opt.odds)
                .ok_or_else(|| LedgerError::InvalidSelection {
                    market_id: market.id.clone(),
                    selection: selection.to_string(),
                })
        }
    }
}

/// Compute the bonus fraction for a wager being placed now.
///
/// Pure over the user's recent wager history (newest first): a flat
/// per-category base, a streak uplift at 3 and again at 7 consecutive
/// wagers in the category, and a weekend uplift, stacked additively
/// and clamped to the category cap. The result is frozen onto the
/// wager record and never recomputed at settlement.
pub fn bonus_fraction(
    rules: &BonusRules,
    category: &str,
    history: &[Wager],
    now: DateTime<Utc>,
) -> f64 {
    // The wager being placed counts toward its own streak
    let streak = 1 + history
        .iter()
        .take_while(|w| w.category == category)
        .count();

    let mut fraction = rules.base;

    if streak >= 3 {
        fraction += rules.streak_3;
    }
    if streak >= 7 {
        fraction += rules.streak_7;
    }

    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        fraction += rules.weekend;
    }

    fraction.clamp(0.0, rules.cap)
}

/// Stake times odds, rounded to minor units. This is the displayed
/// potential payout and the bonus-free part of a winning payout.
pub fn base_payout(stake: i64, odds: f64) -> i64 {
    (stake as f64 * odds).round() as i64
}

/// Full winning payout: base payout plus the frozen bonus fraction
/// applied on top of it.
pub fn winning_payout(stake: i64, odds: f64, bonus_fraction: f64) -> i64 {
    let base = base_payout(stake, odds);
    if bonus_fraction > 0.0 {
        base + (base as f64 * bonus_fraction).round() as i64
    } else {
        base
    }
}
