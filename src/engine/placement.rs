use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::emit::EventEmitter;
use crate::error::LedgerError;
use crate::models::{NewWager, NotifyKind, TransactionKind, Wager};
use crate::odds::{self, Confidence};
use crate::store::LedgerStore;

/// A request to place a wager, as received from the calling layer
#[derive(Debug, Clone)]
pub struct PlaceWagerRequest {
    pub user_id: String,
    pub market_id: String,
    pub selection: String,

    /// Stake in minor currency units
    pub stake: i64,

    /// Confidence level for game wagers; the lowest tier applies when
    /// absent. Ignored for prop markets, which carry their own odds.
    pub confidence: Option<Confidence>,

    /// Odds the client believes it is getting. Advisory only: the
    /// server-resolved multiplier is always the one charged and paid.
    pub claimed_odds: Option<f64>,
}

/// Validates and commits new wagers, reserving funds
pub struct PlacementService {
    store: Arc<dyn LedgerStore>,
    emitter: Arc<dyn EventEmitter>,
    config: Config,
}

impl PlacementService {
    /// Create a new placement service
    pub fn new(store: Arc<dyn LedgerStore>, emitter: Arc<dyn EventEmitter>, config: Config) -> Self {
        Self {
            store,
            emitter,
            config,
        }
    }

    /// Atomically validate and commit a new wager.
    ///
    /// Validation failures return before any side effect. The debit and
    /// the wager record are applied by the store as one unit, so a
    /// wager can never exist without its matching debit.
    pub async fn place_wager(&self, req: &PlaceWagerRequest) -> Result<Wager, LedgerError> {
        if req.stake <= 0 {
            return Err(LedgerError::InvalidAmount(req.stake));
        }

        let market = self
            .store
            .market(&req.market_id)
            .await?
            .ok_or_else(|| LedgerError::MarketNotFound(req.market_id.clone()))?;

        let selection = market.canonical_option(&req.selection).ok_or_else(|| {
            LedgerError::InvalidSelection {
                market_id: market.id.clone(),
                selection: req.selection.clone(),
            }
        })?;

        let now = Utc::now();
        if !market.accepts_wagers_at(now, self.config.grace_period_secs) {
            return Err(LedgerError::MarketClosed(market.id.clone()));
        }

        // Friendly pre-check; the store's uniqueness constraint is the
        // authoritative guard under concurrency
        if self
            .store
            .wager_for(&req.user_id, &market.id)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateWager {
                user_id: req.user_id.clone(),
                market_id: market.id.clone(),
            });
        }

        // Fresh read, never cached; the conditional debit below
        // re-checks atomically
        let balance = self.store.balance(&req.user_id).await?;
        if balance < req.stake {
            return Err(LedgerError::InsufficientBalance {
                balance,
                debit: req.stake,
            });
        }

        let confidence = req.confidence.unwrap_or(Confidence::Low);
        let multiplier = odds::resolve_odds(&market, &selection, confidence, &self.config.odds)?;

        if let Some(claimed) = req.claimed_odds {
            if (claimed - multiplier).abs() > 1e-9 {
                warn!(
                    "Claimed odds {:.2} disagree with resolved odds {:.2} on market {}, using resolved",
                    claimed, multiplier, market.id
                );
            }
        }

        let history = self
            .store
            .recent_wagers(&req.user_id, self.config.history_window)
            .await?;
        let rules = self.config.bonus.rules_for(&market.category);
        let bonus_fraction = odds::bonus_fraction(rules, &market.category, &history, now);

        // Displayed potential payout excludes the bonus; the bonus is
        // applied to winnings at settlement only
        let potential_payout = odds::base_payout(req.stake, multiplier);

        // Transaction record first, then debit: a crash between the
        // two leaves a reconcilable trace rather than untracked money
        let description = format!(
            "Placed {} {} on {}",
            req.stake, self.config.currency_name, market.title
        );
        if let Err(e) = self
            .emitter
            .record_transaction(&req.user_id, TransactionKind::Bet, -req.stake, &description)
            .await
        {
            warn!("Failed to record bet transaction for {}: {}", req.user_id, e);
        }

        let wager = self
            .store
            .debit_and_create_wager(&NewWager {
                user_id: req.user_id.clone(),
                market_id: market.id.clone(),
                selection,
                category: market.category.clone(),
                stake: req.stake,
                odds: multiplier,
                bonus_fraction,
                potential_payout,
                created_at: now,
            })
            .await?;

        info!(
            "Wager {} placed | {} staked {} on '{}' in market {} (x{:.2}, bonus {:.1}%)",
            wager.id,
            wager.user_id,
            wager.stake,
            wager.selection,
            wager.market_id,
            wager.odds,
            wager.bonus_fraction * 100.0
        );

        // Best-effort notifications; failures never unwind the wager
        let body = format!(
            "You staked {} {} on {}. Potential win: {} {}",
            wager.stake,
            self.config.currency_name,
            market.title,
            wager.potential_payout,
            self.config.currency_name
        );
        if let Err(e) = self
            .emitter
            .notify(&req.user_id, "Pick placed", &body, NotifyKind::BetPlaced)
            .await
        {
            warn!("Failed to notify {} of placement: {}", req.user_id, e);
        }

        if let Err(e) = self
            .emitter
            .notify(
                &req.user_id,
                "Achievement check",
                &market.category,
                NotifyKind::Achievement,
            )
            .await
        {
            warn!("Achievement check failed for {}: {}", req.user_id, e);
        }

        Ok(wager)
    }
}
