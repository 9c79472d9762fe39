use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::emit::EventEmitter;
use crate::error::LedgerError;
use crate::models::{MarketStatus, NotifyKind, TransactionKind, Wager, WagerOutcome};
use crate::odds;
use crate::store::LedgerStore;

/// Outcome of one wager within a settlement pass
#[derive(Debug, Clone)]
pub enum WagerResolution {
    /// Settled as a win; payout credited
    Won { payout: i64 },
    /// Settled as a loss; no balance change
    Lost,
    /// Already resolved by an earlier pass, nothing re-applied
    Skipped,
    /// Store failure; re-invoking the settlement retries it
    Failed { reason: String },
}

/// Per-wager settlement report entry
#[derive(Debug, Clone)]
pub struct WagerResult {
    pub wager_id: i64,
    pub user_id: String,
    pub resolution: WagerResolution,
}

/// Summary of a settlement pass over a market
#[derive(Debug, Clone)]
pub struct MarketResolution {
    /// Wagers flipped from pending to resolved in this pass
    pub wagers_resolved: u64,
    /// Total winnings credited in this pass, bonuses included
    pub total_payout: i64,
    pub results: Vec<WagerResult>,
}

/// Summary of a market cancellation
#[derive(Debug, Clone)]
pub struct MarketCancellation {
    /// Wagers refunded and removed
    pub refunded_count: i64,
    /// Total stake returned across all bettors
    pub total_refunded: i64,
}

/// Resolves markets: pays out winners exactly once, notifies everyone
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    emitter: Arc<dyn EventEmitter>,
    config: Config,
}

impl SettlementEngine {
    /// Create a new settlement engine
    pub fn new(store: Arc<dyn LedgerStore>, emitter: Arc<dyn EventEmitter>, config: Config) -> Self {
        Self {
            store,
            emitter,
            config,
        }
    }

    /// Resolve every pending wager on a market exactly once.
    ///
    /// Each wager settles individually and durably; the market flips to
    /// resolved only after the whole batch succeeds. A re-invocation
    /// after a partial failure skips wagers already resolved and
    /// settles the remainder, so the operation is resumable at
    /// per-wager granularity. Re-invoking with the same winning option
    /// after full resolution is a no-op with zero counts.
    pub async fn resolve_market(
        &self,
        market_id: &str,
        winning_option: &str,
    ) -> Result<MarketResolution, LedgerError> {
        let market = self
            .store
            .market(market_id)
            .await?
            .ok_or_else(|| LedgerError::MarketNotFound(market_id.to_string()))?;

        let winner = market.canonical_option(winning_option).ok_or_else(|| {
            LedgerError::InvalidSelection {
                market_id: market.id.clone(),
                selection: winning_option.to_string(),
            }
        })?;

        if market.status == MarketStatus::Resolved {
            let same_winner = market
                .winning_option
                .as_deref()
                .map(|w| w.eq_ignore_ascii_case(&winner))
                .unwrap_or(false);

            if same_winner {
                return Ok(MarketResolution {
                    wagers_resolved: 0,
                    total_payout: 0,
                    results: Vec::new(),
                });
            }
            return Err(LedgerError::AlreadyResolved(market.id.clone()));
        }

        let pending = self.store.pending_wagers(&market.id).await?;
        info!(
            "Settling market {} ('{}' wins): {} pending wagers",
            market.id,
            winner,
            pending.len()
        );

        let mut results = Vec::with_capacity(pending.len());
        let mut wagers_resolved = 0u64;
        let mut total_payout = 0i64;
        let mut any_failed = false;

        for wager in pending {
            let won = wager.selection.eq_ignore_ascii_case(&winner);
            let payout = if won {
                odds::winning_payout(wager.stake, wager.odds, wager.bonus_fraction)
            } else {
                0
            };
            let outcome = if won {
                WagerOutcome::Won
            } else {
                WagerOutcome::Lost
            };

            let resolution = match self.store.settle_wager(wager.id, outcome, payout).await {
                Ok(true) => {
                    wagers_resolved += 1;
                    if won {
                        total_payout += payout;
                        self.emit_win(&wager, &market.title, payout).await;
                        WagerResolution::Won { payout }
                    } else {
                        self.emit_loss(&wager, &market.title).await;
                        WagerResolution::Lost
                    }
                }
                Ok(false) => WagerResolution::Skipped,
                Err(e) => {
                    // One bad record must not abort the batch
                    error!(
                        "Failed to settle wager {} on market {}: {}",
                        wager.id, market.id, e
                    );
                    any_failed = true;
                    WagerResolution::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            results.push(WagerResult {
                wager_id: wager.id,
                user_id: wager.user_id.clone(),
                resolution,
            });
        }

        if any_failed {
            warn!(
                "Market {} settlement incomplete, re-invoke to settle remaining wagers",
                market.id
            );
        } else {
            self.store.set_market_resolved(&market.id, &winner).await?;
            info!(
                "Market {} resolved: {} wagers settled, {} {} paid out",
                market.id, wagers_resolved, total_payout, self.config.currency_name
            );
        }

        Ok(MarketResolution {
            wagers_resolved,
            total_payout,
            results,
        })
    }

    /// Cancel a market before resolution: refund every wager at face
    /// stake (no odds, no bonus) and remove the market. Refunds are
    /// grouped per user.
    pub async fn cancel_market(&self, market_id: &str) -> Result<MarketCancellation, LedgerError> {
        let refunds = self.store.cancel_market(market_id).await?;

        let mut refunded_count = 0i64;
        let mut total_refunded = 0i64;

        for refund in &refunds {
            refunded_count += refund.wager_count;
            total_refunded += refund.amount;

            let description = format!(
                "Refund of {} {} for cancelled market {}",
                refund.amount, self.config.currency_name, market_id
            );
            if let Err(e) = self
                .emitter
                .record_transaction(
                    &refund.user_id,
                    TransactionKind::Refund,
                    refund.amount,
                    &description,
                )
                .await
            {
                warn!(
                    "Failed to record refund transaction for {}: {}",
                    refund.user_id, e
                );
            }

            if let Err(e) = self
                .emitter
                .notify(
                    &refund.user_id,
                    "Market cancelled",
                    &description,
                    NotifyKind::MarketCancelled,
                )
                .await
            {
                warn!("Failed to notify {} of refund: {}", refund.user_id, e);
            }
        }

        info!(
            "Market {} cancelled: {} wagers refunded, {} {} returned",
            market_id, refunded_count, total_refunded, self.config.currency_name
        );

        Ok(MarketCancellation {
            refunded_count,
            total_refunded,
        })
    }

    async fn emit_win(&self, wager: &Wager, market_title: &str, payout: i64) {
        let description = format!(
            "Won {} {} on {}",
            payout, self.config.currency_name, market_title
        );
        if let Err(e) = self
            .emitter
            .record_transaction(&wager.user_id, TransactionKind::Win, payout, &description)
            .await
        {
            warn!(
                "Failed to record win transaction for {}: {}",
                wager.user_id, e
            );
        }

        let body = if wager.bonus_fraction > 0.0 {
            format!(
                "{} (includes a {:.0}% bonus)",
                description,
                wager.bonus_fraction * 100.0
            )
        } else {
            description.clone()
        };
        if let Err(e) = self
            .emitter
            .notify(&wager.user_id, "You won!", &body, NotifyKind::BetWon)
            .await
        {
            warn!("Failed to notify {} of win: {}", wager.user_id, e);
        }
    }

    async fn emit_loss(&self, wager: &Wager, market_title: &str) {
        let body = format!(
            "Your pick '{}' on {} did not come through",
            wager.selection, market_title
        );
        if let Err(e) = self
            .emitter
            .notify(&wager.user_id, "Better luck next time", &body, NotifyKind::BetLost)
            .await
        {
            warn!("Failed to notify {} of loss: {}", wager.user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BonusRules;
    use crate::emit::MemoryEmitter;
    use crate::engine::placement::{PlaceWagerRequest, PlacementService};
    use crate::models::{Market, MarketKind, WagerOutcome, WagerStatus};
    use crate::odds::Confidence;
    use crate::store::SqliteLedgerStore;
    use chrono::{Duration, Utc};

    fn zero_bonus_config() -> Config {
        let mut config = Config::default();
        config.bonus.default_rules = BonusRules {
            base: 0.0,
            streak_3: 0.0,
            streak_7: 0.0,
            weekend: 0.0,
            cap: 0.0,
        };
        config
    }

    fn game_market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            title: "Sharks vs Jets".to_string(),
            kind: MarketKind::Game {
                home: "Sharks".to_string(),
                away: "Jets".to_string(),
            },
            category: "hockey".to_string(),
            status: MarketStatus::Open,
            winning_option: None,
            scheduled_start: Some(Utc::now() + Duration::hours(1)),
            closes_at: None,
            created_at: Utc::now(),
        }
    }

    struct Harness {
        store: Arc<SqliteLedgerStore>,
        emitter: Arc<MemoryEmitter>,
        placement: PlacementService,
        settlement: SettlementEngine,
    }

    async fn setup() -> Harness {
        let store = Arc::new(SqliteLedgerStore::new("sqlite::memory:").await.unwrap());
        let emitter = Arc::new(MemoryEmitter::new());
        let config = zero_bonus_config();
        Harness {
            store: Arc::clone(&store),
            emitter: Arc::clone(&emitter),
            placement: PlacementService::new(
                Arc::clone(&store) as Arc<dyn LedgerStore>,
                Arc::clone(&emitter) as Arc<dyn EventEmitter>,
                config.clone(),
            ),
            settlement: SettlementEngine::new(
                store as Arc<dyn LedgerStore>,
                emitter as Arc<dyn EventEmitter>,
                config,
            ),
        }
    }

    async fn place(h: &Harness, user: &str, market: &str, selection: &str, stake: i64) {
        h.placement
            .place_wager(&PlaceWagerRequest {
                user_id: user.to_string(),
                market_id: market.to_string(),
                selection: selection.to_string(),
                stake,
                confidence: Some(Confidence::Medium),
                claimed_odds: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_winning_wager_settles_and_pays() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 50).await;
        assert_eq!(h.store.balance("u1").await.unwrap(), 50);

        let report = h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        assert_eq!(report.wagers_resolved, 1);
        assert_eq!(report.total_payout, 75);
        // 50 remaining + 75 payout at medium confidence (x1.5)
        assert_eq!(h.store.balance("u1").await.unwrap(), 125);

        let wager = h.store.wager_for("u1", "m1").await.unwrap().unwrap();
        assert_eq!(wager.status, WagerStatus::Resolved);
        assert_eq!(wager.outcome, Some(WagerOutcome::Won));

        let won: Vec<_> = h
            .emitter
            .notifications()
            .into_iter()
            .filter(|n| n.kind == NotifyKind::BetWon)
            .collect();
        assert_eq!(won.len(), 1);
    }

    #[tokio::test]
    async fn test_losing_wager_leaves_balance_unchanged() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Jets", 30).await;
        assert_eq!(h.store.balance("u1").await.unwrap(), 70);

        let report = h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        assert_eq!(report.wagers_resolved, 1);
        assert_eq!(report.total_payout, 0);
        assert_eq!(h.store.balance("u1").await.unwrap(), 70);

        let wager = h.store.wager_for("u1", "m1").await.unwrap().unwrap();
        assert_eq!(wager.outcome, Some(WagerOutcome::Lost));

        let lost: Vec<_> = h
            .emitter
            .notifications()
            .into_iter()
            .filter(|n| n.kind == NotifyKind::BetLost)
            .collect();
        assert_eq!(lost.len(), 1);
    }

    #[tokio::test]
    async fn test_double_settlement_is_a_no_op() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 50).await;
        h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        let balance_after_first = h.store.balance("u1").await.unwrap();

        let second = h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        assert_eq!(second.wagers_resolved, 0);
        assert_eq!(second.total_payout, 0);
        assert_eq!(h.store.balance("u1").await.unwrap(), balance_after_first);

        // A different winner on a resolved market is a conflict
        let err = h.settlement.resolve_market("m1", "Jets").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn test_settlement_resumes_after_partial_crash() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_user("u2", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 40).await;
        place(&h, "u2", "m1", "Sharks", 20).await;

        // Simulate a crash mid-settlement: one wager already settled
        // and paid, the market still unresolved
        let wager = h.store.wager_for("u1", "m1").await.unwrap().unwrap();
        let settled = h
            .store
            .settle_wager(wager.id, WagerOutcome::Won, 60)
            .await
            .unwrap();
        assert!(settled);
        assert_eq!(h.store.balance("u1").await.unwrap(), 120);

        let report = h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        // Only the remaining wager settles; the first is not re-paid
        assert_eq!(report.wagers_resolved, 1);
        assert_eq!(report.total_payout, 30);
        assert_eq!(h.store.balance("u1").await.unwrap(), 120);
        assert_eq!(h.store.balance("u2").await.unwrap(), 110);

        let market = h.store.market("m1").await.unwrap().unwrap();
        assert_eq!(market.status, MarketStatus::Resolved);
        assert_eq!(market.winning_option.as_deref(), Some("Sharks"));
    }

    #[tokio::test]
    async fn test_conservation_across_a_market() {
        let h = setup().await;
        h.store.create_user("u1", 200, None).await.unwrap();
        h.store.create_user("u2", 200, None).await.unwrap();
        h.store.create_user("u3", 200, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 80).await;
        place(&h, "u2", "m1", "Jets", 60).await;
        place(&h, "u3", "m1", "Sharks", 40).await;

        let staked = 80 + 60 + 40;
        let report = h.settlement.resolve_market("m1", "Sharks").await.unwrap();

        // Every credit in the pass equals the winning payouts, nothing more
        let total_balances = h.store.balance("u1").await.unwrap()
            + h.store.balance("u2").await.unwrap()
            + h.store.balance("u3").await.unwrap();
        assert_eq!(total_balances, 600 - staked + report.total_payout);
        // x1.5 on both winning stakes
        assert_eq!(report.total_payout, 120 + 60);

        let win_credits: i64 = h
            .emitter
            .transactions()
            .iter()
            .filter(|t| t.kind == TransactionKind::Win)
            .map(|t| t.amount)
            .sum();
        assert_eq!(win_credits, report.total_payout);
    }

    #[tokio::test]
    async fn test_bonus_applied_at_settlement_only() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 50).await;

        // Freeze a bonus on the wager as if placement had earned one
        let wager = h.store.wager_for("u1", "m1").await.unwrap().unwrap();
        assert_eq!(wager.bonus_fraction, 0.0);
        assert_eq!(wager.potential_payout, 75);

        let payout = odds::winning_payout(wager.stake, wager.odds, 0.10);
        let settled = h
            .store
            .settle_wager(wager.id, WagerOutcome::Won, payout)
            .await
            .unwrap();
        assert!(settled);
        // 75 base + round(75 * 10%) = 83, on top of the remaining 50
        assert_eq!(h.store.balance("u1").await.unwrap(), 133);
    }

    #[tokio::test]
    async fn test_cancellation_refunds_face_stakes() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_user("u2", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 20).await;
        place(&h, "u2", "m1", "Jets", 30).await;

        let cancellation = h.settlement.cancel_market("m1").await.unwrap();
        assert_eq!(cancellation.refunded_count, 2);
        assert_eq!(cancellation.total_refunded, 50);

        // Full face stake back, no odds or bonus applied
        assert_eq!(h.store.balance("u1").await.unwrap(), 100);
        assert_eq!(h.store.balance("u2").await.unwrap(), 100);

        // Market and wagers are gone
        assert!(h.store.market("m1").await.unwrap().is_none());
        assert!(h.store.wager_for("u1", "m1").await.unwrap().is_none());

        let refunds: Vec<_> = h
            .emitter
            .transactions()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Refund)
            .collect();
        assert_eq!(refunds.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_after_resolution_is_rejected() {
        let h = setup().await;
        h.store.create_user("u1", 100, None).await.unwrap();
        h.store.create_market(&game_market("m1")).await.unwrap();

        place(&h, "u1", "m1", "Sharks", 50).await;
        h.settlement.resolve_market("m1", "Sharks").await.unwrap();
        assert_eq!(h.store.balance("u1").await.unwrap(), 125);

        let err = h.settlement.cancel_market("m1").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyResolved(_)));

        // No stake refunded on top of the payout, market still there
        assert_eq!(h.store.balance("u1").await.unwrap(), 125);
        let market = h.store.market("m1").await.unwrap().unwrap();
        assert_eq!(market.status, MarketStatus::Resolved);
    }

    #[tokio::test]
    async fn test_cancel_unknown_market_fails() {
        let h = setup().await;
        let err = h.settlement.cancel_market("missing").await.unwrap_err();
        assert!(matches!(err, LedgerError::MarketNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_with_invalid_winner_fails() {
        let h = setup().await;
        h.store.create_market(&game_market("m1")).await.unwrap();

        let err = h
            .settlement
            .resolve_market("m1", "Bears")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSelection { .. }));
    }
}
