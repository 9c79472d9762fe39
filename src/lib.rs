//! Bet-settlement and balance-ledger core for a virtual-currency
//! sports-prediction app.
//!
//! Users stake virtual currency on game or prop markets; admins resolve
//! outcomes. This crate owns the money-movement rules: placement debits,
//! confidence/odds payouts with stacking bonuses, exactly-once
//! settlement, and cancellation refunds. The HTTP layer, persistence
//! engine choice, and notification display live outside it, behind the
//! [`store::LedgerStore`] and [`emit::EventEmitter`] seams.

pub mod config;
pub mod emit;
pub mod engine;
pub mod error;
pub mod models;
pub mod odds;
pub mod store;

pub use config::Config;
pub use emit::{EventEmitter, MemoryEmitter, TracingEmitter};
pub use engine::{
    MarketCancellation, MarketResolution, PlaceWagerRequest, PlacementService, SettlementEngine,
    WagerResolution, WagerResult,
};
pub use error::LedgerError;
pub use models::{Market, MarketKind, MarketStatus, PropOption, Wager, WagerOutcome, WagerStatus};
pub use odds::Confidence;
pub use store::{LedgerStore, SqliteLedgerStore, UserRefund};
