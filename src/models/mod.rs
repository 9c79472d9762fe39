pub mod events;
pub mod market;
pub mod wager;

pub use events::{NotifyKind, TransactionKind};
pub use market::{Market, MarketKind, MarketStatus, PropOption};
pub use wager::{NewWager, Wager, WagerOutcome, WagerStatus};
