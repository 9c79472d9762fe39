pub mod placement;
pub mod settlement;

pub use placement::{PlaceWagerRequest, PlacementService};
pub use settlement::{
    MarketCancellation, MarketResolution, SettlementEngine, WagerResolution, WagerResult,
};
