use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A resolvable betting subject: a scheduled game (home/away outcome) or
/// an admin-created proposition with arbitrary options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Unique market identifier
    pub id: String,

    /// Display title (e.g. "Sharks vs Jets")
    pub title: String,

    /// Game or prop, with the kind-specific option data
    pub kind: MarketKind,

    /// Bonus category this market counts toward (e.g. a league or sport)
    pub category: String,

    /// Current lifecycle status
    pub status: MarketStatus,

    /// Winning option, set exactly once at resolution
    pub winning_option: Option<String>,

    /// Scheduled start time for game markets
    pub scheduled_start: Option<DateTime<Utc>>,

    /// Hard close time for prop markets
    pub closes_at: Option<DateTime<Utc>>,

    /// When the market was created
    pub created_at: DateTime<Utc>,
}

/// Kind-specific market data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketKind {
    /// Two-team game; odds come from the bettor's confidence level
    Game { home: String, away: String },
    /// Admin-created proposition; each option carries its own odds
    Prop { options: Vec<PropOption> },
}

/// One selectable option of a prop market with its admin-configured odds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropOption {
    pub label: String,
    pub odds: f64,
}

/// Market lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// Accepting wagers
    Open,
    /// No longer accepting wagers, not yet resolved
    Closed,
    /// Outcome declared, all wagers settled
    Resolved,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
            MarketStatus::Resolved => "resolved",
        }
    }
}

impl Market {
    /// Resolve a selection to the market's stored option spelling,
    /// matching case-insensitively. Returns `None` for unknown options.
    pub fn canonical_option(&self, selection: &str) -> Option<String> {
        let wanted = selection.trim().to_lowercase();
        match &self.kind {
            MarketKind::Game { home, away } => [home, away]
                .into_iter()
                .find(|team| team.to_lowercase() == wanted)
                .cloned(),
            MarketKind::Prop { options } => options
                .iter()
                .find(|opt| opt.label.to_lowercase() == wanted)
                .map(|opt| opt.label.clone()),
        }
    }

    /// Whether the market still accepts wagers at `now`. Game markets
    /// stay open through a grace period after their scheduled start;
    /// prop markets close at their hard close time.
    pub fn accepts_wagers_at(&self, now: DateTime<Utc>, grace_period_secs: i64) -> bool {
        if self.status != MarketStatus::Open {
            return false;
        }

        if let Some(start) = self.scheduled_start {
            if now >= start + Duration::seconds(grace_period_secs) {
                return false;
            }
        }

        if let Some(closes_at) = self.closes_at {
            if now >= closes_at {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_market(start: DateTime<Utc>) -> Market {
        Market {
            id: "m1".to_string(),
            title: "Sharks vs Jets".to_string(),
            kind: MarketKind::Game {
                home: "Sharks".to_string(),
                away: "Jets".to_string(),
            },
            category: "hockey".to_string(),
            status: MarketStatus::Open,
            winning_option: None,
            scheduled_start: Some(start),
            closes_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_canonical_option_case_insensitive() {
        let market = game_market(Utc::now());

        assert_eq!(market.canonical_option("sharks"), Some("Sharks".to_string()));
        assert_eq!(market.canonical_option(" JETS "), Some("Jets".to_string()));
        assert_eq!(market.canonical_option("Bears"), None);
    }

    #[test]
    fn test_grace_period_window() {
        let start = Utc::now();
        let market = game_market(start);

        // Still open within the grace period
        assert!(market.accepts_wagers_at(start + Duration::seconds(300), 600));
        // Closed once the grace period elapses
        assert!(!market.accepts_wagers_at(start + Duration::seconds(600), 600));
    }

    #[test]
    fn test_non_open_status_rejects_wagers() {
        let mut market = game_market(Utc::now() + Duration::hours(1));
        market.status = MarketStatus::Closed;

        assert!(!market.accepts_wagers_at(Utc::now(), 600));
    }
}
