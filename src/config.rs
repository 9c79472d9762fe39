use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub database_url: String,

    /// Odds multipliers per confidence level
    pub odds: OddsTable,

    /// Bonus rules applied to winnings at settlement
    pub bonus: BonusConfig,

    /// Seconds after a game's scheduled start during which wagers are
    /// still accepted
    pub grace_period_secs: i64,

    /// Balance granted to a newly registered user
    pub starting_balance: i64,

    /// Display name of the virtual currency, used in transaction and
    /// notification text
    pub currency_name: String,

    /// How many recent wagers to load when computing streak bonuses
    pub history_window: i64,
}

/// Fixed multipliers per confidence level for game wagers
#[derive(Debug, Clone)]
pub struct OddsTable {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

/// Additive bonus uplift rules for a wager category
#[derive(Debug, Clone)]
pub struct BonusRules {
    /// Flat per-category base fraction
    pub base: f64,
    /// Extra fraction from 3 consecutive wagers in the category
    pub streak_3: f64,
    /// Extra fraction stacked on top from 7 consecutive wagers
    pub streak_7: f64,
    /// Extra fraction when the wager lands on a Saturday or Sunday
    pub weekend: f64,
    /// Maximum total fraction for the category
    pub cap: f64,
}

/// Bonus rules keyed by market category, with a fallback default
#[derive(Debug, Clone)]
pub struct BonusConfig {
    pub default_rules: BonusRules,
    pub categories: HashMap<String, BonusRules>,
}

impl BonusConfig {
    /// Rules for a category, falling back to the default rule set
    pub fn rules_for(&self, category: &str) -> &BonusRules {
        self.categories.get(category).unwrap_or(&self.default_rules)
    }

    /// Install admin-configured rules for a category
    pub fn set_category(&mut self, category: impl Into<String>, rules: BonusRules) {
        self.categories.insert(category.into(), rules);
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/ledger.db".to_string()),

            odds: OddsTable {
                low: parse_var("ODDS_LOW", "1.2")?,
                medium: parse_var("ODDS_MEDIUM", "1.5")?,
                high: parse_var("ODDS_HIGH", "2.0")?,
            },

            bonus: BonusConfig {
                default_rules: BonusRules {
                    base: parse_var("BONUS_BASE", "0.02")?,
                    streak_3: parse_var("BONUS_STREAK_3", "0.05")?,
                    streak_7: parse_var("BONUS_STREAK_7", "0.10")?,
                    weekend: parse_var("BONUS_WEEKEND", "0.03")?,
                    cap: parse_var("BONUS_CAP", "0.15")?,
                },
                categories: HashMap::new(),
            },

            grace_period_secs: parse_var("GRACE_PERIOD_SECS", "600")?,

            starting_balance: parse_var("STARTING_BALANCE", "1000")?,

            currency_name: env::var("CURRENCY_NAME").unwrap_or_else(|_| "Coins".to_string()),

            history_window: parse_var("HISTORY_WINDOW", "25")?,
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{name} must be a valid number"))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            odds: OddsTable {
                low: 1.2,
                medium: 1.5,
                high: 2.0,
            },
            bonus: BonusConfig {
                default_rules: BonusRules {
                    base: 0.02,
                    streak_3: 0.05,
                    streak_7: 0.10,
                    weekend: 0.03,
                    cap: 0.15,
                },
                categories: HashMap::new(),
            },
            grace_period_secs: 600,
            starting_balance: 1000,
            currency_name: "Coins".to_string(),
            history_window: 25,
        }
    }
}
