use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::info;

use crate::error::LedgerError;
use crate::models::{
    Market, MarketKind, MarketStatus, NewWager, Wager, WagerOutcome, WagerStatus,
};
use crate::store::{LedgerStore, UserRefund};

/// SQLite-backed ledger store
pub struct SqliteLedgerStore {
    pool: Pool<Sqlite>,
}

impl SqliteLedgerStore {
    /// Create a new ledger store and initialize the database
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Create data directory if needed
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
            }
        }

        // Parse connection options and enable create_if_missing
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true);

        // An in-memory database exists per connection, so the pool must
        // stay on a single connection to see one coherent database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init_schema().await?;

        info!("Ledger store initialized");
        Ok(store)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL CHECK (balance >= 0),
                referral_code TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS markets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                kind TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                winning_option TEXT,
                scheduled_start TEXT,
                closes_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create markets table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wagers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                selection TEXT NOT NULL,
                category TEXT NOT NULL,
                stake INTEGER NOT NULL,
                odds REAL NOT NULL,
                bonus_fraction REAL NOT NULL,
                potential_payout INTEGER NOT NULL,
                status TEXT NOT NULL,
                outcome TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wagers table")?;

        // One wager per (user, market), enforced by the store rather
        // than a pre-check so concurrent placements cannot both land
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_wagers_user_market
            ON wagers (user_id, market_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_wagers_market_status
            ON wagers (market_id, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn store_err<E>(context: &'static str) -> impl FnOnce(E) -> LedgerError
where
    E: Into<anyhow::Error>,
{
    move |e| LedgerError::StoreUnavailable(e.into().context(context))
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn create_user(
        &self,
        user_id: &str,
        starting_balance: i64,
        referral_code: Option<&str>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, balance, referral_code, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(starting_balance)
        .bind(referral_code)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err("Failed to create user"))?;

        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<i64, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("Failed to fetch balance"))?;

        row.map(|(balance,)| balance)
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))
    }

    async fn adjust_balance(&self, user_id: &str, delta: i64) -> Result<i64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET balance = balance + ?1
            WHERE id = ?2 AND balance + ?1 >= 0
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(store_err("Failed to adjust balance"))?;

        if result.rows_affected() == 0 {
            // Either the user is unknown or the decrement would go negative
            let balance = self.balance(user_id).await?;
            return Err(LedgerError::InsufficientBalance {
                balance,
                debit: -delta,
            });
        }

        self.balance(user_id).await
    }

    async fn create_market(&self, market: &Market) -> Result<(), LedgerError> {
        let kind = serde_json::to_string(&market.kind)
            .map_err(store_err("Failed to serialize market kind"))?;

        sqlx::query(
            r#"
            INSERT INTO markets (
                id, title, kind, category, status,
                winning_option, scheduled_start, closes_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&market.id)
        .bind(&market.title)
        .bind(kind)
        .bind(&market.category)
        .bind(market.status.as_str())
        .bind(&market.winning_option)
        .bind(market.scheduled_start.map(|t| t.to_rfc3339()))
        .bind(market.closes_at.map(|t| t.to_rfc3339()))
        .bind(market.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err("Failed to create market"))?;

        Ok(())
    }

    async fn market(&self, market_id: &str) -> Result<Option<Market>, LedgerError> {
        let row = sqlx::query_as::<_, MarketRow>("SELECT * FROM markets WHERE id = ?")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("Failed to fetch market"))?;

        row.map(|r| r.into_market().map_err(store_err("Corrupt market row")))
            .transpose()
    }

    async fn set_market_resolved(
        &self,
        market_id: &str,
        winning_option: &str,
    ) -> Result<(), LedgerError> {
        // First writer wins; re-invocation against a resolved market
        // changes nothing
        sqlx::query(
            r#"
            UPDATE markets SET status = 'resolved', winning_option = ?
            WHERE id = ? AND status != 'resolved'
            "#,
        )
        .bind(winning_option)
        .bind(market_id)
        .execute(&self.pool)
        .await
        .map_err(store_err("Failed to resolve market"))?;

        Ok(())
    }

    async fn wager_for(
        &self,
        user_id: &str,
        market_id: &str,
    ) -> Result<Option<Wager>, LedgerError> {
        let row = sqlx::query_as::<_, WagerRow>(
            "SELECT * FROM wagers WHERE user_id = ? AND market_id = ?",
        )
        .bind(user_id)
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("Failed to fetch wager"))?;

        Ok(row.map(|r| r.into()))
    }

    async fn recent_wagers(&self, user_id: &str, limit: i64) -> Result<Vec<Wager>, LedgerError> {
        let rows = sqlx::query_as::<_, WagerRow>(
            r#"
            SELECT * FROM wagers
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("Failed to fetch recent wagers"))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn pending_wagers(&self, market_id: &str) -> Result<Vec<Wager>, LedgerError> {
        let rows = sqlx::query_as::<_, WagerRow>(
            "SELECT * FROM wagers WHERE market_id = ? AND status = 'pending'",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("Failed to fetch pending wagers"))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn debit_and_create_wager(&self, wager: &NewWager) -> Result<Wager, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_err("Failed to begin transaction"))?;

        // Conditional debit: fails without effect if the balance would
        // go negative
        let debited = sqlx::query(
            r#"
            UPDATE users SET balance = balance - ?1
            WHERE id = ?2 AND balance >= ?1
            "#,
        )
        .bind(wager.stake)
        .bind(&wager.user_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err("Failed to debit stake"))?;

        if debited.rows_affected() == 0 {
            let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
                .bind(&wager.user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err("Failed to fetch balance"))?;

            return Err(match row {
                None => LedgerError::UserNotFound(wager.user_id.clone()),
                Some((balance,)) => LedgerError::InsufficientBalance {
                    balance,
                    debit: wager.stake,
                },
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO wagers (
                user_id, market_id, selection, category, stake, odds,
                bonus_fraction, potential_payout, status, outcome, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?)
            "#,
        )
        .bind(&wager.user_id)
        .bind(&wager.market_id)
        .bind(&wager.selection)
        .bind(&wager.category)
        .bind(wager.stake)
        .bind(wager.odds)
        .bind(wager.bonus_fraction)
        .bind(wager.potential_payout)
        .bind(wager.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        let wager_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(LedgerError::DuplicateWager {
                    user_id: wager.user_id.clone(),
                    market_id: wager.market_id.clone(),
                });
            }
            Err(e) => return Err(store_err("Failed to create wager")(e)),
        };

        tx.commit()
            .await
            .map_err(store_err("Failed to commit wager placement"))?;

        Ok(Wager {
            id: wager_id,
            user_id: wager.user_id.clone(),
            market_id: wager.market_id.clone(),
            selection: wager.selection.clone(),
            category: wager.category.clone(),
            stake: wager.stake,
            odds: wager.odds,
            bonus_fraction: wager.bonus_fraction,
            potential_payout: wager.potential_payout,
            status: WagerStatus::Pending,
            outcome: None,
            created_at: wager.created_at,
        })
    }

    async fn settle_wager(
        &self,
        wager_id: i64,
        outcome: WagerOutcome,
        credit: i64,
    ) -> Result<bool, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_err("Failed to begin transaction"))?;

        // The status flip is the single source of truth: a wager that
        // is no longer pending has already been paid out
        let flipped = sqlx::query(
            r#"
            UPDATE wagers SET status = 'resolved', outcome = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(outcome.as_str())
        .bind(wager_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err("Failed to resolve wager"))?;

        if flipped.rows_affected() == 0 {
            return Ok(false);
        }

        if credit > 0 {
            let credited = sqlx::query(
                r#"
                UPDATE users SET balance = balance + ?1
                WHERE id = (SELECT user_id FROM wagers WHERE id = ?2)
                "#,
            )
            .bind(credit)
            .bind(wager_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err("Failed to credit payout"))?;

            if credited.rows_affected() == 0 {
                return Err(LedgerError::StoreUnavailable(anyhow::anyhow!(
                    "no account to credit for wager {wager_id}"
                )));
            }
        }

        tx.commit()
            .await
            .map_err(store_err("Failed to commit settlement"))?;

        Ok(true)
    }

    async fn cancel_market(&self, market_id: &str) -> Result<Vec<UserRefund>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_err("Failed to begin transaction"))?;

        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM markets WHERE id = ?")
            .bind(market_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err("Failed to fetch market"))?;

        match status {
            None => return Err(LedgerError::MarketNotFound(market_id.to_string())),
            // A resolved market has already paid its winners; refunding
            // stakes on top would create currency
            Some((status,)) if status == "resolved" => {
                return Err(LedgerError::AlreadyResolved(market_id.to_string()));
            }
            Some(_) => {}
        }

        // Group refunds per user to keep one credit per bettor
        let refunds: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, SUM(stake), COUNT(*) FROM wagers
            WHERE market_id = ?
            GROUP BY user_id
            "#,
        )
        .bind(market_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err("Failed to sum refunds"))?;

        for (user_id, amount, _) in &refunds {
            sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
                .bind(amount)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(store_err("Failed to credit refund"))?;
        }

        sqlx::query("DELETE FROM wagers WHERE market_id = ?")
            .bind(market_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err("Failed to delete wagers"))?;

        sqlx::query("DELETE FROM markets WHERE id = ?")
            .bind(market_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err("Failed to delete market"))?;

        tx.commit()
            .await
            .map_err(store_err("Failed to commit cancellation"))?;

        Ok(refunds
            .into_iter()
            .map(|(user_id, amount, wager_count)| UserRefund {
                user_id,
                amount,
                wager_count,
            })
            .collect())
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct MarketRow {
    id: String,
    title: String,
    kind: String,
    category: String,
    status: String,
    winning_option: Option<String>,
    scheduled_start: Option<String>,
    closes_at: Option<String>,
    created_at: String,
}

impl MarketRow {
    fn into_market(self) -> anyhow::Result<Market> {
        let kind: MarketKind =
            serde_json::from_str(&self.kind).context("Invalid market kind column")?;

        Ok(Market {
            id: self.id,
            title: self.title,
            kind,
            category: self.category,
            status: parse_market_status(&self.status),
            winning_option: self.winning_option,
            scheduled_start: self.scheduled_start.as_deref().and_then(parse_datetime),
            closes_at: self.closes_at.as_deref().and_then(parse_datetime),
            created_at: parse_datetime(&self.created_at).unwrap_or_else(Utc::now),
        })
    }
}

#[derive(sqlx::FromRow)]
struct WagerRow {
    id: i64,
    user_id: String,
    market_id: String,
    selection: String,
    category: String,
    stake: i64,
    odds: f64,
    bonus_fraction: f64,
    potential_payout: i64,
    status: String,
    outcome: Option<String>,
    created_at: String,
}

impl From<WagerRow> for Wager {
    fn from(row: WagerRow) -> Self {
        Wager {
            id: row.id,
            user_id: row.user_id,
            market_id: row.market_id,
            selection: row.selection,
            category: row.category,
            stake: row.stake,
            odds: row.odds,
            bonus_fraction: row.bonus_fraction,
            potential_payout: row.potential_payout,
            status: parse_wager_status(&row.status),
            outcome: row.outcome.as_deref().and_then(parse_wager_outcome),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parse_market_status(s: &str) -> MarketStatus {
    match s {
        "open" => MarketStatus::Open,
        "resolved" => MarketStatus::Resolved,
        _ => MarketStatus::Closed,
    }
}

fn parse_wager_status(s: &str) -> WagerStatus {
    match s {
        "resolved" => WagerStatus::Resolved,
        _ => WagerStatus::Pending,
    }
}

fn parse_wager_outcome(s: &str) -> Option<WagerOutcome> {
    match s {
        "won" => Some(WagerOutcome::Won),
        "lost" => Some(WagerOutcome::Lost),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adjust_balance_credits_and_debits() {
        let store = SqliteLedgerStore::new("sqlite::memory:").await.unwrap();
        store.create_user("u1", 100, None).await.unwrap();

        // Bonus-style credit, then a covered debit
        assert_eq!(store.adjust_balance("u1", 25).await.unwrap(), 125);
        assert_eq!(store.adjust_balance("u1", -50).await.unwrap(), 75);
    }

    #[tokio::test]
    async fn test_adjust_balance_rejects_overdraft() {
        let store = SqliteLedgerStore::new("sqlite::memory:").await.unwrap();
        store.create_user("u1", 75, None).await.unwrap();

        let err = store.adjust_balance("u1", -100).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                balance: 75,
                debit: 100
            }
        ));
        // The failed decrement changes nothing
        assert_eq!(store.balance("u1").await.unwrap(), 75);
    }

    #[tokio::test]
    async fn test_adjust_balance_unknown_user() {
        let store = SqliteLedgerStore::new("sqlite::memory:").await.unwrap();

        let err = store.adjust_balance("ghost", 10).await.unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(_)));
    }
}
