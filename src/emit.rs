use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::models::{NotifyKind, TransactionKind};

/// Interface to the external notification and transaction-log
/// collaborator.
///
/// Both operations are best-effort from the core's point of view: the
/// engines log a failure and carry on, and money movement is never
/// rolled back because an emit failed.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Append an entry to the user's transaction log. `amount` is
    /// signed: debits negative, credits positive.
    async fn record_transaction(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: i64,
        description: &str,
    ) -> Result<()>;

    /// Send a user-facing notification.
    async fn notify(&self, user_id: &str, title: &str, body: &str, kind: NotifyKind) -> Result<()>;
}

/// Default emitter that writes events to the log instead of an external
/// collaborator
pub struct TracingEmitter;

#[async_trait]
impl EventEmitter for TracingEmitter {
    async fn record_transaction(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: i64,
        description: &str,
    ) -> Result<()> {
        info!(
            "Transaction | {} | {} | {:+} | {}",
            user_id,
            kind.as_str(),
            amount,
            description
        );
        Ok(())
    }

    async fn notify(&self, user_id: &str, title: &str, body: &str, kind: NotifyKind) -> Result<()> {
        info!(
            "Notify | {} | {} | {} - {}",
            user_id,
            kind.as_str(),
            title,
            body
        );
        Ok(())
    }
}

/// A recorded transaction-log entry captured by [`MemoryEmitter`]
#[derive(Debug, Clone)]
pub struct RecordedTransaction {
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
}

/// A recorded notification captured by [`MemoryEmitter`]
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotifyKind,
}

/// In-memory emitter that captures everything it receives. Used by the
/// engine tests to assert on emitted events.
#[derive(Default)]
pub struct MemoryEmitter {
    transactions: Mutex<Vec<RecordedTransaction>>,
    notifications: Mutex<Vec<RecordedNotification>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<RecordedTransaction> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<RecordedNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventEmitter for MemoryEmitter {
    async fn record_transaction(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: i64,
        description: &str,
    ) -> Result<()> {
        self.transactions.lock().unwrap().push(RecordedTransaction {
            user_id: user_id.to_string(),
            kind,
            amount,
            description: description.to_string(),
        });
        Ok(())
    }

    async fn notify(&self, user_id: &str, title: &str, body: &str, kind: NotifyKind) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push(RecordedNotification {
                user_id: user_id.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                kind,
            });
        Ok(())
    }
}
