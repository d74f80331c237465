//! Ledger — append-only karma transaction store.
//!
//! The ledger is the only durable state in the system. Balances and
//! leaderboards are always derived by summing deltas over the transaction
//! history, never stored. Transactions are immutable once written and are
//! never updated or deleted.

pub mod libsql_backend;
pub mod memory;

pub use libsql_backend::LibSqlLedger;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A single karma transfer. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Who gave (or took) the points.
    pub from: String,
    /// Who received them.
    pub to: String,
    /// Signed point delta.
    pub delta: i64,
    /// Free-text reason, possibly empty.
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(from: &str, to: &str, delta: i64, reason: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            delta,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A user's derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKarma {
    pub handle: String,
    pub balance: i64,
}

/// Append-only transaction store with derived read queries.
///
/// Implementations must support concurrent `insert` calls from independent
/// handler tasks; each insert is a single atomic write. Reads may be stale
/// relative to concurrently committing writes from other tasks.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Persistently record that points were given or taken.
    async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    /// A user's current balance. `NoSuchUser` if the handle has no history
    /// as a recipient.
    async fn get_user(&self, handle: &str) -> Result<UserKarma, LedgerError>;

    /// The top `limit` recipients by balance, in non-increasing order.
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<UserKarma>, LedgerError>;

    /// Total points transferred across all users (sum of absolute deltas).
    async fn get_total_points(&self) -> Result<i64, LedgerError>;

    /// A randomly chosen historical transaction with `handle` as recipient.
    async fn get_throwback(&self, handle: &str) -> Result<Transaction, LedgerError>;
}
