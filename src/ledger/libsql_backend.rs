//! libSQL ledger backend — durable `LedgerRepository` implementation.
//!
//! Supports local file and in-memory databases. The schema is a single
//! append-only `points` table; every read query derives its answer from it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::LedgerError;
use crate::ledger::{LedgerRepository, Transaction, UserKarma};

/// libSQL ledger backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// each insert is a single atomic statement.
pub struct LibSqlLedger {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlLedger {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Open(format!("Failed to create ledger directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(format!("Failed to create connection: {e}")))?;

        let ledger = Self {
            db: Arc::new(db),
            conn,
        };
        ledger.init_schema().await?;
        info!(path = %path.display(), "Ledger opened");
        Ok(ledger)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, LedgerError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(format!("Failed to create connection: {e}")))?;

        let ledger = Self {
            db: Arc::new(db),
            conn,
        };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS points (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    from_user TEXT NOT NULL,
                    to_user TEXT NOT NULL,
                    delta INTEGER NOT NULL,
                    reason TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to create points table: {e}")))?;

        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_points_to_user ON points (to_user)",
                (),
            )
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to create index: {e}")))?;

        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql row to a Transaction.
///
/// Column order: 0:from_user, 1:to_user, 2:delta, 3:reason, 4:created_at
fn row_to_transaction(row: &libsql::Row) -> Result<Transaction, libsql::Error> {
    let from: String = row.get(0)?;
    let to: String = row.get(1)?;
    let delta: i64 = row.get(2)?;
    let reason: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(Transaction {
        from,
        to,
        delta,
        reason,
        timestamp: parse_datetime(&created_str),
    })
}

#[async_trait]
impl LedgerRepository for LibSqlLedger {
    async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "INSERT INTO points (from_user, to_user, delta, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    transaction.from.as_str(),
                    transaction.to.as_str(),
                    transaction.delta,
                    transaction.reason.as_str(),
                    transaction.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("insert failed: {e}")))?;
        Ok(())
    }

    async fn get_user(&self, handle: &str) -> Result<UserKarma, LedgerError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(delta), 0) FROM points WHERE to_user = ?1",
                params![handle],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("balance query failed: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(format!("balance row failed: {e}")))?
            .ok_or_else(|| LedgerError::Query("balance query returned no rows".into()))?;

        let count: i64 = row
            .get(0)
            .map_err(|e| LedgerError::Query(e.to_string()))?;
        if count == 0 {
            return Err(LedgerError::NoSuchUser);
        }

        let balance: i64 = row
            .get(1)
            .map_err(|e| LedgerError::Query(e.to_string()))?;
        Ok(UserKarma {
            handle: handle.to_string(),
            balance,
        })
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<UserKarma>, LedgerError> {
        let mut rows = self
            .conn
            .query(
                "SELECT to_user, SUM(delta) AS balance FROM points
                 GROUP BY to_user
                 ORDER BY balance DESC, to_user ASC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("leaderboard query failed: {e}")))?;

        let mut board = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
        {
            let handle: String = row.get(0).map_err(|e| LedgerError::Query(e.to_string()))?;
            let balance: i64 = row.get(1).map_err(|e| LedgerError::Query(e.to_string()))?;
            board.push(UserKarma { handle, balance });
        }
        Ok(board)
    }

    async fn get_total_points(&self) -> Result<i64, LedgerError> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(SUM(ABS(delta)), 0) FROM points", ())
            .await
            .map_err(|e| LedgerError::Query(format!("total query failed: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
            .ok_or_else(|| LedgerError::Query("total query returned no rows".into()))?;
        row.get(0).map_err(|e| LedgerError::Query(e.to_string()))
    }

    async fn get_throwback(&self, handle: &str) -> Result<Transaction, LedgerError> {
        let mut rows = self
            .conn
            .query(
                "SELECT from_user, to_user, delta, reason, created_at FROM points
                 WHERE to_user = ?1
                 ORDER BY RANDOM()
                 LIMIT 1",
                params![handle],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("throwback query failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
        {
            Some(row) => row_to_transaction(&row).map_err(|e| LedgerError::Query(e.to_string())),
            None => Err(LedgerError::NoSuchUser),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> LibSqlLedger {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        for (from, to, delta, reason) in [
            ("bob", "alice", 3, "good work"),
            ("carol", "alice", 2, ""),
            ("alice", "bob", 4, "thanks"),
            ("alice", "carol", -1, ""),
        ] {
            ledger
                .insert(&Transaction::new(from, to, delta, reason))
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn balance_is_sum_of_deltas() {
        let ledger = seeded().await;
        assert_eq!(ledger.get_user("alice").await.unwrap().balance, 5);
        assert_eq!(ledger.get_user("carol").await.unwrap().balance, -1);
    }

    #[tokio::test]
    async fn unknown_user_is_no_such_user() {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        assert!(matches!(
            ledger.get_user("ghost").await,
            Err(LedgerError::NoSuchUser)
        ));
    }

    #[tokio::test]
    async fn leaderboard_orders_by_balance_then_handle() {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        for (to, delta) in [("zed", 2), ("amy", 2), ("top", 9)] {
            ledger
                .insert(&Transaction::new("x", to, delta, ""))
                .await
                .unwrap();
        }
        let board = ledger.get_leaderboard(10).await.unwrap();
        let handles: Vec<&str> = board.iter().map(|u| u.handle.as_str()).collect();
        assert_eq!(handles, vec!["top", "amy", "zed"]);
    }

    #[tokio::test]
    async fn leaderboard_respects_limit() {
        let ledger = seeded().await;
        assert_eq!(ledger.get_leaderboard(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn total_points_sums_absolute_deltas() {
        let ledger = seeded().await;
        assert_eq!(ledger.get_total_points().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn total_points_zero_on_empty_ledger() {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        assert_eq!(ledger.get_total_points().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn throwback_round_trips_the_transaction() {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        let tx = Transaction::new("bob", "alice", 3, "good work");
        ledger.insert(&tx).await.unwrap();

        let throwback = ledger.get_throwback("alice").await.unwrap();
        assert_eq!(throwback.from, "bob");
        assert_eq!(throwback.to, "alice");
        assert_eq!(throwback.delta, 3);
        assert_eq!(throwback.reason, "good work");
    }

    #[tokio::test]
    async fn throwback_for_unknown_user_is_no_such_user() {
        let ledger = seeded().await;
        assert!(matches!(
            ledger.get_throwback("ghost").await,
            Err(LedgerError::NoSuchUser)
        ));
    }

    #[tokio::test]
    async fn local_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/karma.db");
        let ledger = LibSqlLedger::new_local(&path).await.unwrap();
        ledger
            .insert(&Transaction::new("bob", "alice", 1, ""))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn parse_datetime_reads_rfc3339() {
        let ts = "2024-05-01T12:30:00+00:00";
        assert_eq!(parse_datetime(ts).to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }
}
