//! In-memory ledger — `LedgerRepository` over a plain `Vec` of transactions.
//!
//! Used in tests and anywhere durability is not needed. Derives every read
//! from the full transaction history, the same way the durable backend does
//! with SQL.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::error::LedgerError;
use crate::ledger::{LedgerRepository, Transaction, UserKarma};

/// In-memory append-only ledger.
#[derive(Default)]
pub struct MemoryLedger {
    rows: RwLock<Vec<Transaction>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedger {
    async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.rows.write().await.push(transaction.clone());
        Ok(())
    }

    async fn get_user(&self, handle: &str) -> Result<UserKarma, LedgerError> {
        let rows = self.rows.read().await;
        let mut seen = false;
        let mut balance = 0;
        for row in rows.iter().filter(|r| r.to == handle) {
            seen = true;
            balance += row.delta;
        }
        if !seen {
            return Err(LedgerError::NoSuchUser);
        }
        Ok(UserKarma {
            handle: handle.to_string(),
            balance,
        })
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<UserKarma>, LedgerError> {
        let rows = self.rows.read().await;

        // Accumulate balances in first-seen order; the stable sort below
        // keeps that order for equal balances.
        let mut order = Vec::new();
        let mut balances: HashMap<&str, i64> = HashMap::new();
        for row in rows.iter() {
            if !balances.contains_key(row.to.as_str()) {
                order.push(row.to.as_str());
            }
            *balances.entry(row.to.as_str()).or_insert(0) += row.delta;
        }

        let mut board: Vec<UserKarma> = order
            .into_iter()
            .map(|handle| UserKarma {
                handle: handle.to_string(),
                balance: balances[handle],
            })
            .collect();
        board.sort_by(|a, b| b.balance.cmp(&a.balance));
        board.truncate(limit);
        Ok(board)
    }

    async fn get_total_points(&self) -> Result<i64, LedgerError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().map(|r| r.delta.abs()).sum())
    }

    async fn get_throwback(&self, handle: &str) -> Result<Transaction, LedgerError> {
        let rows = self.rows.read().await;
        let received: Vec<&Transaction> = rows.iter().filter(|r| r.to == handle).collect();
        received
            .choose(&mut rand::thread_rng())
            .map(|t| (*t).clone())
            .ok_or(LedgerError::NoSuchUser)
    }
}
