//! Karma business rules — alias resolution, blacklist, clamping, self-karma.
//!
//! Applied to every text-driven karma command before anything reaches the
//! ledger. Each step can short-circuit: blacklisted recipients are dropped
//! silently, disallowed self-karma gets a user-visible rejection, and only
//! what survives both is written.

use std::sync::Arc;

use tracing::info;

use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::ledger::{LedgerRepository, Transaction};
use crate::parser;
use crate::transport::UserDirectory;

/// What became of a karma command.
#[derive(Debug)]
pub enum Outcome {
    /// Transaction written; `balance` is the recipient's balance read back
    /// after the write.
    Committed {
        transaction: Transaction,
        balance: i64,
    },
    /// Policy rejection with a user-visible reply. Nothing written.
    Rejected { reply: String },
    /// Silently dropped (blacklisted recipient). Nothing written, no reply.
    Dropped,
}

/// Applies business policy to classified give-karma intents.
pub struct RuleEngine {
    config: Arc<BotConfig>,
    ledger: Arc<dyn LedgerRepository>,
    directory: Arc<dyn UserDirectory>,
}

impl RuleEngine {
    pub fn new(
        config: Arc<BotConfig>,
        ledger: Arc<dyn LedgerRepository>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            config,
            ledger,
            directory,
        }
    }

    /// Resolve a raw target token to a canonical handle: mention lookup if
    /// the token is a `<@ID>` mention, then the alias map, then lowercase.
    pub async fn resolve_target(&self, token: &str) -> Result<String> {
        let handle = match parser::mention_id(token) {
            Some(id) => self.directory.lookup_handle(id).await?,
            None => token.trim_start_matches('@').to_string(),
        };
        Ok(self.canonicalize(&handle))
    }

    /// Lowercase a handle and map it through the alias table. Single-hop:
    /// alias targets are taken as canonical.
    pub fn canonicalize(&self, handle: &str) -> String {
        let handle = handle.to_lowercase();
        match self.config.aliases.get(&handle) {
            Some(canonical) => canonical.clone(),
            None => handle,
        }
    }

    /// Signed delta for a `++`/`--` run: `min(len − 1, max_points)` with the
    /// sign taken from the run character. Run length ≥ 2 is a parser-level
    /// precondition.
    pub fn signed_delta(&self, run: &str) -> i64 {
        let magnitude = (run.len() as i64 - 1).min(self.config.max_points);
        if run.starts_with('-') { -magnitude } else { magnitude }
    }

    /// Apply the full rule chain to a give-karma command and persist the
    /// result.
    pub async fn apply(
        &self,
        from: &str,
        target_token: &str,
        run: &str,
        reason: Option<&str>,
    ) -> Result<Outcome> {
        let from = self.canonicalize(from);
        let to = self.resolve_target(target_token).await?;

        if self.config.blacklist.contains(&to) {
            info!(user = %to, "User is blacklisted, ignoring karma command");
            return Ok(Outcome::Dropped);
        }

        let delta = self.signed_delta(run);

        if !self.config.self_karma && from == to {
            return Ok(Outcome::Rejected {
                reply: "Sorry, you are not allowed to do that.".into(),
            });
        }

        let transaction = Transaction::new(&from, &to, delta, reason.unwrap_or(""));
        self.ledger.insert(&transaction).await?;

        // Read-after-write for the confirmation message. Guaranteed only
        // with respect to this write, not to concurrent ones.
        let balance = self.ledger.get_user(&to).await.map_err(Error::from)?.balance;

        Ok(Outcome::Committed {
            transaction,
            balance,
        })
    }
}
