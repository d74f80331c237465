//! Event dispatch loop — receives transport events and routes them.
//!
//! Each message or reaction event runs on its own spawned task so a slow or
//! failing handler never blocks delivery of subsequent events. Handler
//! errors are contained to their task; nothing here tears down the loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_humanize::HumanTime;
use futures::StreamExt;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::error::{Error, LedgerError, Result, TransportError};
use crate::ledger::{LedgerRepository, Transaction, UserKarma};
use crate::parser::{Intent, IntentParser};
use crate::reactji::{ReactionTransition, VoteMapper};
use crate::reply::ReplyRouter;
use crate::rules::{Outcome, RuleEngine};
use crate::transport::{
    ChatTransport, MessageEvent, ReactionEvent, TransportEvent, UserDirectory,
};
use crate::web::ViewUrlProvider;

/// The bot: wires the parser, rules, mapper, and router over the shared
/// ledger and transport.
#[derive(Clone)]
pub struct Bot {
    config: Arc<BotConfig>,
    parser: Arc<IntentParser>,
    rules: Arc<RuleEngine>,
    mapper: VoteMapper,
    router: Arc<ReplyRouter>,
    ledger: Arc<dyn LedgerRepository>,
    transport: Arc<dyn ChatTransport>,
    view: Arc<dyn ViewUrlProvider>,
}

/// Adapts the transport's user lookup to the directory seam the rule
/// engine depends on.
struct TransportDirectory(Arc<dyn ChatTransport>);

#[async_trait]
impl UserDirectory for TransportDirectory {
    async fn lookup_handle(&self, user_id: &str) -> std::result::Result<String, TransportError> {
        self.0.lookup_handle(user_id).await
    }
}

impl Bot {
    pub fn new(
        config: BotConfig,
        ledger: Arc<dyn LedgerRepository>,
        transport: Arc<dyn ChatTransport>,
        view: Arc<dyn ViewUrlProvider>,
    ) -> Self {
        let config = Arc::new(config);
        let directory: Arc<dyn UserDirectory> =
            Arc::new(TransportDirectory(Arc::clone(&transport)));
        Self {
            parser: Arc::new(IntentParser::new(config.motivate)),
            rules: Arc::new(RuleEngine::new(
                Arc::clone(&config),
                Arc::clone(&ledger),
                directory,
            )),
            mapper: VoteMapper::new(config.reactji.clone()),
            router: Arc::new(ReplyRouter::new(Arc::clone(&transport), config.reply_mode)),
            config,
            ledger,
            transport,
            view,
        }
    }

    /// Consume the transport event stream until it ends.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.transport.connect().await?;
        info!("Listening for events");

        while let Some(envelope) = events.next().await {
            // Ack before processing so handler latency never blocks
            // transport flow control.
            if let Some(envelope_id) = envelope.ack_id.as_deref() {
                if let Err(err) = self.transport.ack(envelope_id).await {
                    warn!(error = %err, "Event ack failed");
                }
            }

            match envelope.event {
                TransportEvent::Connected => {
                    info!("Connected to chat transport");
                }
                TransportEvent::ConnectionError { reason } => {
                    warn!(reason = %reason, "Transport connection error");
                }
                TransportEvent::Message(ev) => {
                    let bot = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = bot.handle_message(&ev).await {
                            bot.report_error(&err, Some(&ev)).await;
                        }
                    });
                }
                TransportEvent::ReactionAdded(ev) => {
                    let bot = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) =
                            bot.handle_reaction(&ev, ReactionTransition::Added).await
                        {
                            bot.report_error(&err, None).await;
                        }
                    });
                }
                TransportEvent::ReactionRemoved(ev) => {
                    let bot = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) =
                            bot.handle_reaction(&ev, ReactionTransition::Removed).await
                        {
                            bot.report_error(&err, None).await;
                        }
                    });
                }
            }
        }

        info!("Event stream ended");
        Ok(())
    }

    /// Process a single message event. Text that matches no pattern is
    /// silently ignored.
    pub async fn handle_message(&self, ev: &MessageEvent) -> Result<()> {
        let Some(intent) = self.parser.parse(&ev.text) else {
            return Ok(());
        };

        match intent {
            Intent::ShowUrl => self.show_url(ev).await,
            Intent::GiveKarma {
                target,
                run,
                reason,
            } => self.give_points(ev, &target, &run, reason.as_deref()).await,
            Intent::Leaderboard { limit } => self.print_leaderboard(ev, limit).await,
            Intent::Throwback { target } => self.print_throwback(ev, target.as_deref()).await,
            Intent::QueryKarma { target } => self.query_karma(ev, &target).await,
        }
    }

    /// Process a single reaction event.
    ///
    /// Reaction votes skip the blacklist and self-karma rules applied to
    /// text commands (see DESIGN.md); the confirmation goes privately to
    /// the reactor.
    pub async fn handle_reaction(
        &self,
        ev: &ReactionEvent,
        transition: ReactionTransition,
    ) -> Result<()> {
        let Some(delta) = self.mapper.delta(&ev.reaction, transition) else {
            return Ok(());
        };

        let from = self.transport.lookup_handle(&ev.user).await?;
        let to = self.transport.lookup_handle(&ev.item_user).await?;

        let reason = self.mapper.reason(&from, &ev.reaction, transition);
        let (from, to) = (from.to_lowercase(), to.to_lowercase());

        let transaction = Transaction::new(&from, &to, delta, &reason);
        self.ledger.insert(&transaction).await.map_err(Error::from)?;

        let user = self.ledger.get_user(&to).await.map_err(Error::from)?;
        let text = points_message(&user, delta, &reason);
        self.router.reply_private(&ev.channel, &ev.user, &text).await;
        Ok(())
    }

    async fn give_points(
        &self,
        ev: &MessageEvent,
        target: &str,
        run: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let from = self.transport.lookup_handle(&ev.user).await?;

        match self.rules.apply(&from, target, run, reason).await? {
            Outcome::Committed {
                transaction,
                balance,
            } => {
                let user = UserKarma {
                    handle: transaction.to.clone(),
                    balance,
                };
                let text = points_message(&user, transaction.delta, &transaction.reason);
                self.router.reply(ev, &text).await;
            }
            Outcome::Rejected { reply } => {
                self.router.reply(ev, &reply).await;
            }
            Outcome::Dropped => {}
        }
        Ok(())
    }

    async fn query_karma(&self, ev: &MessageEvent, target: &str) -> Result<()> {
        let handle = self.rules.resolve_target(target).await?;

        match self.ledger.get_user(&handle).await {
            Ok(user) => {
                self.router
                    .reply(ev, &format!("{} == {}", user.handle, user.balance))
                    .await;
                Ok(())
            }
            // Not-found is an answer, not a failure: rendered verbatim
            // regardless of debug mode.
            Err(err @ LedgerError::NoSuchUser) => {
                self.router.reply(ev, &err.to_string()).await;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn print_leaderboard(&self, ev: &MessageEvent, limit: Option<usize>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.leaderboard_limit);

        let mut text = format!("*top {limit} leaderboard*\n");
        let url = self.view.url_for(&format!("/leaderboard/{limit}"));
        if !url.is_empty() {
            text.push_str(&url);
            text.push('\n');
        }

        let board = self.ledger.get_leaderboard(limit).await.map_err(Error::from)?;
        for (i, user) in board.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} == {}\n",
                i + 1,
                munge(&user.handle),
                user.balance
            ));
        }

        self.router.reply(ev, &text).await;
        Ok(())
    }

    async fn print_throwback(&self, ev: &MessageEvent, target: Option<&str>) -> Result<()> {
        let handle = match target {
            Some(token) => self.rules.resolve_target(token).await?,
            None => {
                let invoker = self.transport.lookup_handle(&ev.user).await?;
                self.rules.canonicalize(&invoker)
            }
        };

        match self.ledger.get_throwback(&handle).await {
            Ok(transaction) => {
                self.router.reply(ev, &throwback_message(&transaction)).await;
                Ok(())
            }
            Err(LedgerError::NoSuchUser) => {
                self.router
                    .reply(
                        ev,
                        &format!("could not find any karma operations for {handle}"),
                    )
                    .await;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn show_url(&self, ev: &MessageEvent) -> Result<()> {
        let url = self.view.url_for("/");
        // Web view disabled.
        if url.is_empty() {
            return Ok(());
        }
        self.router.reply(ev, &url).await;
        Ok(())
    }

    /// Log a handler failure and tell the invoking user, generically unless
    /// debug mode is on.
    async fn report_error(&self, err: &Error, message: Option<&MessageEvent>) {
        error!(error = %err, "Event handler failed");
        if let Some(message) = message {
            let text = if self.config.debug {
                err.to_string()
            } else {
                "an error has occurred.".to_string()
            };
            self.router.reply(message, &text).await;
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// Confirmation line for a karma change: `alice == 2 (+2 for helping)`.
fn points_message(user: &UserKarma, delta: i64, reason: &str) -> String {
    let mut text = format!("{} == {} (", user.handle, user.balance);
    if delta > 0 {
        text.push('+');
    }
    text.push_str(&delta.to_string());
    if !reason.is_empty() {
        text.push_str(" for ");
        text.push_str(reason);
    }
    text.push(')');
    text
}

/// Throwback line with a human-relative timestamp.
fn throwback_message(transaction: &Transaction) -> String {
    let date = HumanTime::from(transaction.timestamp).to_string();
    let reason = if transaction.reason.is_empty() {
        String::new()
    } else {
        format!(" for {}", transaction.reason)
    };
    format!(
        "{} received {} points from {} {}{}",
        munge(&transaction.to),
        transaction.delta,
        munge(&transaction.from),
        date,
        reason
    )
}

/// Insert a zero-width space after the first character so outbound text
/// naming a handle doesn't ping the user.
fn munge(handle: &str) -> String {
    let mut chars = handle.chars();
    match chars.next() {
        Some(first) => format!("{first}\u{200B}{}", chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_message_positive_delta() {
        let user = UserKarma {
            handle: "alice".into(),
            balance: 2,
        };
        assert_eq!(points_message(&user, 2, ""), "alice == 2 (+2)");
    }

    #[test]
    fn points_message_negative_delta() {
        let user = UserKarma {
            handle: "bob".into(),
            balance: -1,
        };
        assert_eq!(points_message(&user, -1, ""), "bob == -1 (-1)");
    }

    #[test]
    fn points_message_includes_reason() {
        let user = UserKarma {
            handle: "alice".into(),
            balance: 5,
        };
        assert_eq!(
            points_message(&user, 3, "the release"),
            "alice == 5 (+3 for the release)"
        );
    }

    #[test]
    fn munge_inserts_zero_width_space() {
        assert_eq!(munge("alice"), "a\u{200B}lice");
        assert_eq!(munge(""), "");
    }

    #[test]
    fn throwback_message_names_both_parties() {
        let transaction = Transaction::new("bob", "alice", 3, "good work");
        let text = throwback_message(&transaction);
        assert!(text.contains("received 3 points from"));
        assert!(text.ends_with(" for good work"));
        assert!(text.starts_with(&munge("alice")));
        assert!(text.contains(&munge("bob")));
    }

    #[test]
    fn throwback_message_omits_empty_reason() {
        let transaction = Transaction::new("bob", "alice", 1, "");
        assert!(!throwback_message(&transaction).contains(" for "));
    }
}
