//! Reply routing — decides where a bot response lands.
//!
//! The reply path is best-effort and decoupled from the write path: send
//! failures are logged, never retried, and never roll back an
//! already-committed ledger write.

use std::sync::Arc;

use tracing::error;

use crate::config::ReplyMode;
use crate::transport::{ChatTransport, MessageEvent};

/// Delivers rendered replies per the configured reply mode.
pub struct ReplyRouter {
    transport: Arc<dyn ChatTransport>,
    mode: ReplyMode,
}

impl ReplyRouter {
    pub fn new(transport: Arc<dyn ChatTransport>, mode: ReplyMode) -> Self {
        Self { transport, mode }
    }

    /// The thread a reply belongs in, for the configured mode.
    ///
    /// `message` replies stay in the triggering message's thread if it has
    /// one; `thread` replies always thread, rooting a new thread at the
    /// triggering message's own timestamp when none exists yet.
    fn reply_thread<'a>(&self, message: &'a MessageEvent) -> Option<&'a str> {
        match self.mode {
            ReplyMode::Message | ReplyMode::Ephemeral => message.thread_ts.as_deref(),
            ReplyMode::Thread => Some(message.thread_ts.as_deref().unwrap_or(&message.ts)),
        }
    }

    /// Deliver a reply to the triggering message. Exactly one outbound send
    /// per invocation.
    pub async fn reply(&self, message: &MessageEvent, text: &str) {
        let thread = self.reply_thread(message);
        let result = match self.mode {
            ReplyMode::Ephemeral => {
                self.transport
                    .send_private(&message.channel, &message.user, text, thread)
                    .await
            }
            ReplyMode::Message | ReplyMode::Thread => self
                .transport
                .send(&message.channel, text, thread)
                .await
                .map(|_| ()),
        };
        if let Err(err) = result {
            error!(error = %err, channel = %message.channel, "Failed to send reply");
        }
    }

    /// Deliver a private message to one user regardless of reply mode.
    /// Reaction confirmations go through here.
    pub async fn reply_private(&self, channel: &str, user: &str, text: &str) {
        if let Err(err) = self.transport.send_private(channel, user, text, None).await {
            error!(error = %err, channel = %channel, "Failed to send ephemeral reply");
        }
    }
}
