//! Chat transport abstraction — event delivery and message posting.
//!
//! The core depends only on these traits; the production socket-mode
//! implementation and the test doubles are interchangeable behind them.

pub mod slack;

pub use slack::SlackTransport;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;

/// A plain chat message event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub channel: String,
    /// Platform user id of the sender.
    pub user: String,
    pub text: String,
    /// The message's own timestamp, which doubles as its thread root id.
    pub ts: String,
    /// Set when the message was posted inside an existing thread.
    pub thread_ts: Option<String>,
}

/// An emoji reaction event (added or removed).
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    /// Emoji identifier, without colons.
    pub reaction: String,
    /// Platform user id of the reactor.
    pub user: String,
    /// Platform user id of the reacted-to item's owner.
    pub item_user: String,
    pub channel: String,
    pub item_ts: String,
}

/// Events the transport delivers to the dispatcher.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection came up. Observed, not managed, by the core.
    Connected,
    /// The connection failed; the transport handles reconnection itself.
    ConnectionError { reason: String },
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
}

/// A delivered event plus the ack token the transport protocol expects
/// back, if any.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub ack_id: Option<String>,
    pub event: TransportEvent,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Envelope> + Send>>;

/// Maps platform user ids to handles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a platform user id (`U123…`) to a display handle.
    async fn lookup_handle(&self, user_id: &str) -> Result<String, TransportError>;
}

/// The id and thread root of a successfully posted message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: String,
    pub ts: String,
}

/// Bidirectional chat transport.
#[async_trait]
pub trait ChatTransport: UserDirectory {
    /// Connect and return the inbound event stream. The stream stays open
    /// across reconnects; it ends only when the transport shuts down.
    async fn connect(&self) -> Result<EventStream, TransportError>;

    /// Post a message to a channel, optionally inside a thread.
    async fn send(
        &self,
        channel: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<SentMessage, TransportError>;

    /// Post a message visible only to one user in a channel.
    async fn send_private(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Acknowledge receipt of an envelope that requires one.
    async fn ack(&self, envelope_id: &str) -> Result<(), TransportError>;
}
