//! Slack transport — Socket Mode events in, Web API messages out.
//!
//! A spawned reader task holds the websocket: it forwards mapped envelopes
//! to the event stream, writes acks back, and reopens the socket itself
//! when the connection drops. Envelope mapping is a pure function so the
//! wire format is testable without a connection.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::error::TransportError;
use crate::transport::{
    ChatTransport, Envelope, EventStream, MessageEvent, ReactionEvent, SentMessage,
    TransportEvent, UserDirectory,
};

/// Delay before reopening the socket after a connection failure.
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Slack chat transport.
pub struct SlackTransport {
    app_token: SecretString,
    bot_token: SecretString,
    client: reqwest::Client,
    ack_tx: Mutex<Option<UnboundedSender<String>>>,
}

impl SlackTransport {
    pub fn new(app_token: SecretString, bot_token: SecretString) -> Self {
        Self {
            app_token,
            bot_token,
            client: reqwest::Client::new(),
            ack_tx: Mutex::new(None),
        }
    }

    fn api_url(method: &str) -> String {
        format!("https://slack.com/api/{method}")
    }

    /// Call a Web API method and return the parsed body. Slack reports
    /// failures as `ok: false` with an `error` field, not HTTP status.
    async fn web_api(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let resp = self
            .client
            .post(Self::api_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Api {
                method: method.to_string(),
                reason: e.to_string(),
            })?;

        let value: serde_json::Value = resp.json().await.map_err(|e| TransportError::Api {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

        if !value.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            let reason = value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(TransportError::Api {
                method: method.to_string(),
                reason,
            });
        }

        Ok(value)
    }

    /// Request a fresh Socket Mode websocket URL.
    async fn open_socket_url(&self) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(Self::api_url("apps.connections.open"))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                reason: e.to_string(),
            })?;

        let value: serde_json::Value =
            resp.json().await.map_err(|e| TransportError::ConnectFailed {
                reason: e.to_string(),
            })?;

        if !value.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            return Err(TransportError::ConnectFailed {
                reason: value
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        value
            .get("url")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| TransportError::ConnectFailed {
                reason: "apps.connections.open returned no url".into(),
            })
    }
}

#[async_trait]
impl UserDirectory for SlackTransport {
    async fn lookup_handle(&self, user_id: &str) -> Result<String, TransportError> {
        let resp = self
            .client
            .get(Self::api_url("users.info"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user_id)])
            .send()
            .await
            .map_err(|e| TransportError::LookupFailed {
                id: user_id.to_string(),
                reason: e.to_string(),
            })?;

        let value: serde_json::Value =
            resp.json().await.map_err(|e| TransportError::LookupFailed {
                id: user_id.to_string(),
                reason: e.to_string(),
            })?;

        if !value.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            return Err(TransportError::LookupFailed {
                id: user_id.to_string(),
                reason: value
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        value
            .pointer("/user/name")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| TransportError::LookupFailed {
                id: user_id.to_string(),
                reason: "users.info returned no name".into(),
            })
    }
}

#[async_trait]
impl ChatTransport for SlackTransport {
    async fn connect(&self) -> Result<EventStream, TransportError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Envelope>();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<String>();
        *self.ack_tx.lock().expect("ack sender lock poisoned") = Some(ack_tx);

        // Validate credentials up front so bad tokens fail at startup
        // instead of inside the reader task.
        let first_url = self.open_socket_url().await?;

        let app_token = self.app_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut next_url = Some(first_url);

            loop {
                let url = match next_url.take() {
                    Some(url) => url,
                    None => {
                        match reopen_socket_url(&client, &app_token).await {
                            Ok(url) => url,
                            Err(e) => {
                                warn!(error = %e, "Socket Mode reopen failed");
                                tokio::time::sleep(RECONNECT_DELAY).await;
                                continue;
                            }
                        }
                    }
                };

                let mut ws = match connect_async(url.as_str()).await {
                    Ok((ws, _resp)) => ws,
                    Err(e) => {
                        let _ = event_tx.send(Envelope {
                            ack_id: None,
                            event: TransportEvent::ConnectionError {
                                reason: e.to_string(),
                            },
                        });
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                };

                info!("Socket Mode websocket open");

                loop {
                    tokio::select! {
                        frame = ws.next() => {
                            let text = match frame {
                                Some(Ok(Message::Text(text))) => text,
                                Some(Ok(_)) => continue,
                                Some(Err(e)) => {
                                    let _ = event_tx.send(Envelope {
                                        ack_id: None,
                                        event: TransportEvent::ConnectionError {
                                            reason: e.to_string(),
                                        },
                                    });
                                    break;
                                }
                                None => {
                                    let _ = event_tx.send(Envelope {
                                        ack_id: None,
                                        event: TransportEvent::ConnectionError {
                                            reason: "socket closed".into(),
                                        },
                                    });
                                    break;
                                }
                            };

                            let value: serde_json::Value =
                                match serde_json::from_str(text.as_str()) {
                                    Ok(v) => v,
                                    Err(e) => {
                                        warn!(error = %e, "Unparseable Socket Mode frame");
                                        continue;
                                    }
                                };

                            // Slack asks clients to reconnect via disconnect
                            // frames; reopen with a fresh URL.
                            if value.get("type").and_then(serde_json::Value::as_str)
                                == Some("disconnect")
                            {
                                let reason = value
                                    .pointer("/reason")
                                    .and_then(serde_json::Value::as_str)
                                    .unwrap_or("disconnect requested")
                                    .to_string();
                                let _ = event_tx.send(Envelope {
                                    ack_id: None,
                                    event: TransportEvent::ConnectionError { reason },
                                });
                                break;
                            }

                            match parse_envelope(&value) {
                                Some(envelope) => {
                                    if event_tx.send(envelope).is_err() {
                                        info!("Event stream closed, stopping Socket Mode reader");
                                        return;
                                    }
                                }
                                None => {
                                    // Unsupported envelopes still need their
                                    // ack or Slack redelivers them.
                                    if let Some(id) = value
                                        .get("envelope_id")
                                        .and_then(serde_json::Value::as_str)
                                    {
                                        let ack = ack_frame(id);
                                        if ws.send(Message::Text(ack.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                        ack = ack_rx.recv() => {
                            match ack {
                                Some(envelope_id) => {
                                    let ack = ack_frame(&envelope_id);
                                    if ws.send(Message::Text(ack.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => {
                                    info!("Ack channel closed, stopping Socket Mode reader");
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(event_rx)))
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<SentMessage, TransportError> {
        let mut body = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }

        let value = self.web_api("chat.postMessage", body).await?;
        Ok(SentMessage {
            channel: value
                .get("channel")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(channel)
                .to_string(),
            ts: value
                .get("ts")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn send_private(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        thread: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({
            "channel": channel,
            "user": user,
            "text": text,
        });
        if let Some(ts) = thread {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }

        self.web_api("chat.postEphemeral", body).await?;
        Ok(())
    }

    async fn ack(&self, envelope_id: &str) -> Result<(), TransportError> {
        let guard = self.ack_tx.lock().expect("ack sender lock poisoned");
        let tx = guard.as_ref().ok_or_else(|| TransportError::AckFailed {
            envelope_id: envelope_id.to_string(),
            reason: "transport not connected".into(),
        })?;
        tx.send(envelope_id.to_string())
            .map_err(|_| TransportError::AckFailed {
                envelope_id: envelope_id.to_string(),
                reason: "reader task gone".into(),
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn reopen_socket_url(
    client: &reqwest::Client,
    app_token: &SecretString,
) -> Result<String, TransportError> {
    let resp = client
        .post(SlackTransport::api_url("apps.connections.open"))
        .bearer_auth(app_token.expose_secret())
        .send()
        .await
        .map_err(|e| TransportError::ConnectFailed {
            reason: e.to_string(),
        })?;

    let value: serde_json::Value = resp.json().await.map_err(|e| TransportError::ConnectFailed {
        reason: e.to_string(),
    })?;

    value
        .get("url")
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| TransportError::ConnectFailed {
            reason: value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("apps.connections.open returned no url")
                .to_string(),
        })
}

/// The ack frame Socket Mode expects for an envelope.
fn ack_frame(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

/// Map a Socket Mode frame to a transport envelope.
///
/// Returns `None` for frames the bot does not handle (unsupported event
/// kinds, message subtypes such as edits and bot posts); the caller still
/// acks those.
fn parse_envelope(value: &serde_json::Value) -> Option<Envelope> {
    let kind = value.get("type").and_then(serde_json::Value::as_str)?;

    if kind == "hello" {
        return Some(Envelope {
            ack_id: None,
            event: TransportEvent::Connected,
        });
    }

    if kind != "events_api" {
        return None;
    }

    let ack_id = value
        .get("envelope_id")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    let event = value.pointer("/payload/event")?;
    let event_type = event.get("type").and_then(serde_json::Value::as_str)?;

    let transport_event = match event_type {
        "message" => {
            // Edits, joins, and bot posts carry a subtype; only plain user
            // messages are karma input.
            if event.get("subtype").is_some() || event.get("bot_id").is_some() {
                return None;
            }
            TransportEvent::Message(MessageEvent {
                channel: str_field(event, "channel")?,
                user: str_field(event, "user")?,
                text: str_field(event, "text")?,
                ts: str_field(event, "ts")?,
                thread_ts: event
                    .get("thread_ts")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from),
            })
        }
        "reaction_added" | "reaction_removed" => {
            let reaction = ReactionEvent {
                reaction: str_field(event, "reaction")?,
                user: str_field(event, "user")?,
                item_user: str_field(event, "item_user")?,
                channel: event
                    .pointer("/item/channel")
                    .and_then(serde_json::Value::as_str)?
                    .to_string(),
                item_ts: event
                    .pointer("/item/ts")
                    .and_then(serde_json::Value::as_str)?
                    .to_string(),
            };
            if event_type == "reaction_added" {
                TransportEvent::ReactionAdded(reaction)
            } else {
                TransportEvent::ReactionRemoved(reaction)
            }
        }
        _ => return None,
    };

    Some(Envelope {
        ack_id,
        event: transport_event,
    })
}

fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_builds_method_endpoint() {
        assert_eq!(
            SlackTransport::api_url("chat.postMessage"),
            "https://slack.com/api/chat.postMessage"
        );
    }

    #[test]
    fn ack_frame_carries_envelope_id() {
        let frame: serde_json::Value = serde_json::from_str(&ack_frame("env-1")).unwrap();
        assert_eq!(frame["envelope_id"], "env-1");
    }

    #[test]
    fn hello_frame_maps_to_connected() {
        let value = serde_json::json!({ "type": "hello", "num_connections": 1 });
        let envelope = parse_envelope(&value).unwrap();
        assert!(envelope.ack_id.is_none());
        assert!(matches!(envelope.event, TransportEvent::Connected));
    }

    #[test]
    fn message_envelope_maps_fields() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-42",
            "payload": {
                "event": {
                    "type": "message",
                    "channel": "C1",
                    "user": "U1",
                    "text": "alice++",
                    "ts": "1700000000.000100"
                }
            }
        });
        let envelope = parse_envelope(&value).unwrap();
        assert_eq!(envelope.ack_id.as_deref(), Some("env-42"));
        let TransportEvent::Message(msg) = envelope.event else {
            panic!("expected message event");
        };
        assert_eq!(msg.channel, "C1");
        assert_eq!(msg.user, "U1");
        assert_eq!(msg.text, "alice++");
        assert_eq!(msg.thread_ts, None);
    }

    #[test]
    fn threaded_message_keeps_thread_ts() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-43",
            "payload": {
                "event": {
                    "type": "message",
                    "channel": "C1",
                    "user": "U1",
                    "text": "karma alice",
                    "ts": "1700000001.000200",
                    "thread_ts": "1700000000.000100"
                }
            }
        });
        let envelope = parse_envelope(&value).unwrap();
        let TransportEvent::Message(msg) = envelope.event else {
            panic!("expected message event");
        };
        assert_eq!(msg.thread_ts.as_deref(), Some("1700000000.000100"));
    }

    #[test]
    fn message_subtypes_are_skipped() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-44",
            "payload": {
                "event": {
                    "type": "message",
                    "subtype": "message_changed",
                    "channel": "C1",
                    "user": "U1",
                    "text": "alice++",
                    "ts": "1.0"
                }
            }
        });
        assert!(parse_envelope(&value).is_none());
    }

    #[test]
    fn bot_messages_are_skipped() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-45",
            "payload": {
                "event": {
                    "type": "message",
                    "bot_id": "B1",
                    "channel": "C1",
                    "user": "U1",
                    "text": "alice == 2 (+2)",
                    "ts": "1.0"
                }
            }
        });
        assert!(parse_envelope(&value).is_none());
    }

    #[test]
    fn reaction_added_envelope_maps_fields() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-46",
            "payload": {
                "event": {
                    "type": "reaction_added",
                    "user": "U2",
                    "reaction": "+1",
                    "item_user": "U1",
                    "item": { "type": "message", "channel": "C1", "ts": "1.0" }
                }
            }
        });
        let envelope = parse_envelope(&value).unwrap();
        let TransportEvent::ReactionAdded(reaction) = envelope.event else {
            panic!("expected reaction-added event");
        };
        assert_eq!(reaction.reaction, "+1");
        assert_eq!(reaction.user, "U2");
        assert_eq!(reaction.item_user, "U1");
        assert_eq!(reaction.channel, "C1");
    }

    #[test]
    fn reaction_removed_envelope_maps_to_removed() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-47",
            "payload": {
                "event": {
                    "type": "reaction_removed",
                    "user": "U2",
                    "reaction": "-1",
                    "item_user": "U1",
                    "item": { "type": "message", "channel": "C1", "ts": "1.0" }
                }
            }
        });
        assert!(matches!(
            parse_envelope(&value).unwrap().event,
            TransportEvent::ReactionRemoved(_)
        ));
    }

    #[test]
    fn unsupported_event_kinds_are_skipped() {
        let value = serde_json::json!({
            "type": "events_api",
            "envelope_id": "env-48",
            "payload": {
                "event": { "type": "channel_joined", "channel": "C1" }
            }
        });
        assert!(parse_envelope(&value).is_none());
    }

    #[test]
    fn slash_command_frames_are_skipped() {
        let value = serde_json::json!({
            "type": "slash_commands",
            "envelope_id": "env-49",
            "payload": {}
        });
        assert!(parse_envelope(&value).is_none());
    }
}
