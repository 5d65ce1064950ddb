//! Gitter streaming API: one long-lived HTTP response per room.
//!
//! The stream endpoint answers with a never-ending body of newline delimited
//! JSON. Each non-blank line is a chat message; lines holding only whitespace
//! are keep-alive heartbeats.
//!
//! ```text
//! GET /v1/rooms/<id>/chatMessages
//!
//! {"id":"...","text":"hi","sent":"...","fromUser":{...}}\n
//!  \n                                                  <- heartbeat
//! {"id":"...","text":"there","sent":"...","fromUser":{...}}\n
//! ```

use crate::config::GitterConfig;
use crate::data::{Message, Room, User};
use crate::integrations::join_url;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// How a room listener finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The remote stream ended on its own
    Normal,
    /// The listener saw the cancellation signal and stopped
    Cancelled,
    /// Anything else: connection failure, bad status, transport error, panic
    Faulted(String),
}

impl ListenerOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

impl fmt::Display for ListenerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("stream ended"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Faulted(detail) => write!(f, "faulted: {}", detail),
        }
    }
}

/// Callback a listener hands each received message to
pub type MessageSink<'a> = &'a (dyn Fn(Message) + Send + Sync);

/// Streams a single room's messages until the stream ends, fails, or
/// `cancel` fires.
///
/// Implementations must return promptly once `cancel` is set, and must report
/// that case as [`ListenerOutcome::Cancelled`].
#[async_trait]
pub trait RoomListener: Send + Sync + 'static {
    async fn listen(
        &self,
        room: &Room,
        bot: &User,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> ListenerOutcome;
}

pub struct GitterStreamListener {
    http: reqwest::Client,
    stream_url: String,
    token: String,
}

impl GitterStreamListener {
    pub fn new(http: reqwest::Client, config: &GitterConfig) -> Self {
        Self {
            http,
            stream_url: config.stream_url.clone(),
            token: config.token.clone(),
        }
    }

    fn room_url(&self, room: &Room) -> String {
        join_url(
            &self.stream_url,
            &format!("v1/rooms/{}/chatMessages", urlencoding::encode(&room.id)),
        )
    }
}

#[async_trait]
impl RoomListener for GitterStreamListener {
    async fn listen(
        &self,
        room: &Room,
        bot: &User,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> ListenerOutcome {
        let request = self
            .http
            .get(self.room_url(room))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ListenerOutcome::Cancelled,
            response = request => response,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => return ListenerOutcome::Faulted(format!("failed to connect: {}", e)),
        };

        if !response.status().is_success() {
            return ListenerOutcome::Faulted(format!(
                "stream returned status {}",
                response.status()
            ));
        }

        tracing::debug!("Listening to {}", room);

        let mut body = response.bytes_stream();
        let mut decoder = LineDecoder::default();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ListenerOutcome::Cancelled,
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => match decoder.push(&bytes) {
                    Ok(lines) => {
                        for line in lines {
                            deliver(&line, room, bot, on_message);
                        }
                    }
                    Err(e) => return ListenerOutcome::Faulted(e.to_string()),
                },
                Some(Err(e)) => {
                    return ListenerOutcome::Faulted(format!("stream error: {}", e));
                }
                None => {
                    if let Some(line) = decoder.finish() {
                        deliver(&line, room, bot, on_message);
                    }
                    tracing::debug!("Stream for {} ended", room);
                    return ListenerOutcome::Normal;
                }
            }
        }
    }
}

fn deliver(line: &str, room: &Room, bot: &User, on_message: MessageSink<'_>) {
    match parse_message_line(line, room) {
        Ok(Some(message)) if message.is_from(bot) => {
            tracing::trace!("Skipping own message {} in {}", message.id, room);
        }
        Ok(Some(message)) => on_message(message),
        Ok(None) => {}
        Err(e) => tracing::warn!("Skipping undecodable message in {}: {}", room, e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    html: Option<String>,
    sent: DateTime<Utc>,
    from_user: User,
}

/// Decode one line of the stream. Heartbeats decode to `None`.
pub fn parse_message_line(line: &str, room: &Room) -> Result<Option<Message>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let wire: WireMessage = serde_json::from_str(line)?;
    Ok(Some(Message {
        id: wire.id,
        text: wire.text,
        html: wire.html,
        sent: wire.sent,
        from_user: wire.from_user,
        room: room.clone(),
    }))
}

/// Longest line a stream may send before the listener gives up on it
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked byte stream into lines.
///
/// Chunks may end mid-line (or mid UTF-8 sequence); the tail is buffered until
/// the next newline arrives. A tail longer than the limit is an error.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already known to hold no newline
    scanned: usize,
    limit: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    /// Feed a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.limit {
            anyhow::bail!(
                "line too long: {} bytes without a newline (limit {})",
                self.buffer.len(),
                self.limit
            );
        }
        Ok(lines)
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
