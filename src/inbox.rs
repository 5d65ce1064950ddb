//! Destination queue for messages received from room streams.

use crate::data::Message;
use tokio::sync::mpsc;

/// Anything room listeners can hand messages to.
///
/// Implementations must be safe to call from many listener tasks at once and
/// must not block for long.
pub trait Inbox: Send + Sync + 'static {
    fn enqueue(&self, message: Message);
}

/// Inbox backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelInbox {
    tx: mpsc::UnboundedSender<Message>,
}

/// Consuming side of a [`ChannelInbox`]
pub type InboxReceiver = mpsc::UnboundedReceiver<Message>;

impl ChannelInbox {
    pub fn new() -> (Self, InboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Inbox for ChannelInbox {
    fn enqueue(&self, message: Message) {
        if let Err(e) = self.tx.send(message) {
            tracing::debug!("Inbox closed, dropping message {}", e.0.id);
        }
    }
}
