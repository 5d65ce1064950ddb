#![allow(dead_code)]
//! Test utilities and fakes for roomwatch tests

pub mod http;

use async_trait::async_trait;
use chrono::Utc;
use roomwatch::data::{Message, Room, User};
use roomwatch::inbox::Inbox;
use roomwatch::integrations::gitter::RoomDirectory;
use roomwatch::integrations::stream::{ListenerOutcome, MessageSink, RoomListener};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn room(id: &str, name: &str) -> Room {
    Room::new(id, name)
}

pub fn bot() -> User {
    User::new("bot-id", "roomwatch-bot")
}

pub fn message(id: &str, room: &Room, text: &str) -> Message {
    Message {
        id: id.to_string(),
        text: text.to_string(),
        html: None,
        sent: Utc::now(),
        from_user: User::new("user-id", "alice"),
        room: room.clone(),
    }
}

/// In-memory room directory
pub struct FakeDirectory {
    rooms: Result<Vec<Room>, String>,
    user: Result<User, String>,
    pub calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            rooms: Ok(rooms),
            user: Ok(bot()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_rooms(error: &str) -> Self {
        Self {
            rooms: Err(error.to_string()),
            user: Ok(bot()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_user(rooms: Vec<Room>, error: &str) -> Self {
        Self {
            rooms: Ok(rooms),
            user: Err(error.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RoomDirectory for FakeDirectory {
    async fn list_rooms(&self) -> anyhow::Result<Vec<Room>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rooms.clone().map_err(anyhow::Error::msg)
    }

    async fn current_user(&self) -> anyhow::Result<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.user.clone().map_err(anyhow::Error::msg)
    }
}

/// What a scripted listener does for its room
#[derive(Debug, Clone)]
pub enum Script {
    /// Block until cancelled
    UntilCancelled,
    /// Return `Normal` straight away
    ExitImmediately,
    /// Return `Faulted` straight away
    Fault(&'static str),
    Panic,
    /// Deliver the messages one by one, then block until cancelled
    Emit(Vec<Message>),
    /// Return `Normal` after a delay unless cancelled first
    ExitAfter(Duration),
}

/// Listener whose behavior is scripted per room name
pub struct ScriptedListener {
    scripts: HashMap<String, Script>,
    default: Script,
    pub started: AtomicUsize,
    pub active: AtomicUsize,
    pub saw_cancel: AtomicUsize,
}

impl ScriptedListener {
    pub fn new(default: Script) -> Self {
        Self {
            scripts: HashMap::new(),
            default,
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            saw_cancel: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, room_name: &str, script: Script) -> Self {
        self.scripts.insert(room_name.to_string(), script);
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> usize {
        self.saw_cancel.load(Ordering::SeqCst)
    }

    async fn until_cancelled(&self, cancel: &CancellationToken) -> ListenerOutcome {
        cancel.cancelled().await;
        self.saw_cancel.fetch_add(1, Ordering::SeqCst);
        ListenerOutcome::Cancelled
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoomListener for ScriptedListener {
    async fn listen(
        &self,
        room: &Room,
        _bot: &User,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> ListenerOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let script = self
            .scripts
            .get(&room.name)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match script {
            Script::UntilCancelled => self.until_cancelled(cancel).await,
            Script::ExitImmediately => ListenerOutcome::Normal,
            Script::Fault(detail) => ListenerOutcome::Faulted(detail.to_string()),
            Script::Panic => panic!("listener for {} exploded", room.name),
            Script::Emit(messages) => {
                for message in messages {
                    on_message(message);
                    tokio::task::yield_now().await;
                }
                self.until_cancelled(cancel).await
            }
            Script::ExitAfter(delay) => {
                tokio::select! {
                    outcome = self.until_cancelled(cancel) => outcome,
                    _ = tokio::time::sleep(delay) => ListenerOutcome::Normal,
                }
            }
        }
    }
}

/// Inbox that keeps everything it is given
#[derive(Default)]
pub struct RecordingInbox {
    messages: Mutex<Vec<Message>>,
}

impl RecordingInbox {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Message ids received from one room, in arrival order
    pub fn ids_for(&self, room_name: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.room.name == room_name)
            .map(|m| m.id)
            .collect()
    }
}

impl Inbox for RecordingInbox {
    fn enqueue(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}
