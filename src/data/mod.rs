use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat room that can be monitored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Private one-to-one conversation
    #[serde(default)]
    pub one_to_one: bool,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub user_count: Option<u64>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            one_to_one: false,
            topic: None,
            user_count: None,
        }
    }

    /// Same room, flagged as a one-to-one conversation
    pub fn one_to_one(mut self) -> Self {
        self.one_to_one = true;
        self
    }

    /// Case-insensitive name comparison
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A chat service account: the agent we run as, or a message author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
        }
    }
}

/// A single chat message received from a room stream.
///
/// The pipeline treats this as an opaque payload; only the listener fills it
/// in and only the inbox consumer reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub html: Option<String>,
    pub sent: DateTime<Utc>,
    pub from_user: User,
    pub room: Room,
}

impl Message {
    /// Whether the message was written by the given account
    pub fn is_from(&self, user: &User) -> bool {
        self.from_user.id == user.id
    }
}
