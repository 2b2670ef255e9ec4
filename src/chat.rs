use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sender id used for messages written by the local user.
pub const SELF_SENDER_ID: &str = "self";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_own_message: bool,
}

impl ChatMessage {
    /// A message written by the local user.
    pub fn own(content: impl Into<String>) -> Self {
        Self::new(SELF_SENDER_ID, content)
    }

    /// A message written by the matched counterpart.
    pub fn from_participant(participant_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(participant_id, content)
    }

    fn new(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            id: Uuid::new_v4().to_string(),
            is_own_message: sender_id == SELF_SENDER_ID,
            sender_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: ChatId,
    pub participant_id: String,
    pub participant_name: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub report_count: u32,
}

impl ChatSession {
    pub fn new(
        id: ChatId,
        participant_id: impl Into<String>,
        participant_name: impl Into<String>,
        topic: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            participant_id: participant_id.into(),
            participant_name: participant_name.into(),
            messages: Vec::new(),
            topic,
            is_active: true,
            created_at: now,
            last_activity: now,
            report_count: 0,
        }
    }

    /// Appends a message, clamping its timestamp so the sequence never goes
    /// backwards, and bumps `last_activity`.
    pub fn append(&mut self, mut message: ChatMessage) -> &ChatMessage {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        if message.timestamp > self.last_activity {
            self.last_activity = message.timestamp;
        }
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
