use crate::chat::{ChatId, ChatMessage, ChatSession};
use crate::entity::UserIdentity;
use crate::matching::MatchKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A match request is now outstanding
    MatchingStarted {
        attempt_id: Uuid,
        kind: MatchKind,
        topic: Option<String>,
    },

    /// The user withdrew the outstanding match request
    MatchingCancelled { attempt_id: Uuid },

    /// The matchmaker could not produce a counterpart
    MatchingFailed { attempt_id: Uuid, reason: String },

    /// A new session was created and is now current
    Matched(ChatSession),

    /// A message was appended to a session (own or counterpart)
    MessageAppended { chat_id: ChatId, message: ChatMessage },

    /// The counterpart of a session was reported
    UserReported {
        chat_id: ChatId,
        report_count: u32,
        reason: String,
    },

    ChatSelected { chat_id: ChatId },

    ChatLeft { chat_id: ChatId },

    SignedIn(UserIdentity),

    SignedOut,

    /// A user-visible notice (report acknowledgement, failures)
    SystemNotification {
        level: NotificationLevel,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
