//! The other side of a chat. There is no real pairing service yet, so the
//! default implementations fabricate an anonymous peer and a canned reply.

use async_trait::async_trait;
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::entity::ANONYMOUS_STUDENT;
use crate::matching::MatchRequest;

pub const CANNED_REPLY: &str = "Thanks for sharing. I understand how you're feeling.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterpart {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait Matchmaker: Send + Sync {
    async fn find_match(&self, request: &MatchRequest) -> anyhow::Result<Counterpart>;
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, participant_id: &str, incoming: &ChatMessage) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SyntheticMatchmaker;

#[async_trait]
impl Matchmaker for SyntheticMatchmaker {
    async fn find_match(&self, _request: &MatchRequest) -> anyhow::Result<Counterpart> {
        Ok(Counterpart {
            id: Uuid::new_v4().simple().to_string(),
            name: ANONYMOUS_STUDENT.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CannedResponder {
    text: String,
}

impl CannedResponder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for CannedResponder {
    fn default() -> Self {
        Self::new(CANNED_REPLY)
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn reply(&self, _participant_id: &str, _incoming: &ChatMessage) -> String {
        self.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_matches_are_anonymous_and_unique() {
        let matchmaker = SyntheticMatchmaker;
        let a = matchmaker.find_match(&MatchRequest::instant()).await.unwrap();
        let b = matchmaker.find_match(&MatchRequest::instant()).await.unwrap();
        assert_eq!(a.name, ANONYMOUS_STUDENT);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn canned_responder_always_acknowledges() {
        let responder = CannedResponder::default();
        let reply = responder.reply("p1", &ChatMessage::own("hello")).await;
        assert_eq!(reply, CANNED_REPLY);
    }
}
