use crate::{
    chat::{ChatId, ChatMessage, ChatSession, SELF_SENDER_ID},
    error::{Result, SessionError},
    matching::{MatchRequest, MatchingProcess},
    moderation::{ChatOverview, Report},
};
use serde::Serialize;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Everything the presentation layer renders, cloned out of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub current_chat: Option<ChatSession>,
    pub chat_history: Vec<ChatSession>,
    pub is_matching: bool,
}

/// In-memory session state for the lifetime of the process.
///
/// The current chat is kept as an id into `history`, so the two can never
/// disagree. All mutation goes through the methods below; callers hold the
/// single lock around this struct in [`crate::manager::SessionCore`].
#[derive(Debug, Default)]
pub struct SessionState {
    /// Newest first.
    history: Vec<ChatSession>,
    current: Option<ChatId>,
    matching: MatchingProcess,
    /// Newest last.
    reports: Vec<Report>,
    local_user_id: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_chat: self.current_chat().cloned(),
            chat_history: self.history.clone(),
            is_matching: self.matching.is_matching(),
        }
    }

    pub fn is_matching(&self) -> bool {
        self.matching.is_matching()
    }

    pub fn current_chat(&self) -> Option<&ChatSession> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<&ChatSession> {
        self.history.iter().find(|c| &c.id == chat_id)
    }

    fn get_mut(&mut self, chat_id: &ChatId) -> Option<&mut ChatSession> {
        self.history.iter_mut().find(|c| &c.id == chat_id)
    }

    fn current_mut(&mut self) -> Result<&mut ChatSession> {
        let id = self.current.clone().ok_or(SessionError::NoCurrentChat)?;
        self.get_mut(&id).ok_or(SessionError::NoCurrentChat)
    }

    pub fn set_local_user(&mut self, user_id: Option<String>) {
        self.local_user_id = user_id;
    }

    fn local_user(&self) -> &str {
        self.local_user_id.as_deref().unwrap_or(SELF_SENDER_ID)
    }

    pub fn begin_matching(&mut self, request: MatchRequest) -> Result<Uuid> {
        self.matching.begin(request)
    }

    pub fn attach_completion(&mut self, attempt_id: Uuid, handle: AbortHandle) {
        self.matching.attach_completion(attempt_id, handle)
    }

    pub fn cancel_matching(&mut self) -> Result<Uuid> {
        self.matching.cancel()
    }

    pub fn settle_matching(&mut self, attempt_id: Uuid) -> Option<MatchRequest> {
        self.matching.settle(attempt_id)
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        self.matching.current_attempt()
    }

    pub fn pending_request(&self, attempt_id: Uuid) -> Option<&MatchRequest> {
        self.matching.pending_request(attempt_id)
    }

    /// Prepends a freshly matched session to history and makes it current.
    pub fn open_session(&mut self, session: ChatSession) {
        self.current = Some(session.id.clone());
        self.history.insert(0, session);
    }

    /// Appends the local user's message to the current chat. Returns the chat
    /// id and the counterpart id so the caller can schedule the reply.
    pub fn append_own(&mut self, content: &str) -> Result<(ChatId, String, ChatMessage)> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let chat = self.current_mut()?;
        let message = chat.append(ChatMessage::own(content)).clone();
        Ok((chat.id.clone(), chat.participant_id.clone(), message))
    }

    /// Appends to a session by id, wherever it is. Never touches `current`.
    pub fn append_to(&mut self, chat_id: &ChatId, message: ChatMessage) -> Option<ChatMessage> {
        let chat = self.get_mut(chat_id)?;
        Some(chat.append(message).clone())
    }

    pub fn report_current(&mut self, reason: &str) -> Result<Report> {
        if reason.trim().is_empty() {
            return Err(SessionError::EmptyReason);
        }
        let reporter = self.local_user().to_string();
        let chat = self.current_mut()?;
        chat.report_count += 1;
        let report = Report::pending(chat.id.clone(), chat.participant_id.clone(), reporter, reason);
        self.reports.push(report.clone());
        Ok(report)
    }

    pub fn report_count(&self, chat_id: &ChatId) -> u32 {
        self.get(chat_id).map(|c| c.report_count).unwrap_or(0)
    }

    /// Reopens any session from history, active or not.
    pub fn select(&mut self, chat_id: &ChatId) -> Result<()> {
        if self.get(chat_id).is_none() {
            return Err(SessionError::ChatNotFound(chat_id.clone()));
        }
        self.current = Some(chat_id.clone());
        Ok(())
    }

    /// Marks the current chat inactive and clears it. `None` when nothing
    /// was open.
    pub fn leave(&mut self) -> Option<ChatId> {
        let id = self.current.take()?;
        if let Some(chat) = self.get_mut(&id) {
            chat.is_active = false;
        }
        Some(id)
    }

    /// Newest first.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.iter().rev().cloned().collect()
    }

    pub fn overview(&self) -> Vec<ChatOverview> {
        let local = self.local_user();
        self.history
            .iter()
            .map(|c| ChatOverview::from_session(c, local))
            .collect()
    }
}
