//! Read-only moderation data: the report feed and a per-chat overview.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ChatId, ChatSession};
use crate::entity::Role;
use crate::error::{Result, SessionError};

pub const OTHER_REASON: &str = "Other";

pub const REPORT_REASONS: &[&str] = &[
    "Inappropriate language or content",
    "Harassment or bullying",
    "Sharing personal information",
    "Trolling or not taking seriously",
    "Promoting harmful behavior",
    "Spam or irrelevant messages",
    "Threatening behavior",
    OTHER_REASON,
];

/// Picks the reason string to submit: the free-text details when "Other" is
/// selected, the selection itself otherwise. Blank results are declined.
pub fn resolve_reason(selected: &str, details: Option<&str>) -> Result<String> {
    let reason = if selected == OTHER_REASON {
        details.unwrap_or_default()
    } else {
        selected
    };
    if reason.trim().is_empty() {
        return Err(SessionError::EmptyReason);
    }
    Ok(reason.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub chat_id: ChatId,
    pub reported_user: String,
    pub reporting_user: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
}

impl Report {
    pub fn pending(
        chat_id: ChatId,
        reported_user: impl Into<String>,
        reporting_user: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            reported_user: reported_user.into(),
            reporting_user: reporting_user.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
            status: ReportStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatOverview {
    pub id: ChatId,
    pub participants: Vec<String>,
    pub topic: Option<String>,
    pub message_count: usize,
    pub is_active: bool,
    pub report_count: u32,
    pub last_activity: DateTime<Utc>,
}

impl ChatOverview {
    pub fn from_session(session: &ChatSession, local_user: &str) -> Self {
        Self {
            id: session.id.clone(),
            participants: vec![local_user.to_string(), session.participant_id.clone()],
            topic: session.topic.clone(),
            message_count: session.messages.len(),
            is_active: session.is_active,
            report_count: session.report_count,
            last_activity: session.last_activity,
        }
    }
}

/// Whether `role` may see moderation data at all.
pub fn ensure_moderator(role: Role) -> std::result::Result<(), Role> {
    if role.can_moderate() {
        Ok(())
    } else {
        Err(role)
    }
}
