use thiserror::Error;

use crate::chat::ChatId;

/// Reasons the session core declines an operation.
///
/// None of these are fatal: state is left untouched and the caller may retry
/// with corrected input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("message content is empty")]
    EmptyMessage,

    #[error("report reason is empty")]
    EmptyReason,

    #[error("topic matching requires a non-empty topic")]
    MissingTopic,

    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error("no chat is currently open")]
    NoCurrentChat,

    #[error("a match request is already outstanding")]
    AlreadyMatching,

    #[error("no match request is outstanding")]
    NotMatching,

    #[error("matchmaker failed: {0}")]
    Matchmaker(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("username is empty")]
    EmptyUsername,

    #[error("teacher accounts require a verification document")]
    VerificationRequired,

    #[error("role {0} cannot sign in directly")]
    RoleNotAllowed(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
