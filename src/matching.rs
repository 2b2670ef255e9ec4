//! Matching state machine: `Idle -> Matching -> {Matched, Cancelled}`.
//!
//! This module only tracks the phase. Waiting for the matchmaking delay and
//! building the session happen in [`crate::manager::SessionCore`], which
//! settles the attempt here once the delay has elapsed.

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{Result, SessionError};

pub const PREDEFINED_TOPICS: &[&str] = &[
    "Academic Stress",
    "Social Anxiety",
    "Depression",
    "Family Issues",
    "Relationship Problems",
    "Financial Stress",
    "Career Anxiety",
    "Body Image",
    "Eating Disorders",
    "Sleep Issues",
    "Loneliness",
    "Grief and Loss",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Instant,
    Topic,
}

/// A validated match request. Topic requests always carry a non-empty topic,
/// instant requests never carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRequest {
    kind: MatchKind,
    topic: Option<String>,
}

impl MatchRequest {
    pub fn new(kind: MatchKind, topic: Option<&str>) -> Result<Self> {
        match kind {
            MatchKind::Instant => Ok(Self::instant()),
            MatchKind::Topic => {
                let topic = topic
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or(SessionError::MissingTopic)?;
                Ok(Self {
                    kind,
                    topic: Some(topic.to_string()),
                })
            }
        }
    }

    pub fn instant() -> Self {
        Self {
            kind: MatchKind::Instant,
            topic: None,
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Matching {
        attempt_id: Uuid,
        request: MatchRequest,
        /// Aborts the pending completion task; set once it is spawned.
        completion: Option<AbortHandle>,
    },
}

#[derive(Debug)]
pub struct MatchingProcess {
    phase: Phase,
}

impl MatchingProcess {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn is_matching(&self) -> bool {
        matches!(self.phase, Phase::Matching { .. })
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Matching { attempt_id, .. } => Some(*attempt_id),
        }
    }

    /// The request behind `attempt_id`, if that attempt is still outstanding.
    pub fn pending_request(&self, attempt_id: Uuid) -> Option<&MatchRequest> {
        match &self.phase {
            Phase::Matching {
                attempt_id: current,
                request,
                ..
            } if *current == attempt_id => Some(request),
            _ => None,
        }
    }

    /// Idle -> Matching. Returns the id of the new attempt.
    pub fn begin(&mut self, request: MatchRequest) -> Result<Uuid> {
        if self.is_matching() {
            return Err(SessionError::AlreadyMatching);
        }
        let attempt_id = Uuid::new_v4();
        self.phase = Phase::Matching {
            attempt_id,
            request,
            completion: None,
        };
        Ok(attempt_id)
    }

    /// Binds the completion task to `attempt_id`. A handle for an attempt
    /// that is no longer outstanding is aborted on the spot.
    pub fn attach_completion(&mut self, attempt_id: Uuid, handle: AbortHandle) {
        match &mut self.phase {
            Phase::Matching {
                attempt_id: current,
                completion,
                ..
            } if *current == attempt_id => *completion = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Matching -> Idle without a session. Aborts the attempt's own
    /// completion task and returns the cancelled attempt.
    pub fn cancel(&mut self) -> Result<Uuid> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Matching {
                attempt_id,
                completion,
                ..
            } => {
                if let Some(handle) = completion {
                    handle.abort();
                }
                Ok(attempt_id)
            }
            Phase::Idle => Err(SessionError::NotMatching),
        }
    }

    /// Ends `attempt_id` if it is still the outstanding attempt and hands back
    /// its request. A stale or cancelled attempt yields `None` and leaves the
    /// phase alone.
    pub fn settle(&mut self, attempt_id: Uuid) -> Option<MatchRequest> {
        if self.current_attempt() != Some(attempt_id) {
            return None;
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Matching { request, .. } => Some(request),
            Phase::Idle => None,
        }
    }
}

impl Default for MatchingProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_request_requires_a_topic() {
        assert_eq!(
            MatchRequest::new(MatchKind::Topic, None),
            Err(SessionError::MissingTopic)
        );
        assert_eq!(
            MatchRequest::new(MatchKind::Topic, Some("   ")),
            Err(SessionError::MissingTopic)
        );
        let req = MatchRequest::new(MatchKind::Topic, Some("  Loneliness ")).unwrap();
        assert_eq!(req.topic(), Some("Loneliness"));
    }

    #[test]
    fn instant_request_ignores_topic() {
        let req = MatchRequest::new(MatchKind::Instant, Some("Depression")).unwrap();
        assert_eq!(req.kind(), MatchKind::Instant);
        assert_eq!(req.topic(), None);
    }

    #[test]
    fn cannot_begin_twice() {
        let mut process = MatchingProcess::new();
        process.begin(MatchRequest::instant()).unwrap();
        assert_eq!(
            process.begin(MatchRequest::instant()),
            Err(SessionError::AlreadyMatching)
        );
    }

    #[test]
    fn settle_returns_request_for_current_attempt() {
        let mut process = MatchingProcess::new();
        let attempt = process.begin(MatchRequest::instant()).unwrap();
        assert!(process.is_matching());
        assert_eq!(process.settle(attempt), Some(MatchRequest::instant()));
        assert!(!process.is_matching());
    }

    #[test]
    fn cancelled_attempt_cannot_settle() {
        let mut process = MatchingProcess::new();
        let attempt = process.begin(MatchRequest::instant()).unwrap();
        assert_eq!(process.cancel(), Ok(attempt));
        assert_eq!(process.settle(attempt), None);
        assert_eq!(process.cancel(), Err(SessionError::NotMatching));
    }

    #[test]
    fn stale_attempt_does_not_end_newer_one() {
        let mut process = MatchingProcess::new();
        let first = process.begin(MatchRequest::instant()).unwrap();
        process.cancel().unwrap();
        let second = process.begin(MatchRequest::instant()).unwrap();

        assert_eq!(process.settle(first), None);
        assert_eq!(process.current_attempt(), Some(second));
    }

    #[tokio::test]
    async fn cancel_aborts_only_its_own_completion() {
        let mut process = MatchingProcess::new();
        let first = process.begin(MatchRequest::instant()).unwrap();
        let first_task = tokio::spawn(std::future::pending::<()>());
        process.attach_completion(first, first_task.abort_handle());
        process.cancel().unwrap();
        assert!(first_task.await.unwrap_err().is_cancelled());

        let second = process.begin(MatchRequest::instant()).unwrap();
        let stale_task = tokio::spawn(std::future::pending::<()>());
        process.attach_completion(first, stale_task.abort_handle());
        assert!(stale_task.await.unwrap_err().is_cancelled());

        let live_task = tokio::spawn(std::future::pending::<()>());
        process.attach_completion(second, live_task.abort_handle());
        assert_eq!(process.settle(second), Some(MatchRequest::instant()));
        assert!(!live_task.is_finished());
        live_task.abort();
    }

    #[test]
    fn pending_request_is_scoped_to_its_attempt() {
        let mut process = MatchingProcess::new();
        let request = MatchRequest::new(MatchKind::Topic, Some("Sleep Issues")).unwrap();
        let attempt = process.begin(request.clone()).unwrap();
        assert_eq!(process.pending_request(attempt), Some(&request));
        assert_eq!(process.pending_request(Uuid::new_v4()), None);
        process.settle(attempt);
        assert_eq!(process.pending_request(attempt), None);
    }
}
