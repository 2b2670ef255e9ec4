use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{Event, EventBus, NotificationLevel};
use crate::chat::{ChatId, ChatMessage, ChatSession};
use crate::counterpart::{CannedResponder, Matchmaker, Responder, SyntheticMatchmaker};
use crate::entity::UserIdentity;
use crate::error::{Result, SessionError};
use crate::latency::Latency;
use crate::matching::{MatchKind, MatchRequest};
use crate::moderation::{ChatOverview, Report};
use crate::store::{SessionSnapshot, SessionState};

/// The session core: matching plus the chat session store.
///
/// Cheap to clone; clones share the same state. Created once at startup and
/// handed to whatever presentation layer drives it.
#[derive(Clone)]
pub struct SessionCore {
    state: Arc<RwLock<SessionState>>,
    event_bus: Arc<EventBus>,
    scheduler: Scheduler,
    matchmaker: Arc<dyn Matchmaker>,
    responder: Arc<dyn Responder>,
}

impl SessionCore {
    pub fn new(event_bus: Arc<EventBus>, latency: Arc<dyn Latency>) -> Self {
        Self::with_collaborators(
            event_bus,
            latency,
            Arc::new(SyntheticMatchmaker),
            Arc::new(CannedResponder::default()),
        )
    }

    pub fn with_collaborators(
        event_bus: Arc<EventBus>,
        latency: Arc<dyn Latency>,
        matchmaker: Arc<dyn Matchmaker>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::new())),
            event_bus,
            scheduler: Scheduler::new(latency),
            matchmaker,
            responder,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn is_matching(&self) -> bool {
        self.state.read().await.is_matching()
    }

    /// Records who is signed in so reports name the reporter.
    pub async fn set_local_user(&self, user: Option<&UserIdentity>) {
        self.state
            .write()
            .await
            .set_local_user(user.map(|u| u.id.clone()));
    }

    pub async fn start_matching(&self, kind: MatchKind, topic: Option<&str>) -> Result<Uuid> {
        let request = MatchRequest::new(kind, topic)?;
        let topic = request.topic().map(str::to_string);

        // The completion handle is attached under the same write lock that
        // begins the attempt, so a concurrent stop always aborts its own task.
        // Publishing before the lock is released keeps `MatchingStarted` ahead
        // of whatever ends the attempt.
        let mut state = self.state.write().await;
        let attempt_id = state.begin_matching(request)?;
        let core = self.clone();
        let handle = self
            .scheduler
            .after(self.scheduler.latency().matching_delay(), async move {
                core.complete_match(attempt_id).await;
            });
        state.attach_completion(attempt_id, handle.abort_handle());

        info!(%attempt_id, ?kind, ?topic, "Matching started");
        self.event_bus.publish(Event::MatchingStarted {
            attempt_id,
            kind,
            topic,
        });

        Ok(attempt_id)
    }

    async fn complete_match(&self, attempt_id: Uuid) {
        let pending = self.state.read().await.pending_request(attempt_id).cloned();
        let Some(request) = pending else {
            debug!(%attempt_id, "Match attempt no longer outstanding");
            return;
        };

        let found = self.matchmaker.find_match(&request).await;

        let mut state = self.state.write().await;
        let Some(request) = state.settle_matching(attempt_id) else {
            debug!(%attempt_id, "Match attempt cancelled while searching");
            return;
        };

        match found {
            Ok(counterpart) => {
                let session = ChatSession::new(
                    ChatId::generate(),
                    counterpart.id,
                    counterpart.name,
                    request.topic().map(str::to_string),
                );
                info!(%attempt_id, chat_id = %session.id, "Matched");
                state.open_session(session.clone());
                self.event_bus.publish(Event::Matched(session));
            }
            Err(e) => {
                warn!(%attempt_id, "Matchmaker failed: {}", e);
                self.event_bus.publish(Event::MatchingFailed {
                    attempt_id,
                    reason: e.to_string(),
                });
                self.event_bus.publish(Event::SystemNotification {
                    level: NotificationLevel::Error,
                    message: SessionError::Matchmaker(e.to_string()).to_string(),
                });
            }
        }
    }

    /// Withdraws the outstanding match request. The attempt's completion is
    /// aborted; if it has already fired it finds the attempt gone and does
    /// nothing.
    pub async fn stop_matching(&self) -> Result<Uuid> {
        let mut state = self.state.write().await;
        let attempt_id = state.cancel_matching()?;

        info!(%attempt_id, "Matching cancelled");
        self.event_bus
            .publish(Event::MatchingCancelled { attempt_id });
        Ok(attempt_id)
    }

    /// Appends the user's message to the current chat and schedules exactly
    /// one counterpart reply. The reply lands on the originating chat by id,
    /// whether or not it is still open.
    pub async fn send_message(&self, content: &str) -> Result<ChatMessage> {
        let (chat_id, participant_id, message) = self.state.write().await.append_own(content)?;

        debug!(chat_id = %chat_id, "Message sent");
        self.event_bus.publish(Event::MessageAppended {
            chat_id: chat_id.clone(),
            message: message.clone(),
        });

        let core = self.clone();
        let incoming = message.clone();
        self.scheduler
            .after(self.scheduler.latency().reply_delay(), async move {
                core.deliver_reply(chat_id, participant_id, incoming).await;
            });

        Ok(message)
    }

    async fn deliver_reply(&self, chat_id: ChatId, participant_id: String, incoming: ChatMessage) {
        let text = self.responder.reply(&participant_id, &incoming).await;
        let reply = ChatMessage::from_participant(participant_id, text);

        let applied = self.state.write().await.append_to(&chat_id, reply);
        match applied {
            Some(message) => {
                debug!(chat_id = %chat_id, "Counterpart replied");
                self.event_bus
                    .publish(Event::MessageAppended { chat_id, message });
            }
            None => warn!(chat_id = %chat_id, "Reply for unknown chat dropped"),
        }
    }

    pub async fn report_user(&self, reason: &str) -> Result<Report> {
        let (report, report_count) = {
            let mut state = self.state.write().await;
            let report = state.report_current(reason)?;
            let count = state.report_count(&report.chat_id);
            (report, count)
        };

        info!(chat_id = %report.chat_id, report_count, "User reported");
        self.event_bus.publish(Event::UserReported {
            chat_id: report.chat_id.clone(),
            report_count,
            reason: report.reason.clone(),
        });
        self.event_bus.publish(Event::SystemNotification {
            level: NotificationLevel::Info,
            message: acknowledgement(&report.reason),
        });
        Ok(report)
    }

    pub async fn select_chat(&self, chat_id: &ChatId) -> Result<ChatSession> {
        let session = {
            let mut state = self.state.write().await;
            state.select(chat_id)?;
            state.current_chat().cloned().ok_or(SessionError::NoCurrentChat)?
        };

        self.event_bus.publish(Event::ChatSelected {
            chat_id: chat_id.clone(),
        });
        Ok(session)
    }

    /// Closes the current chat, if any. Calling it with nothing open is fine.
    pub async fn leave_chat(&self) -> Option<ChatId> {
        let left = self.state.write().await.leave();
        if let Some(chat_id) = &left {
            info!(chat_id = %chat_id, "Left chat");
            self.event_bus.publish(Event::ChatLeft {
                chat_id: chat_id.clone(),
            });
        }
        left
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.state.read().await.reports()
    }

    pub async fn chat_overview(&self) -> Vec<ChatOverview> {
        self.state.read().await.overview()
    }
}

pub fn acknowledgement(reason: &str) -> String {
    format!(
        "User reported for: {}. Our moderators will review this case.",
        reason
    )
}

/// Runs deferred work after a delay drawn from the injected latency model.
#[derive(Clone)]
pub struct Scheduler {
    latency: Arc<dyn Latency>,
}

impl Scheduler {
    pub fn new(latency: Arc<dyn Latency>) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> &Arc<dyn Latency> {
        &self.latency
    }

    pub fn after<F>(&self, delay: Duration, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counterpart::{Counterpart, CANNED_REPLY};
    use crate::entity::{Role, ANONYMOUS_STUDENT};
    use crate::latency::{FixedLatency, ScriptedLatency};
    use async_trait::async_trait;
    use tokio::time::sleep;

    const MATCH: Duration = Duration::from_millis(2000);
    const REPLY: Duration = Duration::from_millis(1000);

    fn core() -> SessionCore {
        SessionCore::new(
            Arc::new(EventBus::new()),
            Arc::new(FixedLatency::new(MATCH, REPLY)),
        )
    }

    async fn matched(core: &SessionCore, kind: MatchKind, topic: Option<&str>) -> ChatSession {
        core.start_matching(kind, topic).await.unwrap();
        sleep(MATCH + Duration::from_millis(1)).await;
        core.snapshot().await.current_chat.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn match_produces_one_fresh_session() {
        let core = core();
        core.start_matching(MatchKind::Instant, None).await.unwrap();
        assert!(core.is_matching().await);
        assert!(core.snapshot().await.chat_history.is_empty());

        sleep(MATCH + Duration::from_millis(1)).await;

        let snap = core.snapshot().await;
        assert!(!snap.is_matching);
        assert_eq!(snap.chat_history.len(), 1);
        let chat = snap.current_chat.unwrap();
        assert_eq!(chat, snap.chat_history[0]);
        assert!(chat.is_active);
        assert_eq!(chat.report_count, 0);
        assert!(chat.messages.is_empty());
        assert_eq!(chat.topic, None);
        assert_eq!(chat.participant_name, ANONYMOUS_STUDENT);
    }

    #[tokio::test(start_paused = true)]
    async fn topic_match_then_conversation() {
        let core = core();
        let chat = matched(&core, MatchKind::Topic, Some("Academic Stress")).await;
        assert_eq!(chat.topic.as_deref(), Some("Academic Stress"));
        assert!(chat.messages.is_empty());

        core.send_message("hello").await.unwrap();
        let now = core.snapshot().await.current_chat.unwrap();
        assert_eq!(now.messages.len(), 1);
        assert_eq!(now.messages[0].content, "hello");
        assert!(now.messages[0].is_own_message);

        sleep(REPLY + Duration::from_millis(1)).await;

        let snap = core.snapshot().await;
        let after = snap.current_chat.unwrap();
        assert_eq!(after.messages.len(), 2);
        assert!(!after.messages[1].is_own_message);
        assert_eq!(after.messages[1].sender_id, after.participant_id);
        assert_eq!(after.messages[1].content, CANNED_REPLY);
        assert_eq!(snap.chat_history[0].messages, after.messages);
    }

    #[tokio::test(start_paused = true)]
    async fn matching_twice_is_declined() {
        let core = core();
        core.start_matching(MatchKind::Instant, None).await.unwrap();
        assert_eq!(
            core.start_matching(MatchKind::Instant, None).await,
            Err(SessionError::AlreadyMatching)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn topic_match_without_topic_is_declined() {
        let core = core();
        assert_eq!(
            core.start_matching(MatchKind::Topic, Some(" ")).await,
            Err(SessionError::MissingTopic)
        );
        assert!(!core.is_matching().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_match_never_completes() {
        let core = core();
        core.start_matching(MatchKind::Instant, None).await.unwrap();
        sleep(MATCH / 2).await;
        core.stop_matching().await.unwrap();

        sleep(MATCH * 2).await;

        let snap = core.snapshot().await;
        assert!(!snap.is_matching);
        assert!(snap.current_chat.is_none());
        assert!(snap.chat_history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_matching_is_declined() {
        let core = core();
        assert_eq!(core.stop_matching().await, Err(SessionError::NotMatching));
    }

    #[tokio::test(start_paused = true)]
    async fn rematch_after_stop_is_not_completed_by_old_timer() {
        let core = core();
        core.start_matching(MatchKind::Instant, None).await.unwrap();
        sleep(MATCH / 2).await;
        core.stop_matching().await.unwrap();
        core.start_matching(MatchKind::Topic, Some("Loneliness")).await.unwrap();

        // The first timer would have fired here.
        sleep(MATCH / 2 + Duration::from_millis(1)).await;
        assert!(core.is_matching().await);
        assert!(core.snapshot().await.chat_history.is_empty());

        sleep(MATCH / 2).await;
        let snap = core.snapshot().await;
        assert_eq!(snap.chat_history.len(), 1);
        assert_eq!(snap.chat_history[0].topic.as_deref(), Some("Loneliness"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stop_and_start_never_strand_matching() {
        let core = SessionCore::new(
            Arc::new(EventBus::new()),
            Arc::new(FixedLatency::new(Duration::from_millis(1), REPLY)),
        );

        for _ in 0..200 {
            core.start_matching(MatchKind::Instant, None).await.unwrap();
            let _ = tokio::join!(
                core.stop_matching(),
                core.start_matching(MatchKind::Instant, None)
            );

            tokio::time::timeout(Duration::from_secs(1), async {
                while core.is_matching().await {
                    sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .expect("matching never settled");
        }
    }

    fn kind_of(event: &Event) -> &'static str {
        match event {
            Event::MatchingStarted { .. } => "started",
            Event::MatchingCancelled { .. } => "cancelled",
            Event::MatchingFailed { .. } => "failed",
            Event::Matched(_) => "matched",
            Event::MessageAppended { message, .. } if message.is_own_message => "sent",
            Event::MessageAppended { .. } => "reply",
            Event::UserReported { .. } => "reported",
            Event::ChatSelected { .. } => "selected",
            Event::ChatLeft { .. } => "left",
            Event::SignedIn(_) => "signed-in",
            Event::SignedOut => "signed-out",
            Event::SystemNotification { .. } => "notification",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_transition_is_published_in_order() {
        let core = core();
        let mut rx = core.event_bus().subscribe();

        let chat = matched(&core, MatchKind::Instant, None).await;
        core.send_message("hello").await.unwrap();
        sleep(REPLY + Duration::from_millis(1)).await;
        core.leave_chat().await;
        core.select_chat(&chat.id).await.unwrap();
        core.start_matching(MatchKind::Instant, None).await.unwrap();
        core.stop_matching().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match &event {
                Event::Matched(session) => assert_eq!(session.id, chat.id),
                Event::MessageAppended { chat_id, .. }
                | Event::ChatLeft { chat_id }
                | Event::ChatSelected { chat_id } => assert_eq!(chat_id, &chat.id),
                _ => {}
            }
            seen.push(kind_of(&event));
        }
        assert_eq!(
            seen,
            vec!["started", "matched", "sent", "reply", "left", "selected", "started", "cancelled"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blank_message_is_a_no_op() {
        let core = core();
        matched(&core, MatchKind::Instant, None).await;
        assert_eq!(core.send_message("   ").await, Err(SessionError::EmptyMessage));
        sleep(REPLY * 2).await;
        assert!(core.snapshot().await.current_chat.unwrap().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_chat_is_declined() {
        let core = core();
        assert_eq!(core.send_message("hi").await, Err(SessionError::NoCurrentChat));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_leaving_lands_in_history_only() {
        let core = core();
        let chat = matched(&core, MatchKind::Instant, None).await;
        core.send_message("hello").await.unwrap();
        assert_eq!(core.leave_chat().await, Some(chat.id.clone()));

        sleep(REPLY + Duration::from_millis(1)).await;

        let snap = core.snapshot().await;
        assert!(snap.current_chat.is_none());
        let stored = &snap.chat_history[0];
        assert_eq!(stored.messages.len(), 2);
        assert!(!stored.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_follows_its_chat_when_user_switches() {
        let core = core();
        let first = matched(&core, MatchKind::Instant, None).await;
        core.send_message("to first").await.unwrap();
        core.start_matching(MatchKind::Instant, None).await.unwrap();

        sleep(MATCH + Duration::from_millis(1)).await;

        let snap = core.snapshot().await;
        let current = snap.current_chat.unwrap();
        assert_ne!(current.id, first.id);
        assert!(current.messages.is_empty());
        let old = snap.chat_history.iter().find(|c| c.id == first.id).unwrap();
        assert_eq!(old.messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replies_apply_in_delay_order() {
        let core = SessionCore::new(
            Arc::new(EventBus::new()),
            Arc::new(ScriptedLatency::new(
                MATCH,
                vec![Duration::from_millis(3000), Duration::from_millis(1000)],
            )),
        );
        matched(&core, MatchKind::Instant, None).await;
        core.send_message("first").await.unwrap();
        core.send_message("second").await.unwrap();

        sleep(Duration::from_millis(1500)).await;
        let messages = core.snapshot().await.current_chat.unwrap().messages;
        let own: Vec<bool> = messages.iter().map(|m| m.is_own_message).collect();
        assert_eq!(own, vec![true, true, false]);

        sleep(Duration::from_millis(2000)).await;
        let messages = core.snapshot().await.current_chat.unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert!(messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_count_up_and_reach_moderation() {
        let core = core();
        core.set_local_user(Some(&UserIdentity::new("u-1", "sam", Role::Student)))
            .await;
        let chat = matched(&core, MatchKind::Instant, None).await;
        let mut rx = core.event_bus().subscribe();

        for _ in 0..3 {
            core.report_user("Spam or irrelevant messages").await.unwrap();
        }

        let snap = core.snapshot().await;
        assert_eq!(snap.current_chat.unwrap().report_count, 3);
        assert_eq!(snap.chat_history[0].report_count, 3);

        let reports = core.reports().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.chat_id == chat.id));
        assert_eq!(reports[0].reporting_user, "u-1");

        let mut acknowledged = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::SystemNotification { message, .. } = event {
                assert_eq!(message, acknowledgement("Spam or irrelevant messages"));
                acknowledged = true;
            }
        }
        assert!(acknowledged);
        assert!(core.snapshot().await.current_chat.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn report_with_blank_reason_is_declined() {
        let core = core();
        matched(&core, MatchKind::Instant, None).await;
        assert_eq!(core.report_user("").await, Err(SessionError::EmptyReason));
        assert!(core.reports().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn select_and_leave_round_trip() {
        let core = core();
        let chat = matched(&core, MatchKind::Instant, None).await;
        core.send_message("keep me").await.unwrap();
        sleep(REPLY + Duration::from_millis(1)).await;
        let before = core.snapshot().await.current_chat.unwrap().messages;

        core.select_chat(&chat.id).await.unwrap();
        core.leave_chat().await;
        assert_eq!(core.leave_chat().await, None);
        let reopened = core.select_chat(&chat.id).await.unwrap();

        assert!(!reopened.is_active);
        assert_eq!(reopened.messages, before);
        assert_eq!(core.snapshot().await.current_chat.unwrap().id, chat.id);
    }

    #[tokio::test(start_paused = true)]
    async fn select_unknown_chat_leaves_current_alone() {
        let core = core();
        let chat = matched(&core, MatchKind::Instant, None).await;
        let missing = ChatId::from("missing");
        assert_eq!(
            core.select_chat(&missing).await,
            Err(SessionError::ChatNotFound(missing))
        );
        assert_eq!(core.snapshot().await.current_chat.unwrap().id, chat.id);
    }

    struct FailingMatchmaker;

    #[async_trait]
    impl Matchmaker for FailingMatchmaker {
        async fn find_match(&self, _request: &MatchRequest) -> anyhow::Result<Counterpart> {
            anyhow::bail!("no peers online")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn matchmaker_failure_returns_to_idle() {
        let core = SessionCore::with_collaborators(
            Arc::new(EventBus::new()),
            Arc::new(FixedLatency::new(MATCH, REPLY)),
            Arc::new(FailingMatchmaker),
            Arc::new(CannedResponder::default()),
        );
        let mut rx = core.event_bus().subscribe();
        let attempt = core.start_matching(MatchKind::Instant, None).await.unwrap();
        sleep(MATCH + Duration::from_millis(1)).await;

        let snap = core.snapshot().await;
        assert!(!snap.is_matching);
        assert!(snap.chat_history.is_empty());

        let mut failed = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::MatchingFailed { attempt_id, reason } = event {
                assert_eq!(attempt_id, attempt);
                assert_eq!(reason, "no peers online");
                failed = true;
            }
        }
        assert!(failed);
    }
}
