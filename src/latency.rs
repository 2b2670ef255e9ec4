//! Simulated latency for matchmaking, counterpart replies and sign-in.
//!
//! Everything that waits goes through a [`Latency`] so tests can pin the
//! delays and drive them with tokio's paused clock.

use rand::Rng;
use std::time::Duration;

pub trait Latency: Send + Sync {
    fn matching_delay(&self) -> Duration;
    /// Drawn independently for every sent message.
    fn reply_delay(&self) -> Duration;
    /// Sign-in delay.
    fn auth_delay(&self) -> Duration;
    /// Registration takes longer than sign-in.
    fn register_delay(&self) -> Duration;
}

/// Fixed matching delay, reply delay of `reply_min + U[0, reply_jitter)`.
#[derive(Debug, Clone)]
pub struct RandomizedLatency {
    pub matching: Duration,
    pub reply_min: Duration,
    pub reply_jitter: Duration,
    pub auth: Duration,
    pub register: Duration,
}

impl Default for RandomizedLatency {
    fn default() -> Self {
        Self {
            matching: Duration::from_millis(2000),
            reply_min: Duration::from_millis(1000),
            reply_jitter: Duration::from_millis(2000),
            auth: Duration::from_millis(1000),
            register: Duration::from_millis(1500),
        }
    }
}

impl Latency for RandomizedLatency {
    fn matching_delay(&self) -> Duration {
        self.matching
    }

    fn reply_delay(&self) -> Duration {
        let jitter_ms = self.reply_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.reply_min;
        }
        self.reply_min + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }

    fn auth_delay(&self) -> Duration {
        self.auth
    }

    fn register_delay(&self) -> Duration {
        self.register
    }
}

#[derive(Debug, Clone)]
pub struct FixedLatency {
    pub matching: Duration,
    pub reply: Duration,
    pub auth: Duration,
    pub register: Duration,
}

impl FixedLatency {
    pub fn new(matching: Duration, reply: Duration) -> Self {
        Self {
            matching,
            reply,
            auth: Duration::ZERO,
            register: Duration::ZERO,
        }
    }
}

impl Latency for FixedLatency {
    fn matching_delay(&self) -> Duration {
        self.matching
    }

    fn reply_delay(&self) -> Duration {
        self.reply
    }

    fn auth_delay(&self) -> Duration {
        self.auth
    }

    fn register_delay(&self) -> Duration {
        self.register
    }
}

/// Replays a list of reply delays in order, then repeats the last one.
#[cfg(test)]
pub struct ScriptedLatency {
    pub matching: Duration,
    replies: std::sync::Mutex<std::collections::VecDeque<Duration>>,
    last: Duration,
}

#[cfg(test)]
impl ScriptedLatency {
    pub fn new(matching: Duration, replies: Vec<Duration>) -> Self {
        let last = replies.last().copied().unwrap_or_default();
        Self {
            matching,
            replies: std::sync::Mutex::new(replies.into()),
            last,
        }
    }
}

#[cfg(test)]
impl Latency for ScriptedLatency {
    fn matching_delay(&self) -> Duration {
        self.matching
    }

    fn reply_delay(&self) -> Duration {
        self.replies.lock().unwrap().pop_front().unwrap_or(self.last)
    }

    fn auth_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn register_delay(&self) -> Duration {
        Duration::ZERO
    }
}
