//! Simulated identity gate.
//!
//! Credentials are accepted as-is and never stored. The only thing this
//! produces is the [`UserIdentity`] (role + opaque id) the session core and
//! the moderation routes are gated on.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::bus::{Event, EventBus};
use crate::entity::{Role, UserIdentity};
use crate::error::AuthError;
use crate::latency::Latency;

pub struct Authenticator {
    latency: Arc<dyn Latency>,
    event_bus: Arc<EventBus>,
    current: RwLock<Option<UserIdentity>>,
}

impl Authenticator {
    pub fn new(latency: Arc<dyn Latency>, event_bus: Arc<EventBus>) -> Self {
        Self {
            latency,
            event_bus,
            current: RwLock::new(None),
        }
    }

    pub async fn current(&self) -> Option<UserIdentity> {
        self.current.read().await.clone()
    }

    pub async fn login(
        &self,
        username: &str,
        _password: &str,
        role: Role,
    ) -> Result<UserIdentity, AuthError> {
        let username = validate(username, role)?;
        tokio::time::sleep(self.latency.auth_delay()).await;
        Ok(self.sign_in(username, role).await)
    }

    /// Teachers must attach a verification document; students need nothing.
    pub async fn register(
        &self,
        username: &str,
        _password: &str,
        role: Role,
        verification_document: Option<&str>,
    ) -> Result<UserIdentity, AuthError> {
        let username = validate(username, role)?;
        tokio::time::sleep(self.latency.register_delay()).await;

        let has_document = verification_document.is_some_and(|d| !d.trim().is_empty());
        if role == Role::Teacher && !has_document {
            return Err(AuthError::VerificationRequired);
        }
        Ok(self.sign_in(username, role).await)
    }

    pub async fn logout(&self) -> Option<UserIdentity> {
        let previous = self.current.write().await.take();
        if let Some(user) = &previous {
            info!(user = %user, "Signed out");
            self.event_bus.publish(Event::SignedOut);
        }
        previous
    }

    async fn sign_in(&self, username: String, role: Role) -> UserIdentity {
        let user = UserIdentity::new(Uuid::new_v4().simple().to_string(), username, role);
        *self.current.write().await = Some(user.clone());
        info!(user = %user, role = %role, "Signed in");
        self.event_bus.publish(Event::SignedIn(user.clone()));
        user
    }
}

fn validate(username: &str, role: Role) -> Result<String, AuthError> {
    match role {
        Role::Student | Role::Teacher => {}
        Role::Admin => return Err(AuthError::RoleNotAllowed(role.to_string())),
    }
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::EmptyUsername);
    }
    Ok(username.to_string())
}
