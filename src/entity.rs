use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder shown in place of a student's name.
pub const ANONYMOUS_STUDENT: &str = "Anonymous Student";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Whether this role may open the moderation dashboard.
    pub fn can_moderate(self) -> bool {
        match self {
            Role::Student => false,
            Role::Teacher | Role::Admin => true,
        }
    }

    /// Students always appear anonymously.
    pub fn is_anonymous(self) -> bool {
        match self {
            Role::Student => true,
            Role::Teacher | Role::Admin => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The signed-in user, as supplied by the identity gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub is_anonymous: bool,
    pub verified: bool,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            is_anonymous: role.is_anonymous(),
            verified: matches!(role, Role::Teacher),
        }
    }

    pub fn display_name(&self) -> &str {
        match self.role {
            Role::Student => ANONYMOUS_STUDENT,
            Role::Teacher | Role::Admin => &self.username,
        }
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}
