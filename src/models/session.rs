use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which trackable screen opened the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionContext {
    Lesson,
    Quiz,
}

impl SessionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionContext::Lesson => "lesson",
            SessionContext::Quiz => "quiz",
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        SessionContext::Lesson
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Interrupted => "Interrupted",
        }
    }
}

/// Client metadata sent along with `start_session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub user_id: Option<String>,
    pub context: SessionContext,
    pub client: String,
    pub platform: String,
    pub capture_interval_ms: u64,
}

impl ClientMeta {
    pub fn new(user_id: Option<String>, context: SessionContext, capture_interval_ms: u64) -> Self {
        Self {
            user_id,
            context,
            client: format!("attentio/{}", env!("CARGO_PKG_VERSION")),
            platform: std::env::consts::OS.to_string(),
            capture_interval_ms,
        }
    }
}

/// What a screen asks for when it opens a monitored session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub lesson_id: String,
    pub meta: ClientMeta,
}

/// One lesson or quiz viewing. `ended_at == None` means the session is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub lesson_id: String,
    pub context: SessionContext,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
