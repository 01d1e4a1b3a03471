use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::Database,
    models::{AlertReason, AttentionAlert, ClientMeta, Session, SessionStatus, TelemetryEvent},
};

use super::IngestionClient;

/// Ingestion sink backed by the local SQLite database, for offline use.
#[derive(Clone)]
pub struct LocalIngestion {
    db: Database,
}

impl LocalIngestion {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Sessions still running at startup were cut off by a crash; close them
    /// as interrupted. Returns how many were recovered.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let stale = self.db.get_incomplete_sessions().await?;
        let now = Utc::now();
        for session in &stale {
            warn!(
                "Recovered incomplete session {}; marking as Interrupted",
                session.id
            );
            self.db.mark_session_interrupted(&session.id, now).await?;
        }
        Ok(stale.len())
    }
}

#[async_trait]
impl IngestionClient for LocalIngestion {
    async fn start_session(&self, lesson_id: &str, meta: &ClientMeta) -> Result<String> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: meta.user_id.clone(),
            lesson_id: lesson_id.to_string(),
            context: meta.context,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.db.insert_session(&session, meta).await?;
        info!("Local session {} started for lesson {lesson_id}", session.id);
        Ok(session.id)
    }

    async fn send_events(&self, session_id: &str, events: &[TelemetryEvent]) -> Result<()> {
        let inserted = self.db.insert_events(session_id, events).await?;
        if inserted < events.len() {
            debug!(
                "Skipped {} already stored events for session {session_id}",
                events.len() - inserted
            );
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<()> {
        if !self.db.complete_session(session_id, Utc::now()).await? {
            debug!("Session {session_id} was already closed");
        }
        Ok(())
    }

    async fn raise_attention_alert(&self, session_id: &str, reason: AlertReason) -> Result<()> {
        self.db
            .insert_alert(&AttentionAlert {
                id: None,
                session_id: session_id.to_string(),
                reason,
                raised_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
