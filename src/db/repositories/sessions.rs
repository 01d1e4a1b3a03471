use chrono::{DateTime, Utc};
use rusqlite::{named_params, OptionalExtension, Row};

use crate::db::{sql_int, Database, DbError};
use crate::models::{ClientMeta, Session, SessionStatus};

const SELECT_SESSION: &str =
    "SELECT id, user_id, lesson_id, context, status, started_at, ended_at FROM sessions";

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        lesson_id: row.get("lesson_id")?,
        context: row.get("context")?,
        status: row.get("status")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session, meta: &ClientMeta) -> Result<(), DbError> {
        let session = session.clone();
        let meta = meta.clone();
        self.execute(move |conn| {
            let interval = sql_int("capture_interval_ms", meta.capture_interval_ms)?;
            conn.execute(
                "INSERT INTO sessions (id, user_id, lesson_id, context, status, client, platform,
                                       capture_interval_ms, started_at, ended_at)
                 VALUES (:id, :user_id, :lesson_id, :context, :status, :client, :platform,
                         :interval, :started_at, :ended_at)",
                named_params! {
                    ":id": session.id,
                    ":user_id": session.user_id,
                    ":lesson_id": session.lesson_id,
                    ":context": session.context,
                    ":status": session.status,
                    ":client": meta.client,
                    ":platform": meta.platform,
                    ":interval": interval,
                    ":started_at": session.started_at,
                    ":ended_at": session.ended_at,
                },
            )?;
            Ok(())
        })
        .await
    }

    /// Closes a running session as completed. `Ok(false)` means it was
    /// already closed; an id the store has never seen is an error.
    pub async fn complete_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let status: Option<SessionStatus> = conn
                .query_row(
                    "SELECT status FROM sessions WHERE id = ?1",
                    [&session_id],
                    |row| row.get(0),
                )
                .optional()?;
            match status {
                None => Err(DbError::UnknownSession(session_id)),
                Some(SessionStatus::Running) => {
                    close_session(conn, &session_id, SessionStatus::Completed, ended_at)?;
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, DbError> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let session = conn
                .query_row(
                    &format!("{SELECT_SESSION} WHERE id = ?1"),
                    [&session_id],
                    session_from_row,
                )
                .optional()?;
            Ok(session)
        })
        .await
    }

    /// Sessions still marked running, i.e. cut off by a crash.
    pub async fn get_incomplete_sessions(&self) -> Result<Vec<Session>, DbError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_SESSION} WHERE status = ?1 ORDER BY started_at DESC"
            ))?;
            let sessions = stmt
                .query_map([SessionStatus::Running], session_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            close_session(conn, &session_id, SessionStatus::Interrupted, ended_at)?;
            Ok(())
        })
        .await
    }
}

fn close_session(
    conn: &rusqlite::Connection,
    session_id: &str,
    status: SessionStatus,
    ended_at: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
        rusqlite::params![status, ended_at, session_id],
    )
}
