use rusqlite::params;

use crate::db::{Database, DbError};
use crate::models::AttentionAlert;

impl Database {
    pub async fn insert_alert(&self, alert: &AttentionAlert) -> Result<i64, DbError> {
        let alert = alert.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO attention_alerts (session_id, reason, raised_at) VALUES (?1, ?2, ?3)",
                params![alert.session_id, alert.reason, alert.raised_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Alerts in the order they were raised.
    pub async fn get_alerts_for_session(&self, session_id: &str) -> Result<Vec<AttentionAlert>, DbError> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, session_id, reason, raised_at
                 FROM attention_alerts
                 WHERE session_id = ?1
                 ORDER BY id",
            )?;
            let alerts = stmt
                .query_map([&session_id], |row| {
                    Ok(AttentionAlert {
                        id: row.get("id")?,
                        session_id: row.get("session_id")?,
                        reason: row.get("reason")?,
                        raised_at: row.get("raised_at")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(alerts)
        })
        .await
    }
}
