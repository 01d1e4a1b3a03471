use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{models::StoredEvent, Database, DbError};
use crate::models::TelemetryEvent;

fn stored_event_from_row(row: &Row) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        row_id: row.get("id")?,
        session_id: row.get("session_id")?,
        event_id: row.get("event_id")?,
        kind: row.get("kind")?,
        payload: row.get("payload_json")?,
        ts: row.get("ts")?,
        received_at: row.get("received_at")?,
    })
}

impl Database {
    /// Stores a batch atomically. A redelivered event (same session and event
    /// id) is skipped; returns how many rows were new.
    pub async fn insert_events(
        &self,
        session_id: &str,
        events: &[TelemetryEvent],
    ) -> Result<usize, DbError> {
        let session_id = session_id.to_string();
        let rows = events
            .iter()
            .map(|event| -> Result<_, DbError> {
                let payload = serde_json::to_value(&event.body)?;
                Ok((event.id.clone(), event.kind(), payload, event.ts))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.execute(move |conn| {
            let received_at = Utc::now();
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO telemetry_events
                         (session_id, event_id, kind, payload_json, ts, received_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (event_id, kind, payload, ts) in &rows {
                    inserted +=
                        stmt.execute(params![session_id, event_id, kind, payload, ts, received_at])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    pub async fn get_events_for_session(&self, session_id: &str) -> Result<Vec<StoredEvent>, DbError> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, session_id, event_id, kind, payload_json, ts, received_at
                 FROM telemetry_events
                 WHERE session_id = ?1
                 ORDER BY id",
            )?;
            let events = stmt
                .query_map([&session_id], stored_event_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }
}
