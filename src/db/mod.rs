//! Local telemetry store: one SQLite connection owned by a worker thread,
//! driven through async `execute` calls.

mod columns;
mod error;
mod migrations;
pub mod models;
pub mod repositories;

use std::{path::Path, thread, time::Duration};

use log::{debug, info};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

pub use error::DbError;
pub use models::StoredEvent;

pub(crate) use columns::sql_int;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Handle to the telemetry store. Clones share one worker; the worker drains
/// its queue and closes the connection once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Database {
    /// Open (creating if needed) the store at `path`, migrate it and start the
    /// worker. Foreign keys are required: events for unknown sessions must fail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DbError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(path).map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        configure(&conn)?;
        migrations::migrate(&mut conn)?;

        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name("attentio-db".into())
            .spawn(move || {
                while let Some(job) = queue.blocking_recv() {
                    job(&mut conn);
                }
                debug!("telemetry store worker exiting");
            })
            .map_err(DbError::Spawn)?;

        info!("telemetry store ready at {}", path.display());
        Ok(Self { jobs })
    }

    /// Run `task` on the worker's connection and await its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(Box::new(move |conn| {
                // The caller may have given up; nothing to report then.
                let _ = reply.send(task(conn));
            }))
            .map_err(|_| DbError::WorkerGone)?;
        result.await.map_err(|_| DbError::WorkerGone)?
    }
}

fn configure(conn: &Connection) -> Result<(), DbError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_missing_directories_and_enforces_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nested/store/attentio.sqlite3")).unwrap();

        let enforced: bool = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?))
            .await
            .unwrap();
        assert!(enforced);
    }

    #[tokio::test]
    async fn failed_job_leaves_the_worker_running() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("attentio.sqlite3")).unwrap();

        let err = db
            .execute(|conn| Ok(conn.execute("INSERT INTO nowhere VALUES (1)", [])?))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));

        let answer: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT 42", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(answer, 42);
    }
}
