//! Column codecs for the enums the telemetry store keeps as text.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::models::{AlertReason, SessionContext, SessionStatus};

use super::DbError;

fn unknown(column: &str, value: &str) -> FromSqlError {
    FromSqlError::Other(format!("unknown {column} {value:?}").into())
}

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "Running" => Ok(SessionStatus::Running),
            "Completed" => Ok(SessionStatus::Completed),
            "Interrupted" => Ok(SessionStatus::Interrupted),
            other => Err(unknown("session status", other)),
        }
    }
}

impl ToSql for SessionContext {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SessionContext {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "lesson" => Ok(SessionContext::Lesson),
            "quiz" => Ok(SessionContext::Quiz),
            other => Err(unknown("session context", other)),
        }
    }
}

impl ToSql for AlertReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for AlertReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        AlertReason::parse(raw).ok_or_else(|| unknown("alert reason", raw))
    }
}

/// Capture intervals and similar counters are `u64` in memory.
pub(crate) fn sql_int(field: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unknown_alert_reason_is_a_conversion_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 'bored'", [], |row| row.get::<_, AlertReason>(0))
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(..)));
    }

    #[test]
    fn capture_interval_beyond_i64_is_rejected() {
        assert_eq!(sql_int("capture_interval_ms", 3000).unwrap(), 3000);
        assert!(matches!(
            sql_int("capture_interval_ms", u64::MAX),
            Err(DbError::OutOfRange { field: "capture_interval_ms", .. })
        ));
    }
}
