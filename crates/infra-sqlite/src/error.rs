// sqlx error mapping

use leadflow_core::error::AppError;

/// Convert a sqlx error into `AppError::Database`, prefixed with the
/// operation that failed. SQLite result codes are kept in the message.
pub(crate) fn map_sqlx_error(op: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |err| AppError::Database(format!("Failed to {}: {}", op, describe(&err)))
}

fn describe(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "2067" | "1555" => format!("unique constraint violation: {}", db_err.message()),
                "275" => format!("check constraint violation: {}", db_err.message()),
                "5" | "517" => format!("database locked (SQLITE_BUSY): {}", db_err.message()),
                "13" => format!("database full: {}", db_err.message()),
                other => format!("database error [{}]: {}", other, db_err.message()),
            },
            None => format!("database error: {}", db_err.message()),
        },
        sqlx::Error::RowNotFound => "row not found".to_string(),
        sqlx::Error::ColumnNotFound(col) => format!("column not found: {}", col),
        sqlx::Error::PoolTimedOut => "timed out waiting for a connection".to_string(),
        other => other.to_string(),
    }
}
