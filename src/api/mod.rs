pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod errors;
pub mod insights;

use crate::db::AppState;
use chrono::NaiveDate;
use duckdb::Connection;
use errors::ApiError;
use std::sync::Arc;

/// Run a query closure against the shared connection on the blocking pool.
/// The mutex guard lives only inside the closure scope, so the connection is
/// released on every exit path.
pub(crate) async fn blocking<T, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state.conn().lock();
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Query task panicked: {e}")))?
}

/// A user's identity as needed for authorization checks.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UserContext {
    pub org_id: Option<i64>,
    pub role: String,
}

/// Load a user's org and role, or 404 when the id does not exist.
pub(crate) fn resolve_user(conn: &Connection, user_id: i64) -> Result<UserContext, ApiError> {
    let row = conn.query_row(
        "SELECT org_id, role FROM Users WHERE user_id = ?",
        duckdb::params![user_id],
        |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, String>(1)?)),
    );
    match row {
        Ok((org_id, role)) => Ok(UserContext { org_id, role }),
        Err(duckdb::Error::QueryReturnedNoRows) => {
            Err(ApiError::NotFound("User not found".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Load a user's org for a scoped read endpoint. 404 when the user is
/// missing; `None` when the user has no organization.
pub(crate) fn resolve_user_org(conn: &Connection, user_id: i64) -> Result<Option<i64>, ApiError> {
    Ok(resolve_user(conn, user_id)?.org_id)
}

/// Authorization gate for admin endpoints. Returns the admin's own org,
/// which bounds what they may see and manage.
pub(crate) fn require_admin(conn: &Connection, user_id: i64) -> Result<Option<i64>, ApiError> {
    let user = resolve_user(conn, user_id)?;
    if user.role != "admin" {
        return Err(ApiError::Forbidden(
            "Access denied. Admin privileges required.".to_string(),
        ));
    }
    Ok(user.org_id)
}

/// Parse an optional `reference_date` request parameter, defaulting to
/// today (UTC). All reporting windows anchor on this date.
pub(crate) fn parse_reference_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw {
        None => Ok(chrono::Utc::now().date_naive()),
        Some(s) => s.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "Invalid reference_date: {s}. Expected YYYY-MM-DD."
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO Organizations (org_id, name) VALUES (1, 'Acme');
             INSERT INTO Users (user_id, name, email, password_hash, role, org_id, status) VALUES
               (1, 'Ada', 'ada@acme.test', 'x', 'admin', 1, 'approved'),
               (2, 'Ben', 'ben@acme.test', 'x', 'user', 1, 'approved'),
               (3, 'Cal', 'cal@nowhere.test', 'x', 'admin', NULL, 'approved');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_resolve_user() {
        let conn = setup_test_db();
        let user = resolve_user(&conn, 1).unwrap();
        assert_eq!(user.org_id, Some(1));
        assert_eq!(user.role, "admin");
    }

    #[test]
    fn test_resolve_user_missing_is_not_found() {
        let conn = setup_test_db();
        let err = resolve_user(&conn, 99).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_require_admin_accepts_admin() {
        let conn = setup_test_db();
        assert_eq!(require_admin(&conn, 1).unwrap(), Some(1));
        assert_eq!(require_admin(&conn, 3).unwrap(), None);
    }

    #[test]
    fn test_require_admin_rejects_user() {
        let conn = setup_test_db();
        let err = require_admin(&conn, 2).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn test_parse_reference_date() {
        assert_eq!(
            parse_reference_date(Some("2025-10-29")).unwrap(),
            "2025-10-29".parse::<NaiveDate>().unwrap()
        );
        assert!(parse_reference_date(Some("not-a-date")).is_err());
        assert!(parse_reference_date(None).is_ok());
    }
}
