use crate::api::errors::ApiError;
use crate::api::{blocking, require_admin, resolve_user};
use crate::audit;
use crate::db::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters carried by every admin endpoint.
#[derive(Debug, Deserialize)]
pub struct AdminParams {
    pub admin_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManagedUser {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
    pub org_name: Option<String>,
    pub org_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<ManagedUser>,
}

/// GET /api/admin/users — Users of the admin's own organization, newest
/// first. An org-less admin sees only other org-less users.
pub async fn get_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminParams>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = blocking(state, move |conn| {
        let admin_org = require_admin(conn, params.admin_id)?;
        let users = list_org_users(conn, admin_org)?;
        audit::record(
            conn,
            Some(params.admin_id),
            "VIEW_USERS",
            "Admin viewed user list for organization",
        );
        Ok(users)
    })
    .await?;
    Ok(Json(UsersResponse {
        success: true,
        users,
    }))
}

fn list_org_users(
    conn: &Connection,
    org_id: Option<i64>,
) -> Result<Vec<ManagedUser>, duckdb::Error> {
    // An org-less admin manages only the pool of org-less users.
    let scope = if org_id.is_some() {
        "u.org_id = ?"
    } else {
        "u.org_id IS NULL"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT u.user_id, u.name, u.email, u.role, u.status,
                CAST(u.created_at AS VARCHAR), o.name, u.org_id
         FROM Users u
         LEFT JOIN Organizations o ON u.org_id = o.org_id
         WHERE {scope}
         ORDER BY u.created_at DESC, u.user_id DESC"
    ))?;

    let map_row = |row: &duckdb::Row<'_>| {
        Ok(ManagedUser {
            user_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            org_name: row.get(6)?,
            org_id: row.get(7)?,
        })
    };

    let users = if let Some(org_id) = org_id {
        stmt.query_map(duckdb::params![org_id], map_row)?
            .filter_map(Result::ok)
            .collect()
    } else {
        stmt.query_map([], map_row)?.filter_map(Result::ok).collect()
    };
    Ok(users)
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub user_id: i64,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// PUT /api/admin/users/status — Approve, reject, or re-pend an account.
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminParams>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<ActionResponse>, ApiError> {
    let response = blocking(state, move |conn| {
        if !matches!(body.status.as_str(), "approved" | "rejected" | "pending") {
            return Err(ApiError::BadRequest(format!(
                "Invalid status: {}. Use 'approved', 'rejected', or 'pending'.",
                body.status
            )));
        }
        let admin_org = require_admin(conn, params.admin_id)?;
        check_same_org(conn, admin_org, body.user_id)?;

        conn.execute(
            "UPDATE Users SET status = ? WHERE user_id = ?",
            duckdb::params![body.status, body.user_id],
        )?;
        audit::record(
            conn,
            Some(params.admin_id),
            "UPDATE_USER_STATUS",
            &format!("Admin updated user {} status to {}", body.user_id, body.status),
        );
        Ok(ActionResponse {
            success: true,
            message: "User status updated successfully".to_string(),
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub user_id: i64,
    pub role: String,
}

/// PUT /api/admin/users/role — Promote or demote within the organization.
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminParams>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<ActionResponse>, ApiError> {
    let response = blocking(state, move |conn| {
        if !matches!(body.role.as_str(), "admin" | "user") {
            return Err(ApiError::BadRequest(format!(
                "Invalid role: {}. Use 'admin' or 'user'.",
                body.role
            )));
        }
        let admin_org = require_admin(conn, params.admin_id)?;
        check_same_org(conn, admin_org, body.user_id)?;

        conn.execute(
            "UPDATE Users SET role = ? WHERE user_id = ?",
            duckdb::params![body.role, body.user_id],
        )?;
        audit::record(
            conn,
            Some(params.admin_id),
            "UPDATE_USER_ROLE",
            &format!("Admin updated user {} role to {}", body.user_id, body.role),
        );
        Ok(ActionResponse {
            success: true,
            message: "User role updated successfully".to_string(),
        })
    })
    .await?;
    Ok(Json(response))
}

/// DELETE /api/admin/users/{user_id} — Remove an account from the
/// organization. Self-deletion is refused.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<AdminParams>,
) -> Result<Json<ActionResponse>, ApiError> {
    let response = blocking(state, move |conn| {
        let admin_org = require_admin(conn, params.admin_id)?;
        if user_id == params.admin_id {
            return Err(ApiError::BadRequest(
                "Cannot delete your own account".to_string(),
            ));
        }
        check_same_org(conn, admin_org, user_id)?;

        conn.execute(
            "DELETE FROM Users WHERE user_id = ?",
            duckdb::params![user_id],
        )?;
        audit::record(
            conn,
            Some(params.admin_id),
            "DELETE_USER",
            &format!("Admin deleted user {user_id}"),
        );
        Ok(ActionResponse {
            success: true,
            message: "User deleted successfully".to_string(),
        })
    })
    .await?;
    Ok(Json(response))
}

/// Target must exist and share the admin's org, with both-NULL counting as
/// the same org.
fn check_same_org(
    conn: &Connection,
    admin_org: Option<i64>,
    target_user_id: i64,
) -> Result<(), ApiError> {
    let target = resolve_user(conn, target_user_id)?;
    if admin_org != target.org_id {
        return Err(ApiError::Forbidden(
            "Access denied. Can only manage users from your organization.".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    pub admin_id: i64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub action_filter: Option<String>,
    pub user_filter: Option<i64>,
}

const fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub success: bool,
    pub total_count: i64,
    pub logs: Vec<audit::LogEntry>,
    pub action_stats: Vec<audit::ActionStat>,
}

/// GET /api/admin/audit-logs — Paginated audit trail for the admin's org.
pub async fn get_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Result<Json<AuditLogsResponse>, ApiError> {
    let page = blocking(state, move |conn| {
        let admin_org = require_admin(conn, params.admin_id)?;
        let filter = audit::LogFilter {
            org_id: admin_org,
            action: params.action_filter.clone(),
            user_id: params.user_filter,
            limit: params.limit,
            offset: params.offset,
        };
        let page = audit::query_logs(conn, &filter)?;
        audit::record(
            conn,
            Some(params.admin_id),
            "VIEW_AUDIT_LOGS",
            &format!(
                "Admin viewed audit logs (limit: {}, offset: {})",
                params.limit, params.offset
            ),
        );
        Ok(page)
    })
    .await?;
    Ok(Json(AuditLogsResponse {
        success: true,
        total_count: page.total_count,
        logs: page.logs,
        action_stats: page.action_stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO Organizations (org_id, name) VALUES (1, 'Acme'), (2, 'Globex');
             INSERT INTO Users (user_id, name, email, password_hash, role, org_id, status) VALUES
               (1, 'Ada', 'ada@acme.test', 'x', 'admin', 1, 'approved'),
               (2, 'Ben', 'ben@acme.test', 'x', 'user', 1, 'pending'),
               (3, 'Eve', 'eve@globex.test', 'x', 'user', 2, 'approved'),
               (4, 'Nil', 'nil@nowhere.test', 'x', 'user', NULL, 'pending');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_org_users_scoped() {
        let conn = setup_test_db();
        let users = list_org_users(&conn, Some(1)).unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.org_id == Some(1)));
        assert_eq!(users[0].org_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_list_org_users_null_org() {
        let conn = setup_test_db();
        let users = list_org_users(&conn, None).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Nil");
    }

    #[test]
    fn test_check_same_org() {
        let conn = setup_test_db();
        assert!(check_same_org(&conn, Some(1), 2).is_ok());

        let err = check_same_org(&conn, Some(1), 3).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = check_same_org(&conn, Some(1), 99).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_check_same_org_both_null() {
        let conn = setup_test_db();
        assert!(check_same_org(&conn, None, 4).is_ok());
        let err = check_same_org(&conn, None, 2).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
