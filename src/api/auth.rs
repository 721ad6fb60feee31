use crate::api::blocking;
use crate::api::errors::ApiError;
use crate::audit;
use crate::db::AppState;
use axum::extract::State;
use axum::Json;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// SHA-256 hex digest of a password. Matches the stored `password_hash`
/// column format.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address or display name.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub org_id: Option<i64>,
    pub created_at: String,
    pub role: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
}

/// POST /api/login — Credential check against the stored hash.
///
/// A failed login is a successful HTTP exchange: the response is 200 with
/// `success: false` so the client can render the message, and the failure
/// is audited without a user id.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = blocking(state, move |conn| {
        let hashed = hash_password(&body.password);
        let row = conn.query_row(
            "SELECT user_id, name, email, org_id, CAST(created_at AS VARCHAR), role, status
             FROM Users
             WHERE (email = ? OR name = ?) AND password_hash = ?",
            duckdb::params![body.username, body.username, hashed],
            |row| {
                Ok(UserData {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    org_id: row.get(3)?,
                    created_at: row.get(4)?,
                    role: row.get(5)?,
                    status: row.get(6)?,
                })
            },
        );
        match row {
            Ok(user) => {
                audit::record(
                    conn,
                    Some(user.user_id),
                    "LOGIN",
                    &format!("User {} logged in successfully", user.name),
                );
                Ok(LoginResponse {
                    success: true,
                    message: "Login successful".to_string(),
                    user_data: Some(user),
                })
            }
            Err(duckdb::Error::QueryReturnedNoRows) => {
                audit::record(
                    conn,
                    None,
                    "LOGIN_FAILED",
                    &format!("Failed login attempt for username: {}", body.username),
                );
                Ok(LoginResponse {
                    success: false,
                    message: "Invalid username or password".to_string(),
                    user_data: None,
                })
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: i64,
    pub name: String,
    pub industry: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationsResponse {
    pub success: bool,
    pub organizations: Vec<Organization>,
}

/// GET /api/organizations — All organizations for the registration dropdown.
pub async fn get_organizations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrganizationsResponse>, ApiError> {
    let organizations = blocking(state, |conn| {
        let mut stmt =
            conn.prepare("SELECT org_id, name, industry FROM Organizations ORDER BY name ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Organization {
                    org_id: row.get(0)?,
                    name: row.get(1)?,
                    industry: row.get(2)?,
                })
            })?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    })
    .await?;
    Ok(Json(OrganizationsResponse {
        success: true,
        organizations,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub org_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// POST /api/register — Create a pending account tied to an organization.
///
/// New accounts always start as role `user` and status `pending`; an admin
/// promotes or approves later. Validation failures come back as 200 with
/// `success: false`, matching the login contract.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let response = blocking(state, move |conn| register_user(conn, &body)).await?;
    Ok(Json(response))
}

fn register_user(conn: &Connection, body: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
    let Some(org_id) = body.org_id else {
        return Ok(rejection("Organization selection is required"));
    };

    let org_name = conn.query_row(
        "SELECT name FROM Organizations WHERE org_id = ?",
        duckdb::params![org_id],
        |row| row.get::<_, String>(0),
    );
    let org_name = match org_name {
        Ok(name) => name,
        Err(duckdb::Error::QueryReturnedNoRows) => {
            return Ok(rejection("Selected organization does not exist"));
        }
        Err(e) => return Err(e.into()),
    };

    let email_taken = conn.query_row(
        "SELECT email FROM Users WHERE email = ?",
        duckdb::params![body.email],
        |_| Ok(()),
    );
    match email_taken {
        Ok(()) => return Ok(rejection("Email already registered")),
        Err(duckdb::Error::QueryReturnedNoRows) => {}
        Err(e) => return Err(e.into()),
    }

    let user_id: i64 = conn.query_row(
        "INSERT INTO Users (name, email, password_hash, role, org_id, status)
         VALUES (?, ?, ?, 'user', ?, 'pending')
         RETURNING user_id",
        duckdb::params![body.name, body.email, hash_password(&body.password), org_id],
        |row| row.get(0),
    )?;

    audit::record(
        conn,
        Some(user_id),
        "REGISTER",
        &format!(
            "New user registered: {} ({}) for organization: {org_name}",
            body.name, body.email
        ),
    );

    Ok(RegisterResponse {
        success: true,
        message: "Registration successful! Your account is pending admin approval.".to_string(),
        user_id: Some(user_id),
        status: Some("pending".to_string()),
    })
}

fn rejection(message: &str) -> RegisterResponse {
    RegisterResponse {
        success: false,
        message: message.to_string(),
        user_id: None,
        status: None,
    }
}
