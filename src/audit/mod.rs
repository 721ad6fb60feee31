use duckdb::types::Value;
use duckdb::Connection;

/// Write one audit entry. Best effort: a failure here is logged and
/// swallowed so it can never fail or roll back the operation it annotates.
pub fn record(conn: &Connection, user_id: Option<i64>, action: &str, details: &str) {
    let result = conn.execute(
        "INSERT INTO AuditLogs (user_id, action, details) VALUES (?, ?, ?)",
        duckdb::params![user_id, action, details],
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, action, "failed to write audit log entry");
    }
}

/// Filters for the admin audit-log listing.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Restrict to entries by users of this organization (system entries
    /// with no user always pass). `None` means no org restriction, which is
    /// the view an org-less admin gets.
    pub org_id: Option<i64>,
    /// Substring match on the action name.
    pub action: Option<String>,
    pub user_id: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

/// One audit entry joined with the acting user, newest first.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub log_id: i64,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

/// Count of entries per action name, descending.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionStat {
    pub action: String,
    pub count: i64,
}

/// A page of audit entries with the unpaginated total and action stats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogPage {
    pub total_count: i64,
    pub logs: Vec<LogEntry>,
    pub action_stats: Vec<ActionStat>,
}

pub fn query_logs(conn: &Connection, filter: &LogFilter) -> Result<LogPage, duckdb::Error> {
    let (clause, params) = where_clause(filter);

    let total_count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM AuditLogs al WHERE {clause}"),
        duckdb::params_from_iter(params.clone()),
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT al.log_id, al.user_id, u.name, u.email, al.action, al.details,
                CAST(al.timestamp AS VARCHAR)
         FROM AuditLogs al
         LEFT JOIN Users u ON al.user_id = u.user_id
         WHERE {clause}
         ORDER BY al.timestamp DESC, al.log_id DESC
         LIMIT ? OFFSET ?",
    ))?;
    let mut page_params = params.clone();
    page_params.push(Value::BigInt(i64::try_from(filter.limit).unwrap_or(100)));
    page_params.push(Value::BigInt(i64::try_from(filter.offset).unwrap_or(0)));
    let logs = stmt
        .query_map(duckdb::params_from_iter(page_params), |row| {
            Ok(LogEntry {
                log_id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                user_email: row.get(3)?,
                action: row.get(4)?,
                details: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?
        .filter_map(Result::ok)
        .collect();

    let mut stats_stmt = conn.prepare(&format!(
        "SELECT al.action, COUNT(*) FROM AuditLogs al WHERE {clause}
         GROUP BY al.action ORDER BY 2 DESC",
    ))?;
    let action_stats = stats_stmt
        .query_map(duckdb::params_from_iter(params), |row| {
            Ok(ActionStat {
                action: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .filter_map(Result::ok)
        .collect();

    Ok(LogPage {
        total_count,
        logs,
        action_stats,
    })
}

fn where_clause(filter: &LogFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(org_id) = filter.org_id {
        conditions.push(
            "(al.user_id IN (SELECT user_id FROM Users WHERE org_id = ?) OR al.user_id IS NULL)"
                .to_string(),
        );
        params.push(Value::BigInt(org_id));
    }
    if let Some(action) = &filter.action {
        conditions.push("al.action LIKE ?".to_string());
        params.push(Value::Text(format!("%{action}%")));
    }
    if let Some(user_id) = filter.user_id {
        conditions.push("al.user_id = ?".to_string());
        params.push(Value::BigInt(user_id));
    }

    if conditions.is_empty() {
        ("1=1".to_string(), params)
    } else {
        (conditions.join(" AND "), params)
    }
}
