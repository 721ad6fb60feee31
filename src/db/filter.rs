use chrono::NaiveDate;
use duckdb::types::Value;

/// Typed filter over `DailyEmissions` rows.
///
/// Replaces ad-hoc WHERE-clause string building: every value is bound as a
/// parameter, and optional filters combine with AND. An empty id list means
/// "no restriction on that dimension".
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub org_id: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub location_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

impl RecordFilter {
    /// Filter scoped to an organization and an inclusive date range.
    pub const fn new(org_id: i64, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            org_id,
            start,
            end,
            location_ids: Vec::new(),
            category_ids: Vec::new(),
        }
    }

    pub fn with_locations(mut self, ids: Vec<i64>) -> Self {
        self.location_ids = ids;
        self
    }

    pub fn with_categories(mut self, ids: Vec<i64>) -> Self {
        self.category_ids = ids;
        self
    }

    /// Render the WHERE clause (without the leading `WHERE`) for rows under
    /// table alias `alias`, together with the bound parameter values in
    /// matching order.
    pub fn where_clause(&self, alias: &str) -> (String, Vec<Value>) {
        let mut conditions = vec![
            format!("{alias}.org_id = ?"),
            format!("{alias}.record_date >= CAST(? AS DATE)"),
            format!("{alias}.record_date <= CAST(? AS DATE)"),
        ];
        let mut params = vec![
            Value::BigInt(self.org_id),
            Value::Text(self.start.to_string()),
            Value::Text(self.end.to_string()),
        ];

        if !self.location_ids.is_empty() {
            conditions.push(format!(
                "{alias}.location_id IN ({})",
                placeholders(self.location_ids.len())
            ));
            params.extend(self.location_ids.iter().map(|id| Value::BigInt(*id)));
        }
        if !self.category_ids.is_empty() {
            conditions.push(format!(
                "{alias}.category_id IN ({})",
                placeholders(self.category_ids.len())
            ));
            params.extend(self.category_ids.iter().map(|id| Value::BigInt(*id)));
        }

        (conditions.join(" AND "), params)
    }
}

fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

/// Parse a comma-separated id list as sent by the records endpoint.
/// Blank segments are skipped; a malformed segment invalidates the whole list.
pub fn parse_id_list(raw: &str) -> Option<Vec<i64>> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        ids.push(part.parse().ok()?);
    }
    Some(ids)
}
