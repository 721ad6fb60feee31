use crate::db::filter::RecordFilter;
use crate::query::{comparison, round2};
use duckdb::Connection;

/// Summary stats for a filtered records view.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordsSummary {
    pub total_emissions: f64,
    pub average_per_day: f64,
    pub change_from_last_period: f64,
}

/// Total and per-record average for the filtered window, plus the percent
/// change versus the equal-length window immediately before it. The
/// comparison is scoped by organization and date only; the optional
/// location/category filters intentionally do not narrow it.
pub fn summary(conn: &Connection, filter: &RecordFilter) -> Result<RecordsSummary, duckdb::Error> {
    let (clause, params) = filter.where_clause("de");
    let (total_emissions, average_per_day): (f64, f64) = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(de.co2_emitted), 0), COALESCE(AVG(de.co2_emitted), 0)
             FROM DailyEmissions de
             WHERE {clause}"
        ),
        duckdb::params_from_iter(params),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let cmp = comparison::compare_period(conn, filter.org_id, filter.start, filter.end)?;

    Ok(RecordsSummary {
        total_emissions: round2(total_emissions),
        average_per_day: round2(average_per_day),
        change_from_last_period: cmp.percent_change,
    })
}

/// One (date, category) point for the multi-line records chart.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    pub category: String,
    pub category_id: Option<i64>,
    pub value: f64,
}

/// Emissions grouped by date and category within the filtered window.
pub fn emissions_over_time(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<SeriesPoint>, duckdb::Error> {
    let (clause, params) = filter.where_clause("de");
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(de.record_date AS VARCHAR),
                COALESCE(ec.name, 'Unknown'),
                ec.category_id,
                COALESCE(SUM(de.co2_emitted), 0)
         FROM DailyEmissions de
         LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
         WHERE {clause}
         GROUP BY de.record_date, ec.category_id, ec.name
         ORDER BY de.record_date ASC, ec.name ASC"
    ))?;
    let rows = stmt
        .query_map(duckdb::params_from_iter(params), |row| {
            Ok(SeriesPoint {
                date: row.get(0)?,
                category: row.get(1)?,
                category_id: row.get(2)?,
                value: round2(row.get(3)?),
            })
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}

/// One category's total within the filtered window.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub category_id: Option<i64>,
    pub value: f64,
}

/// Per-category totals within the filtered window, descending.
pub fn category_totals(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<CategoryTotal>, duckdb::Error> {
    let (clause, params) = filter.where_clause("de");
    let mut stmt = conn.prepare(&format!(
        "SELECT COALESCE(ec.name, 'Unknown'), ec.category_id, COALESCE(SUM(de.co2_emitted), 0)
         FROM DailyEmissions de
         LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
         WHERE {clause}
         GROUP BY ec.category_id, ec.name
         ORDER BY 3 DESC"
    ))?;
    let rows = stmt
        .query_map(duckdb::params_from_iter(params), |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                category_id: row.get(1)?,
                value: round2(row.get(2)?),
            })
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}

/// One row of the "recent emissions" table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmissionRecord {
    pub id: i64,
    pub date: String,
    pub category: String,
    pub source: String,
    pub value: f64,
    pub unit: String,
}

/// The most recent emission records for an organization, newest first.
/// Deliberately unaffected by the view filters so the table always shows
/// the latest activity.
pub fn recent_records(
    conn: &Connection,
    org_id: i64,
    limit: usize,
) -> Result<Vec<EmissionRecord>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT de.emission_id,
                CAST(de.record_date AS VARCHAR),
                COALESCE(ec.name, 'Unknown'),
                COALESCE(l.name, 'Unknown'),
                de.co2_emitted
         FROM DailyEmissions de
         LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
         LEFT JOIN Locations l ON de.location_id = l.location_id
         WHERE de.org_id = ?
         ORDER BY de.record_date DESC, de.emission_id DESC
         LIMIT ?",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(duckdb::params![org_id, limit], |row| {
            Ok(EmissionRecord {
                id: row.get(0)?,
                date: row.get(1)?,
                category: row.get(2)?,
                source: row.get(3)?,
                value: round2(row.get(4)?),
                unit: "kg CO2".to_string(),
            })
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}

/// A location reference for the filter dropdown.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocationRef {
    pub location_id: i64,
    pub name: String,
}

pub fn org_locations(conn: &Connection, org_id: i64) -> Result<Vec<LocationRef>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT location_id, name FROM Locations WHERE org_id = ? ORDER BY name ASC",
    )?;
    let rows = stmt
        .query_map(duckdb::params![org_id], |row| {
            Ok(LocationRef {
                location_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}

/// A category reference for the filter multi-select.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CategoryRef {
    pub category_id: i64,
    pub name: String,
}

pub fn all_categories(conn: &Connection) -> Result<Vec<CategoryRef>, duckdb::Error> {
    let mut stmt =
        conn.prepare("SELECT category_id, name FROM EmissionCategories ORDER BY name ASC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CategoryRef {
                category_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}
