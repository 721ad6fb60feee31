use crate::query::round2;
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use duckdb::Connection;

/// Reporting period for breakdown queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    ThisWeek,
    ThisMonth,
}

impl Period {
    /// Parse the `filter` request parameter, silently falling back to the
    /// calendar month on unrecognized values.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "daily" => Self::Today,
            "weekly" => Self::ThisWeek,
            _ => Self::ThisMonth,
        }
    }

    /// Inclusive date range for this period anchored at `reference`.
    /// ThisWeek is the ISO week (Monday..Sunday) containing `reference`.
    pub fn date_range(self, reference: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Today => (reference, reference),
            Self::ThisWeek => {
                let week = reference.week(Weekday::Mon);
                (week.first_day(), week.last_day())
            }
            Self::ThisMonth => {
                let first = reference.with_day(1).unwrap_or(reference);
                let last = first + Months::new(1) - Days::new(1);
                (first, last)
            }
        }
    }
}

/// One category's share of an organization's emissions in a period.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CategoryShare {
    pub scope: String,
    pub emissions: f64,
    pub percentage: f64,
}

/// Per-category emission totals with percentage of the period total,
/// sorted descending by total.
///
/// Only categories with at least one matching record appear; there is no
/// zero-fill here, unlike the time series. Percentages are 0 when the
/// period total is 0.
pub fn category_breakdown(
    conn: &Connection,
    org_id: i64,
    period: Period,
    reference: NaiveDate,
) -> Result<Vec<CategoryShare>, duckdb::Error> {
    let (start, end) = period.date_range(reference);
    let totals = category_sums(conn, org_id, start, end)?;
    let period_total: f64 = totals.iter().map(|(_, v)| v).sum();

    Ok(totals
        .into_iter()
        .map(|(scope, emissions)| {
            let percentage = if period_total > 0.0 {
                round2(emissions / period_total * 100.0)
            } else {
                0.0
            };
            CategoryShare {
                scope,
                emissions: round2(emissions),
                percentage,
            }
        })
        .collect())
}

/// A high-emission category with the number of locations contributing to it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TopCategory {
    pub category_name: String,
    pub total_emissions: f64,
    pub location_count: i64,
}

/// The `limit` highest-emitting categories in the period, with distinct
/// contributing-location counts. Feeds the recommendations view.
pub fn top_categories(
    conn: &Connection,
    org_id: i64,
    period: Period,
    reference: NaiveDate,
    limit: usize,
) -> Result<Vec<TopCategory>, duckdb::Error> {
    let (start, end) = period.date_range(reference);
    let mut stmt = conn.prepare(
        "SELECT COALESCE(ec.name, 'Unknown'),
                COALESCE(SUM(de.co2_emitted), 0),
                COUNT(DISTINCT de.location_id)
         FROM DailyEmissions de
         LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
         WHERE de.org_id = ? AND de.record_date >= CAST(? AS DATE) AND de.record_date <= CAST(? AS DATE)
         GROUP BY ec.category_id, ec.name
         ORDER BY 2 DESC
         LIMIT ?",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(
            duckdb::params![org_id, start.to_string(), end.to_string(), limit],
            |row| {
                Ok(TopCategory {
                    category_name: row.get(0)?,
                    total_emissions: round2(row.get(1)?),
                    location_count: row.get(2)?,
                })
            },
        )?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}

/// Names of the highest-emitting categories over an arbitrary range.
pub fn top_category_names(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
    limit: usize,
) -> Result<Vec<String>, duckdb::Error> {
    let sums = category_sums(conn, org_id, start, end)?;
    Ok(sums.into_iter().take(limit).map(|(name, _)| name).collect())
}

/// Per-category emission sums over an inclusive range, descending by total.
fn category_sums(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(String, f64)>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(ec.name, 'Unknown'), COALESCE(SUM(de.co2_emitted), 0)
         FROM DailyEmissions de
         LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
         WHERE de.org_id = ? AND de.record_date >= CAST(? AS DATE) AND de.record_date <= CAST(? AS DATE)
         GROUP BY ec.name
         ORDER BY 2 DESC",
    )?;
    let rows = stmt
        .query_map(
            duckdb::params![org_id, start.to_string(), end.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?
        .filter_map(Result::ok)
        .collect();
    Ok(rows)
}
