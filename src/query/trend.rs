use crate::query::{month_label, round2};
use chrono::{Datelike, Months, NaiveDate};
use duckdb::Connection;

/// Smoothing factor applied to actual monthly totals for the displayed
/// "predicted" overlay. A display heuristic, not a fitted model.
pub const ACTUAL_SMOOTHING: f64 = 0.98;

/// Per-future-month geometric decay for forward projection points.
pub const FORWARD_DECAY: f64 = 0.95;

/// How many actual months feed the trend and how many are projected forward.
pub const MONTHS_BACK: usize = 6;
pub const MONTHS_FORWARD: u32 = 3;

/// Which measure a trend tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Emissions,
    Energy,
}

impl Metric {
    /// Parse the `data_type` request parameter; anything other than
    /// "energy" selects emissions.
    pub fn parse(raw: &str) -> Self {
        if raw == "energy" {
            Self::Energy
        } else {
            Self::Emissions
        }
    }

    const fn column_name(self) -> &'static str {
        match self {
            Self::Emissions => "co2_emitted",
            Self::Energy => "energy_consumed",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emissions => "emissions",
            Self::Energy => "energy",
        }
    }
}

/// One point on the trend chart. Future months carry no actual value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendPoint {
    pub month: String,
    pub actual: Option<f64>,
    pub predicted: f64,
}

/// Monthly actuals for the trailing six months plus three projected months.
///
/// Projection arithmetic is fixed by product behavior: the predicted overlay
/// for an actual month is `actual * 0.98`, and the k-th future month is
/// `last_actual * 0.95^k`. With no history at all the result is empty (no
/// projection is fabricated from nothing).
pub fn trend_points(
    conn: &Connection,
    org_id: i64,
    metric: Metric,
    reference: NaiveDate,
) -> Result<Vec<TrendPoint>, duckdb::Error> {
    let start = reference - Months::new(6);
    let mut monthly = monthly_sums(conn, org_id, metric.column_name(), start, reference)?;

    // The range can straddle up to seven partial calendar months; keep the
    // six most recent.
    if monthly.len() > MONTHS_BACK {
        monthly.drain(..monthly.len() - MONTHS_BACK);
    }

    let mut points: Vec<TrendPoint> = monthly
        .iter()
        .map(|&(_, month, value)| TrendPoint {
            month: month_label(month).to_string(),
            actual: Some(round2(value)),
            predicted: round2(value * ACTUAL_SMOOTHING),
        })
        .collect();

    if let Some(&(_, _, last_value)) = monthly.last() {
        let last_actual = round2(last_value);
        for k in 1..=MONTHS_FORWARD {
            let future = reference + Months::new(k);
            points.push(TrendPoint {
                month: month_label(future.month()).to_string(),
                actual: None,
                predicted: round2(last_actual * FORWARD_DECAY.powi(k as i32)),
            });
        }
    }

    Ok(points)
}

/// Mean of the monthly CO2 and energy sums over the trailing six months.
/// Both averages are 0 when the organization has no history in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAverages {
    pub avg_emissions: f64,
    pub avg_energy: f64,
}

pub fn monthly_averages(
    conn: &Connection,
    org_id: i64,
    reference: NaiveDate,
) -> Result<MonthlyAverages, duckdb::Error> {
    let start = reference - Months::new(6);
    let mut stmt = conn.prepare(
        "SELECT SUM(co2_emitted), SUM(energy_consumed)
         FROM DailyEmissions
         WHERE org_id = ? AND record_date >= CAST(? AS DATE) AND record_date <= CAST(? AS DATE)
         GROUP BY EXTRACT(YEAR FROM record_date), EXTRACT(MONTH FROM record_date)",
    )?;
    let sums: Vec<(f64, f64)> = stmt
        .query_map(
            duckdb::params![org_id, start.to_string(), reference.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?
        .filter_map(Result::ok)
        .collect();

    if sums.is_empty() {
        return Ok(MonthlyAverages {
            avg_emissions: 0.0,
            avg_energy: 0.0,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let count = sums.len() as f64;
    Ok(MonthlyAverages {
        avg_emissions: sums.iter().map(|(co2, _)| co2).sum::<f64>() / count,
        avg_energy: sums.iter().map(|(_, energy)| energy).sum::<f64>() / count,
    })
}

/// Per-calendar-month sums of one measure, chronological order.
fn monthly_sums(
    conn: &Connection,
    org_id: i64,
    column: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(i32, u32, f64)>, duckdb::Error> {
    // Column name comes from the fixed Metric enum, never from user input.
    let sql = format!(
        "SELECT EXTRACT(YEAR FROM record_date), EXTRACT(MONTH FROM record_date), SUM({column})
         FROM DailyEmissions
         WHERE org_id = ? AND record_date >= CAST(? AS DATE) AND record_date <= CAST(? AS DATE)
         GROUP BY 1, 2
         ORDER BY 1, 2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            duckdb::params![org_id, start.to_string(), end.to_string()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?
        .filter_map(Result::ok)
        .map(|(year, month, value)| {
            (
                i32::try_from(year).unwrap_or(0),
                u32::try_from(month).unwrap_or(1),
                value,
            )
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn insert_emission(conn: &Connection, org: i64, date: &str, co2: f64, energy: f64) {
        conn.execute(
            "INSERT INTO DailyEmissions (org_id, record_date, co2_emitted, energy_consumed)
             VALUES (?, CAST(? AS DATE), ?, ?)",
            duckdb::params![org, date, co2, energy],
        )
        .unwrap();
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(Metric::parse("energy"), Metric::Energy);
        assert_eq!(Metric::parse("emissions"), Metric::Emissions);
        assert_eq!(Metric::parse("anything"), Metric::Emissions);
    }

    #[test]
    fn test_trend_empty_history_is_empty() {
        let conn = setup_test_db();
        let points =
            trend_points(&conn, 1, Metric::Emissions, date("2025-10-29")).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_trend_actuals_and_projection() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-08-15", 100.0, 0.0);
        insert_emission(&conn, 1, "2025-09-15", 200.0, 0.0);
        insert_emission(&conn, 1, "2025-10-15", 400.0, 0.0);

        let points =
            trend_points(&conn, 1, Metric::Emissions, date("2025-10-29")).unwrap();
        assert_eq!(points.len(), 6); // 3 actual + 3 projected

        assert_eq!(points[0].month, "Aug");
        assert_eq!(points[0].actual, Some(100.0));
        assert!((points[0].predicted - 98.0).abs() < f64::EPSILON);

        assert_eq!(points[2].month, "Oct");
        assert_eq!(points[2].actual, Some(400.0));

        // Future months: Nov, Dec, Jan with 0.95^k decay off the last actual.
        assert_eq!(points[3].month, "Nov");
        assert_eq!(points[3].actual, None);
        assert!((points[3].predicted - 380.0).abs() < f64::EPSILON);
        assert_eq!(points[4].month, "Dec");
        assert!((points[4].predicted - 361.0).abs() < f64::EPSILON);
        assert_eq!(points[5].month, "Jan");
        assert!((points[5].predicted - 342.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trend_projection_monotonically_decays() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-15", 500.0, 0.0);

        let points =
            trend_points(&conn, 1, Metric::Emissions, date("2025-10-29")).unwrap();
        let projected: Vec<f64> = points
            .iter()
            .filter(|p| p.actual.is_none())
            .map(|p| p.predicted)
            .collect();
        assert_eq!(projected.len(), 3);
        assert!(projected[0] > projected[1] && projected[1] > projected[2]);
    }

    #[test]
    fn test_trend_caps_at_six_actual_months() {
        let conn = setup_test_db();
        // Seven calendar months fall inside the window; only the six most
        // recent count.
        insert_emission(&conn, 1, "2025-04-30", 100.0, 0.0);
        for month in 5..=10 {
            insert_emission(&conn, 1, &format!("2025-{month:02}-15"), 100.0, 0.0);
        }

        let points =
            trend_points(&conn, 1, Metric::Emissions, date("2025-10-29")).unwrap();
        let actual_count = points.iter().filter(|p| p.actual.is_some()).count();
        assert_eq!(actual_count, 6);
        assert_eq!(points[0].month, "May");
    }

    #[test]
    fn test_trend_energy_metric() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-15", 5.0, 900.0);

        let points = trend_points(&conn, 1, Metric::Energy, date("2025-10-29")).unwrap();
        assert_eq!(points[0].actual, Some(900.0));
    }

    #[test]
    fn test_monthly_averages() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-09-10", 100.0, 300.0);
        insert_emission(&conn, 1, "2025-09-20", 100.0, 100.0);
        insert_emission(&conn, 1, "2025-10-10", 400.0, 200.0);

        let avgs = monthly_averages(&conn, 1, date("2025-10-29")).unwrap();
        assert!((avgs.avg_emissions - 300.0).abs() < f64::EPSILON);
        assert!((avgs.avg_energy - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_monthly_averages_no_history() {
        let conn = setup_test_db();
        let avgs = monthly_averages(&conn, 1, date("2025-10-29")).unwrap();
        assert!(avgs.avg_emissions.abs() < f64::EPSILON);
        assert!(avgs.avg_energy.abs() < f64::EPSILON);
    }
}
