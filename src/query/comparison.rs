use crate::query::round2;
use chrono::{Datelike, Days, Months, NaiveDate};
use duckdb::Connection;

/// Current window total vs. the equal-length window immediately before it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PeriodComparison {
    pub current_total: f64,
    pub previous_total: f64,
    pub percent_change: f64,
}

/// Compare `[start, end]` (inclusive) against the immediately preceding
/// window of the same length in days.
///
/// `percent_change` is `(current - previous) / previous * 100` rounded to
/// 2 decimals, and defined as 0 when the previous total is 0 so callers
/// never see NaN or infinity.
pub fn compare_period(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PeriodComparison, duckdb::Error> {
    let current_total = range_total(conn, org_id, start, end)?;

    let window_days = u64::try_from((end - start).num_days() + 1).unwrap_or(1);
    let prev_end = start - Days::new(1);
    let prev_start = start - Days::new(window_days);
    let previous_total = range_total(conn, org_id, prev_start, prev_end)?;

    Ok(PeriodComparison {
        current_total: round2(current_total),
        previous_total: round2(previous_total),
        percent_change: percent_change(current_total, previous_total),
    })
}

/// Month-to-date totals used by the dashboard stats card.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthToDate {
    pub co2_emitted: f64,
    pub energy_consumed: f64,
    pub previous_co2: f64,
    /// Positive when emissions went *down* versus the prior month.
    pub reduction_percent: f64,
}

/// Totals for the current calendar month through `reference`, compared to
/// the prior calendar month over the same day-of-month range (days 1 through
/// `reference.day()`).
pub fn month_to_date(
    conn: &Connection,
    org_id: i64,
    reference: NaiveDate,
) -> Result<MonthToDate, duckdb::Error> {
    let month_start = reference.with_day(1).unwrap_or(reference);
    let (co2_emitted, energy_consumed) = range_totals_with_energy(conn, org_id, month_start, reference)?;

    let prior = reference - Months::new(1);
    let previous_co2: f64 = conn.query_row(
        "SELECT COALESCE(SUM(co2_emitted), 0)
         FROM DailyEmissions
         WHERE org_id = ?
           AND EXTRACT(YEAR FROM record_date) = ?
           AND EXTRACT(MONTH FROM record_date) = ?
           AND EXTRACT(DAY FROM record_date) <= ?",
        duckdb::params![
            org_id,
            i64::from(prior.year()),
            i64::from(prior.month()),
            i64::from(reference.day())
        ],
        |row| row.get(0),
    )?;

    let reduction_percent = if previous_co2 > 0.0 {
        round2((previous_co2 - co2_emitted) / previous_co2 * 100.0)
    } else {
        0.0
    };

    Ok(MonthToDate {
        co2_emitted: round2(co2_emitted),
        energy_consumed: round2(energy_consumed),
        previous_co2: round2(previous_co2),
        reduction_percent,
    })
}

/// Percent change of `current` vs `previous`, 0 when `previous` is 0.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round2((current - previous) / previous * 100.0)
    } else {
        0.0
    }
}

/// Summed emissions for an organization over an inclusive date range.
pub(crate) fn range_total(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<f64, duckdb::Error> {
    conn.query_row(
        "SELECT COALESCE(SUM(co2_emitted), 0)
         FROM DailyEmissions
         WHERE org_id = ? AND record_date >= CAST(? AS DATE) AND record_date <= CAST(? AS DATE)",
        duckdb::params![org_id, start.to_string(), end.to_string()],
        |row| row.get(0),
    )
}

pub(crate) fn range_totals_with_energy(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(f64, f64), duckdb::Error> {
    conn.query_row(
        "SELECT COALESCE(SUM(co2_emitted), 0), COALESCE(SUM(energy_consumed), 0)
         FROM DailyEmissions
         WHERE org_id = ? AND record_date >= CAST(? AS DATE) AND record_date <= CAST(? AS DATE)",
        duckdb::params![org_id, start.to_string(), end.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn insert_emission(conn: &Connection, org_id: i64, date: &str, co2: f64, energy: f64) {
        conn.execute(
            "INSERT INTO DailyEmissions (org_id, record_date, co2_emitted, energy_consumed)
             VALUES (?, CAST(? AS DATE), ?, ?)",
            duckdb::params![org_id, date, co2, energy],
        )
        .unwrap();
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_percent_change_increase() {
        assert!((percent_change(150.0, 100.0) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percent_change_zero_previous() {
        assert!(percent_change(150.0, 0.0).abs() < f64::EPSILON);
        assert!(percent_change(0.0, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_period_windows() {
        let conn = setup_test_db();
        // Current window: Oct 11..Oct 20. Previous: Oct 1..Oct 10.
        insert_emission(&conn, 1, "2025-10-15", 150.0, 0.0);
        insert_emission(&conn, 1, "2025-10-05", 100.0, 0.0);
        insert_emission(&conn, 1, "2025-09-30", 999.0, 0.0); // outside both

        let cmp = compare_period(&conn, 1, date("2025-10-11"), date("2025-10-20")).unwrap();
        assert!((cmp.current_total - 150.0).abs() < f64::EPSILON);
        assert!((cmp.previous_total - 100.0).abs() < f64::EPSILON);
        assert!((cmp.percent_change - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_period_empty_previous() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-15", 80.0, 0.0);

        let cmp = compare_period(&conn, 1, date("2025-10-11"), date("2025-10-20")).unwrap();
        assert!((cmp.current_total - 80.0).abs() < f64::EPSILON);
        assert!(cmp.previous_total.abs() < f64::EPSILON);
        assert!(cmp.percent_change.abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_period_org_scoped() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-15", 10.0, 0.0);
        insert_emission(&conn, 2, "2025-10-15", 500.0, 0.0);

        let cmp = compare_period(&conn, 1, date("2025-10-11"), date("2025-10-20")).unwrap();
        assert!((cmp.current_total - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_month_to_date_reduction() {
        let conn = setup_test_db();
        // September 1..29 (same day count as reference day 29): 200 total.
        insert_emission(&conn, 1, "2025-09-10", 200.0, 0.0);
        // September 30 falls outside the day<=29 comparison window.
        insert_emission(&conn, 1, "2025-09-30", 50.0, 0.0);
        // October month-to-date: 100.
        insert_emission(&conn, 1, "2025-10-12", 100.0, 400.0);

        let mtd = month_to_date(&conn, 1, date("2025-10-29")).unwrap();
        assert!((mtd.co2_emitted - 100.0).abs() < f64::EPSILON);
        assert!((mtd.energy_consumed - 400.0).abs() < f64::EPSILON);
        assert!((mtd.previous_co2 - 200.0).abs() < f64::EPSILON);
        assert!((mtd.reduction_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_month_to_date_no_history() {
        let conn = setup_test_db();
        let mtd = month_to_date(&conn, 1, date("2025-10-29")).unwrap();
        assert!(mtd.co2_emitted.abs() < f64::EPSILON);
        assert!(mtd.reduction_percent.abs() < f64::EPSILON);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// percent_change is always finite and 0 whenever previous is 0.
        #[test]
        fn prop_percent_change_never_nan(
            current in 0.0f64..1.0e9,
            previous in 0.0f64..1.0e9,
        ) {
            let change = percent_change(current, previous);
            prop_assert!(change.is_finite());
            if previous == 0.0 {
                prop_assert_eq!(change, 0.0);
            }
        }
    }
}
