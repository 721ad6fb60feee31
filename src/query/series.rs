use crate::query::{month_label, round2};
use chrono::{Datelike, Days, NaiveDate};
use duckdb::Connection;

/// One calendar-unit slot in a gap-filled emissions series.
///
/// The wire field is called `month` for every granularity because that is
/// what the dashboard chart binds to, even for day and week labels.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bucket {
    #[serde(rename = "month")]
    pub label: String,
    pub emissions: f64,
}

/// Time granularity for bucketing an emissions series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// Parse the `filter` request parameter. Unrecognized values silently
    /// fall back to `Monthly`; the frontend has always relied on this.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            _ => Self::Monthly,
        }
    }

    /// Number of buckets this granularity always produces.
    pub const fn bucket_count(self) -> usize {
        match self {
            Self::Daily => 30,
            Self::Weekly => 10,
            Self::Monthly => 12,
        }
    }
}

const DAYS_PER_WEEK: u64 = 7;
const WEEKLY_WINDOW_DAYS: u64 = 10 * DAYS_PER_WEEK;

/// Gap-filled emission totals for one organization, bucketed by calendar unit.
///
/// The bucket axis is enumerated from the calendar first, independent of the
/// data, then grouped totals are joined onto it, so the result always has
/// exactly 30 (daily), 10 (weekly), or 12 (monthly) entries ordered
/// oldest to newest.
///
/// - Daily: the 30 days ending at `reference` inclusive, labelled "03 Jan".
/// - Weekly: ten 7-day windows, the last ending at `reference`, labelled
///   with the ISO week number of each window's start.
/// - Monthly: all 12 months of `reference`'s year, labelled "Jan".."Dec".
pub fn emissions_series(
    conn: &Connection,
    org_id: i64,
    granularity: Granularity,
    reference: NaiveDate,
) -> Result<Vec<Bucket>, duckdb::Error> {
    let (start, end) = match granularity {
        Granularity::Daily => (reference - Days::new(29), reference),
        Granularity::Weekly => (reference - Days::new(WEEKLY_WINDOW_DAYS - 1), reference),
        Granularity::Monthly => year_bounds(reference),
    };

    let daily_sums = sums_by_date(conn, org_id, start, end)?;

    let mut buckets: Vec<Bucket> = match granularity {
        Granularity::Daily => (0..30)
            .map(|i| Bucket {
                label: (start + Days::new(i)).format("%d %b").to_string(),
                emissions: 0.0,
            })
            .collect(),
        Granularity::Weekly => (0..10)
            .map(|i| {
                let week_start = start + Days::new(i * DAYS_PER_WEEK);
                Bucket {
                    label: format!("W{}", week_start.iso_week().week()),
                    emissions: 0.0,
                }
            })
            .collect(),
        Granularity::Monthly => (1..=12)
            .map(|m| Bucket {
                label: month_label(m).to_string(),
                emissions: 0.0,
            })
            .collect(),
    };

    for (date, total) in daily_sums {
        let index = match granularity {
            Granularity::Daily => usize::try_from((date - start).num_days()).unwrap_or(0),
            Granularity::Weekly => {
                usize::try_from((date - start).num_days()).unwrap_or(0) / DAYS_PER_WEEK as usize
            }
            Granularity::Monthly => date.month() as usize - 1,
        };
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.emissions += total;
        }
    }

    for bucket in &mut buckets {
        bucket.emissions = round2(bucket.emissions);
    }
    Ok(buckets)
}

/// Per-date emission sums for one organization over an inclusive range.
fn sums_by_date(
    conn: &Connection,
    org_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(NaiveDate, f64)>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT CAST(record_date AS VARCHAR), SUM(co2_emitted)
         FROM DailyEmissions
         WHERE org_id = ? AND record_date >= CAST(? AS DATE) AND record_date <= CAST(? AS DATE)
         GROUP BY record_date
         ORDER BY record_date",
    )?;
    let rows = stmt
        .query_map(
            duckdb::params![org_id, start.to_string(), end.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?
        .filter_map(Result::ok)
        .filter_map(|(date, total)| date.parse().ok().map(|d: NaiveDate| (d, total)))
        .collect();
    Ok(rows)
}

/// First and last day of the year containing `reference`.
fn year_bounds(reference: NaiveDate) -> (NaiveDate, NaiveDate) {
    let year = reference.year();
    (
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(reference),
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(reference),
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

    fn insert_emission(conn: &Connection, org_id: i64, date: &str, co2: f64) {
        conn.execute(
            "INSERT INTO DailyEmissions (org_id, location_id, category_id, record_date, co2_emitted)
             VALUES (?, 1, 1, CAST(? AS DATE), ?)",
            duckdb::params![org_id, date, co2],
        )
        .unwrap();
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_granularity_fallback() {
        assert_eq!(Granularity::parse("daily"), Granularity::Daily);
        assert_eq!(Granularity::parse("weekly"), Granularity::Weekly);
        assert_eq!(Granularity::parse("monthly"), Granularity::Monthly);
        assert_eq!(Granularity::parse("yearly"), Granularity::Monthly);
        assert_eq!(Granularity::parse(""), Granularity::Monthly);
    }

    #[test]
    fn test_series_lengths_with_no_data() {
        let conn = setup_test_db();
        let reference = date("2025-10-30");
        for granularity in [
            Granularity::Daily,
            Granularity::Weekly,
            Granularity::Monthly,
        ] {
            let buckets = emissions_series(&conn, 1, granularity, reference).unwrap();
            assert_eq!(buckets.len(), granularity.bucket_count());
            assert!(buckets.iter().all(|b| b.emissions.abs() < f64::EPSILON));
        }
    }

    #[test]
    fn test_daily_series_gap_filling() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-01", 100.0);
        insert_emission(&conn, 1, "2025-10-15", 50.0);

        let buckets =
            emissions_series(&conn, 1, Granularity::Daily, date("2025-10-30")).unwrap();
        assert_eq!(buckets.len(), 30);

        let nonzero: Vec<&Bucket> = buckets
            .iter()
            .filter(|b| b.emissions.abs() > f64::EPSILON)
            .collect();
        assert_eq!(nonzero.len(), 2);
        assert_eq!(nonzero[0].label, "01 Oct");
        assert!((nonzero[0].emissions - 100.0).abs() < f64::EPSILON);
        assert_eq!(nonzero[1].label, "15 Oct");
        assert!((nonzero[1].emissions - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_series_sums_same_day_rows() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-20", 10.0);
        insert_emission(&conn, 1, "2025-10-20", 15.0);

        let buckets =
            emissions_series(&conn, 1, Granularity::Daily, date("2025-10-30")).unwrap();
        let day = buckets.iter().find(|b| b.label == "20 Oct").unwrap();
        assert!((day.emissions - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_series_scoped_to_org() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-10-20", 10.0);
        insert_emission(&conn, 2, "2025-10-20", 999.0);

        let buckets =
            emissions_series(&conn, 1, Granularity::Daily, date("2025-10-30")).unwrap();
        let total: f64 = buckets.iter().map(|b| b.emissions).sum();
        assert!((total - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weekly_series_buckets_and_labels() {
        let conn = setup_test_db();
        // Reference is a Thursday; windows run Friday..Thursday.
        let reference = date("2025-10-30");
        insert_emission(&conn, 1, "2025-10-30", 5.0); // last window
        insert_emission(&conn, 1, "2025-10-24", 7.0); // same (last) window
        insert_emission(&conn, 1, "2025-10-23", 3.0); // previous window

        let buckets = emissions_series(&conn, 1, Granularity::Weekly, reference).unwrap();
        assert_eq!(buckets.len(), 10);
        assert!((buckets[9].emissions - 12.0).abs() < f64::EPSILON);
        assert!((buckets[8].emissions - 3.0).abs() < f64::EPSILON);

        let first_window_start = reference - Days::new(69);
        assert_eq!(
            buckets[0].label,
            format!("W{}", first_window_start.iso_week().week())
        );
    }

    #[test]
    fn test_monthly_series_covers_whole_year() {
        let conn = setup_test_db();
        insert_emission(&conn, 1, "2025-01-10", 40.0);
        insert_emission(&conn, 1, "2025-07-04", 60.0);
        insert_emission(&conn, 1, "2025-12-31", 80.0);
        insert_emission(&conn, 1, "2024-12-31", 500.0); // previous year excluded

        // Reference in March still yields Jan..Dec of the reference year.
        let buckets =
            emissions_series(&conn, 1, Granularity::Monthly, date("2025-03-15")).unwrap();
        assert_eq!(buckets.len(), 12);
        assert_eq!(buckets[0].label, "Jan");
        assert_eq!(buckets[11].label, "Dec");
        assert!((buckets[0].emissions - 40.0).abs() < f64::EPSILON);
        assert!((buckets[6].emissions - 60.0).abs() < f64::EPSILON);
        assert!((buckets[11].emissions - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_series_reconciles_with_direct_sum() {
        let conn = setup_test_db();
        let reference = date("2025-10-30");
        for (day, value) in [(1u32, 12.5), (5, 7.25), (15, 50.0), (29, 0.75)] {
            insert_emission(
                &conn,
                1,
                &format!("2025-10-{day:02}"),
                value,
            );
        }

        let buckets = emissions_series(&conn, 1, Granularity::Daily, reference).unwrap();
        let bucket_total: f64 = buckets.iter().map(|b| b.emissions).sum();
        assert!((bucket_total - 70.5).abs() < 1e-9);
    }
}
