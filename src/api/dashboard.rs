use crate::api::errors::ApiError;
use crate::api::{blocking, parse_reference_date, resolve_user_org};
use crate::audit;
use crate::db::filter::{parse_id_list, RecordFilter};
use crate::db::AppState;
use crate::query::{breakdown, comparison, records, round2, series};
use axum::extract::{Query, State};
use axum::Json;
use chrono::Days;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fraction of month-to-date emissions reported as offset. A demo
/// heuristic, not a real offset ledger.
const OFFSET_RATIO: f64 = 0.10;

/// Query parameters shared by the dashboard chart endpoints.
#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub user_id: i64,
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Anchor for all reporting windows. Defaults to today (UTC).
    pub reference_date: Option<String>,
}

fn default_filter() -> String {
    "monthly".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_emissions: f64,
    pub emission_reduction: f64,
    pub energy_usage: f64,
    pub offset_achieved: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: DashboardStats,
}

/// GET /api/dashboard/stats — Month-to-date headline numbers.
///
/// The reduction compares against the same day-of-month span of the prior
/// month. A user with no organization gets all-zero stats rather than an
/// error, so the dashboard still renders.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let stats = blocking(state, move |conn| {
        let Some(org_id) = resolve_user_org(conn, params.user_id)? else {
            return Ok(DashboardStats {
                total_emissions: 0.0,
                emission_reduction: 0.0,
                energy_usage: 0.0,
                offset_achieved: 0.0,
            });
        };

        let mtd = comparison::month_to_date(conn, org_id, reference)?;
        audit::record(
            conn,
            Some(params.user_id),
            "SELECT_DASHBOARD_STATS",
            "User retrieved dashboard statistics",
        );
        Ok(DashboardStats {
            total_emissions: mtd.co2_emitted,
            emission_reduction: mtd.reduction_percent,
            energy_usage: mtd.energy_consumed,
            offset_achieved: round2(mtd.co2_emitted * OFFSET_RATIO),
        })
    })
    .await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub success: bool,
    pub data: Vec<series::Bucket>,
}

/// GET /api/dashboard/emissions-over-time — Gap-filled emission series.
///
/// `filter` selects the granularity: `daily` (last 30 days), `weekly`
/// (last 10 seven-day windows), anything else monthly (Jan..Dec of the
/// reference year).
pub async fn get_emissions_over_time(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let granularity = series::Granularity::parse(&params.filter);
    let data = blocking(state, move |conn| {
        let Some(org_id) = resolve_user_org(conn, params.user_id)? else {
            return Ok(Vec::new());
        };
        Ok(series::emissions_series(conn, org_id, granularity, reference)?)
    })
    .await?;
    Ok(Json(SeriesResponse {
        success: true,
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct BreakdownResponse {
    pub success: bool,
    pub data: Vec<breakdown::CategoryShare>,
}

/// GET /api/dashboard/breakdown — Per-category shares for the period.
pub async fn get_breakdown(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<BreakdownResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let period = breakdown::Period::parse(&params.filter);
    let data = blocking(state, move |conn| {
        let Some(org_id) = resolve_user_org(conn, params.user_id)? else {
            return Ok(Vec::new());
        };
        Ok(breakdown::category_breakdown(conn, org_id, period, reference)?)
    })
    .await?;
    Ok(Json(BreakdownResponse {
        success: true,
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct TopCategoriesResponse {
    pub success: bool,
    pub data: Vec<breakdown::TopCategory>,
}

/// GET /api/dashboard/top-categories — Three highest-emitting categories.
pub async fn get_top_categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<TopCategoriesResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let period = breakdown::Period::parse(&params.filter);
    let data = blocking(state, move |conn| {
        let Some(org_id) = resolve_user_org(conn, params.user_id)? else {
            return Ok(Vec::new());
        };
        Ok(breakdown::top_categories(conn, org_id, period, reference, 3)?)
    })
    .await?;
    Ok(Json(TopCategoriesResponse {
        success: true,
        data,
    }))
}

/// How many rows the unfiltered "recent emissions" table shows.
const RECENT_RECORDS_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RecordsParams {
    pub user_id: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma-separated location ids.
    pub location_ids: Option<String>,
    /// Comma-separated category ids.
    pub category_ids: Option<String>,
    pub reference_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub success: bool,
    pub summary: Option<records::RecordsSummary>,
    pub emissions_over_time: Vec<records::SeriesPoint>,
    pub category_breakdown: Vec<records::CategoryTotal>,
    pub records: Vec<records::EmissionRecord>,
    pub locations: Vec<records::LocationRef>,
    pub categories: Vec<records::CategoryRef>,
}

/// GET /api/emission-data/records — Full payload for the records page:
/// filtered summary, chart series, category totals, the latest unfiltered
/// records, and the filter option lists.
pub async fn get_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;

    // Window defaults to the trailing 30 days.
    let start = match &params.start_date {
        Some(raw) => raw.parse().map_err(|_| {
            ApiError::BadRequest(format!("Invalid start_date: {raw}. Expected YYYY-MM-DD."))
        })?,
        None => reference - Days::new(30),
    };
    let end = match &params.end_date {
        Some(raw) => raw.parse().map_err(|_| {
            ApiError::BadRequest(format!("Invalid end_date: {raw}. Expected YYYY-MM-DD."))
        })?,
        None => reference,
    };

    let mut filter = RecordFilter::new(0, start, end);
    if let Some(raw) = &params.location_ids {
        let ids = parse_id_list(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid location_ids: {raw}"))
        })?;
        filter = filter.with_locations(ids);
    }
    if let Some(raw) = &params.category_ids {
        let ids = parse_id_list(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid category_ids: {raw}"))
        })?;
        filter = filter.with_categories(ids);
    }

    let response = blocking(state, move |conn| {
        let Some(org_id) = resolve_user_org(conn, params.user_id)? else {
            return Ok(RecordsResponse {
                success: true,
                summary: None,
                emissions_over_time: Vec::new(),
                category_breakdown: Vec::new(),
                records: Vec::new(),
                locations: Vec::new(),
                categories: Vec::new(),
            });
        };
        filter.org_id = org_id;

        let summary = records::summary(conn, &filter)?;
        let emissions_over_time = records::emissions_over_time(conn, &filter)?;
        let category_breakdown = records::category_totals(conn, &filter)?;
        let recent = records::recent_records(conn, org_id, RECENT_RECORDS_LIMIT)?;
        let locations = records::org_locations(conn, org_id)?;
        let categories = records::all_categories(conn)?;

        audit::record(
            conn,
            Some(params.user_id),
            "SELECT_EMISSION_RECORDS",
            &format!(
                "User retrieved emission records (date range: {} to {})",
                filter.start, filter.end
            ),
        );

        Ok(RecordsResponse {
            success: true,
            summary: Some(summary),
            emissions_over_time,
            category_breakdown,
            records: recent,
            locations,
            categories,
        })
    })
    .await?;
    Ok(Json(response))
}
