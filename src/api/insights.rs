use crate::api::errors::ApiError;
use crate::api::{blocking, parse_reference_date, resolve_user_org};
use crate::audit;
use crate::db::filter::RecordFilter;
use crate::db::AppState;
use crate::query::{breakdown, comparison, records, round2, trend};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{Datelike, Days, Months, NaiveDate};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Next-month projection ratios applied to the trailing six-month average.
/// Display heuristics carried over from the product behavior.
const EMISSIONS_PROJECTION_RATIO: f64 = 0.95;
const ENERGY_PROJECTION_RATIO: f64 = 0.96;

#[derive(Debug, Deserialize)]
pub struct InsightParams {
    pub user_id: i64,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    pub reference_date: Option<String>,
}

fn default_data_type() -> String {
    "emissions".to_string()
}

/// Resolve the user's org, rejecting org-less users. The insight endpoints
/// have nothing to show without organization data.
fn require_org(conn: &Connection, user_id: i64) -> Result<i64, ApiError> {
    resolve_user_org(conn, user_id)?.ok_or_else(|| {
        ApiError::BadRequest("User is not associated with an organization".to_string())
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Projection {
    pub value: f64,
    pub change: f64,
    pub trend: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Predictions {
    pub next_month_emissions: Projection,
    pub next_month_energy: Projection,
    pub top_risk_sources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub success: bool,
    pub predictions: Predictions,
}

/// GET /api/ai-insights/predictions — Next-month projections.
///
/// The projected value is the trailing six-month average scaled slightly
/// downward, compared against the full current calendar month. Change is 0
/// when the current month has no data.
pub async fn get_predictions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InsightParams>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let predictions = blocking(state, move |conn| {
        let org_id = require_org(conn, params.user_id)?;

        let month_start = reference.with_day(1).unwrap_or(reference);
        let month_end = month_start + Months::new(1) - Days::new(1);
        let (current_emissions, current_energy) =
            comparison::range_totals_with_energy(conn, org_id, month_start, month_end)?;

        let averages = trend::monthly_averages(conn, org_id, reference)?;
        let predicted_emissions = round2(averages.avg_emissions * EMISSIONS_PROJECTION_RATIO);
        let predicted_energy = round2(averages.avg_energy * ENERGY_PROJECTION_RATIO);

        let top_risk_sources =
            breakdown::top_category_names(conn, org_id, reference - Months::new(3), reference, 3)?;

        Ok(Predictions {
            next_month_emissions: projection(predicted_emissions, current_emissions),
            next_month_energy: projection(predicted_energy, current_energy),
            top_risk_sources,
        })
    })
    .await?;
    Ok(Json(PredictionsResponse {
        success: true,
        predictions,
    }))
}

fn projection(predicted: f64, current: f64) -> Projection {
    let change = comparison::percent_change(predicted, current);
    Projection {
        value: predicted,
        change,
        trend: if change < 0.0 { "down" } else { "up" }.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub success: bool,
    pub data_type: String,
    pub trends: Vec<trend::TrendPoint>,
}

/// GET /api/ai-insights/trends — Six months of actuals plus three
/// projected months for emissions or energy.
pub async fn get_trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InsightParams>,
) -> Result<Json<TrendsResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let metric = trend::Metric::parse(&params.data_type);
    let trends = blocking(state, move |conn| {
        let org_id = require_org(conn, params.user_id)?;
        Ok(trend::trend_points(conn, org_id, metric, reference)?)
    })
    .await?;
    Ok(Json(TrendsResponse {
        success: true,
        data_type: metric.as_str().to_string(),
        trends,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub confidence: i64,
    pub timestamp: String,
    pub severity: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub success: bool,
    pub insights: Vec<Insight>,
    pub total_count: usize,
}

/// GET /api/ai-insights/recommendations — Heuristic insight cards built
/// from the trailing 30 days: the dominant category, a month-over-month
/// swing when it exceeds 10% either way, and two static cards.
pub async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InsightParams>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let insights = blocking(state, move |conn| {
        let org_id = require_org(conn, params.user_id)?;
        Ok(build_recommendations(conn, org_id, reference)?)
    })
    .await?;
    Ok(Json(RecommendationsResponse {
        success: true,
        total_count: insights.len(),
        insights,
    }))
}

fn build_recommendations(
    conn: &Connection,
    org_id: i64,
    reference: NaiveDate,
) -> Result<Vec<Insight>, duckdb::Error> {
    let window = RecordFilter::new(org_id, reference - Days::new(30), reference);
    let categories = records::category_totals(conn, &window)?;
    let total_emissions: f64 = categories.iter().map(|c| c.value).sum();

    let previous_total = comparison::range_total(
        conn,
        org_id,
        reference - Days::new(60),
        reference - Days::new(31),
    )?;

    let mut insights = Vec::new();

    if let Some(top) = categories.first() {
        let percentage = if total_emissions > 0.0 {
            round1(top.value / total_emissions * 100.0)
        } else {
            0.0
        };
        insights.push(Insight {
            id: 1,
            kind: "alert".to_string(),
            title: format!("{} Emissions Dominant", top.category),
            message: format!(
                "Your {} emissions account for {percentage}% of total emissions. \
                 Consider targeted reduction strategies for this category.",
                top.category
            ),
            confidence: 94,
            timestamp: "5 minutes ago".to_string(),
            severity: "high".to_string(),
        });
    }

    if previous_total > 0.0 {
        let change = round1((total_emissions - previous_total) / previous_total * 100.0);
        if change > 10.0 {
            insights.push(Insight {
                id: 2,
                kind: "warning".to_string(),
                title: "Emissions Increasing".to_string(),
                message: format!(
                    "Your emissions have increased by {change}% compared to last month. \
                     Review recent activities and consider implementing reduction measures."
                ),
                confidence: 91,
                timestamp: "12 minutes ago".to_string(),
                severity: "medium".to_string(),
            });
        } else if change < -10.0 {
            insights.push(Insight {
                id: 2,
                kind: "success".to_string(),
                title: "Great Progress!".to_string(),
                message: format!(
                    "Excellent work! Your emissions have decreased by {}% compared to last month. \
                     Keep up the sustainable practices.",
                    change.abs()
                ),
                confidence: 93,
                timestamp: "12 minutes ago".to_string(),
                severity: "low".to_string(),
            });
        }
    }

    insights.push(Insight {
        id: 3,
        kind: "opportunity".to_string(),
        title: "Optimization Opportunity Detected".to_string(),
        message: "AI analysis suggests potential for 15-20% emission reduction through \
                  operational efficiency improvements. Consider scheduling an energy audit."
            .to_string(),
        confidence: 87,
        timestamp: "1 hour ago".to_string(),
        severity: "medium".to_string(),
    });

    insights.push(Insight {
        id: 4,
        kind: "prediction".to_string(),
        title: "Seasonal Trend Alert".to_string(),
        message: "Historical patterns indicate typical seasonal variation during this period. \
                  Proactive measures can help maintain emission targets."
            .to_string(),
        confidence: 85,
        timestamp: "2 hours ago".to_string(),
        severity: "low".to_string(),
    });

    Ok(insights)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub insight: Insight,
}

/// POST /api/ai-insights/generate — One on-demand insight naming the
/// category with the highest average daily emissions over the last week.
pub async fn generate_insight(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InsightParams>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let reference = parse_reference_date(params.reference_date.as_deref())?;
    let insight = blocking(state, move |conn| {
        let org_id = require_org(conn, params.user_id)?;

        let top = conn.query_row(
            "SELECT COALESCE(ec.name, 'Unknown')
             FROM DailyEmissions de
             LEFT JOIN EmissionCategories ec ON de.category_id = ec.category_id
             WHERE de.org_id = ?
               AND de.record_date >= CAST(? AS DATE) AND de.record_date <= CAST(? AS DATE)
             GROUP BY ec.category_id, ec.name
             ORDER BY AVG(de.co2_emitted) DESC
             LIMIT 1",
            duckdb::params![
                org_id,
                (reference - Days::new(7)).to_string(),
                reference.to_string()
            ],
            |row| row.get::<_, String>(0),
        );
        let subject = match top {
            Ok(name) => name,
            Err(duckdb::Error::QueryReturnedNoRows) => "your primary emission source".to_string(),
            Err(e) => return Err(e.into()),
        };

        audit::record(
            conn,
            Some(params.user_id),
            "GENERATE_AI_INSIGHT",
            "User generated a new AI insight",
        );

        Ok(Insight {
            id: 999,
            kind: "prediction".to_string(),
            title: "New Pattern Identified".to_string(),
            message: format!(
                "AI detected that {subject} shows consistent patterns. \
                 Implementing smart scheduling could reduce emissions by up to 12%."
            ),
            confidence: 89,
            timestamp: "Just now".to_string(),
            severity: "medium".to_string(),
        })
    })
    .await?;
    Ok(Json(GenerateResponse {
        success: true,
        insight,
    }))
}
