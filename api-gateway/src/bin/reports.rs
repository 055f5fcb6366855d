//! Reports Lambda - Handles GET /v1/children/{id}/report.
//!
//! Query parameters:
//! - `from`, `to`: inclusive `YYYY-MM-DD` bounds (default: last 30 days)
//! - `format`: `pdf` (default), `xlsx`/`excel` or `csv`
//! - `summary=true`: return the aggregated report as JSON instead of a file

use chrono::{Duration, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::http::{binary_response, parse_id, path_segments, reply, respond, route_not_found};
use shared::reports::{self, ChildReport, ReportFormat, MAX_REPORT_DAYS};
use shared::{authenticated_user, child_access, children, events, DateRange};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Days covered when the client gives no range.
const DEFAULT_REPORT_DAYS: i64 = 30;

/// Application state
struct AppState {
    db_pool: PgPool,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let (_, db_pool) = shared::db::connect_from_env().await?;
        Ok(Self { db_pool })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    respond(route(&state, &event).await)
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let user = authenticated_user(event)?;
    let segments = path_segments(event.uri().path(), "/v1/children").ok_or_else(route_not_found)?;

    let child_id = match (event.method().as_str(), segments.as_slice()) {
        ("GET", [id, "report"]) => parse_id(id, "child")?,
        _ => return Err(route_not_found()),
    };
    child_access(&state.db_pool, child_id, user.user_id).await?;

    let params = event.query_string_parameters();
    let format: ReportFormat = params.first("format").unwrap_or("pdf").parse()?;
    let today = Utc::now().date_naive();
    let range = DateRange::from_query(
        params.first("from"),
        params.first("to"),
        today - Duration::days(DEFAULT_REPORT_DAYS - 1),
        today,
    )?;
    range.ensure_max_days(MAX_REPORT_DAYS)?;

    let child = children::get(&state.db_pool, child_id).await?;
    let logged = events::all_for_child_range(&state.db_pool, child_id, &range).await?;
    let report = ChildReport::build(&child, &range, &logged, Utc::now());

    if params.first("summary") == Some("true") {
        return reply(200, report);
    }

    let bytes = reports::render(&report, format)?;
    let filename = reports::report_filename(&report.child_name, &range, format);

    info!(
        child_id = %child_id,
        user_id = %user.user_id,
        format = %format,
        events = report.total_events,
        bytes = bytes.len(),
        "Generated report"
    );

    binary_response(format.content_type(), &filename, bytes)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
