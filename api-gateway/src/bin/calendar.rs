//! Calendar Lambda - Handles /v1/families/{id}/calendar.
//!
//! Returns one entry per day with the events logged for the family's children
//! and the meals planned for that day. The range is `?month=YYYY-MM`, or
//! `?from=&to=` (inclusive), defaulting to the current month.

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::calendar::{build_calendar, month_range, MAX_CALENDAR_DAYS};
use shared::http::{parse_id, path_segments, reply, respond, route_not_found};
use shared::{authenticated_user, children, events, family_role, meals, DateRange};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

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
    let segments = path_segments(event.uri().path(), "/v1/families").ok_or_else(route_not_found)?;

    let family_id = match (event.method().as_str(), segments.as_slice()) {
        ("GET", [id, "calendar"]) => parse_id(id, "family")?,
        _ => return Err(route_not_found()),
    };
    family_role(&state.db_pool, family_id, user.user_id).await?;

    let params = event.query_string_parameters();
    let range = match params.first("month") {
        Some(month) => month_range(month)?,
        None => {
            let current = month_range(&Utc::now().format("%Y-%m").to_string())?;
            DateRange::from_query(params.first("from"), params.first("to"), current.from, current.to)?
        }
    };
    range.ensure_max_days(MAX_CALENDAR_DAYS)?;

    let family_children = children::list_for_user(&state.db_pool, user.user_id, Some(family_id)).await?;
    let child_names: BTreeMap<_, _> = family_children
        .iter()
        .map(|c| (c.id, c.display_name()))
        .collect();

    let logged = events::list_for_family_range(&state.db_pool, family_id, &range).await?;
    let planned = meals::list_for_family(&state.db_pool, family_id, &range, None).await?;

    debug!(
        family_id = %family_id,
        from = %range.from,
        to = %range.to,
        events = logged.len(),
        meals = planned.len(),
        "Building calendar"
    );

    reply(200, build_calendar(&range, &logged, &planned, &child_names)?)
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
