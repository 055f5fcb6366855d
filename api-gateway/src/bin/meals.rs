//! Meal Planner Lambda - Handles planned meals for a family.
//!
//! Endpoints:
//! - GET /v1/families/{id}/meals?week=YYYY-MM-DD - Week plan containing that date
//! - GET /v1/families/{id}/meals?from=&to=&childId= - Flat list of planned meals
//! - POST /v1/families/{id}/meals - Plan a meal
//! - POST /v1/families/{id}/meals/copy - Copy a week's plan onto another week
//! - PUT /v1/meals/{id} - Update a planned meal
//! - DELETE /v1/meals/{id} - Remove a planned meal

use chrono::{Duration, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::http::{
    json_body, parse_date, parse_id, path_segments, reply, respond, route_not_found,
    validated_body,
};
use shared::meals::{self, WeekPlan};
use shared::models::{CopyWeekRequest, CreateMealRequest, UpdateMealRequest};
use shared::{authenticated_user, family_role, AuthenticatedUser, DateRange};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Longest flat listing a single request may ask for.
const MAX_LIST_DAYS: i64 = 92;

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
    let path = event.uri().path();
    let method = event.method().as_str();

    if let Some(segments) = path_segments(path, "/v1/families") {
        let (family_id, rest) = match segments.split_first() {
            Some((id, rest)) => (parse_id(id, "family")?, rest),
            None => return Err(route_not_found()),
        };
        // Any member may plan meals.
        family_role(&state.db_pool, family_id, user.user_id).await?;

        return match (method, rest) {
            ("GET", ["meals"]) => list_meals(state, event, family_id).await,
            ("POST", ["meals"]) => create_meal(state, event, &user, family_id).await,
            ("POST", ["meals", "copy"]) => copy_week(state, event, &user, family_id).await,
            _ => Err(route_not_found()),
        };
    }

    let segments = path_segments(path, "/v1/meals").ok_or_else(route_not_found)?;
    let meal_id = match segments.as_slice() {
        [id] => parse_id(id, "meal")?,
        _ => return Err(route_not_found()),
    };

    let existing = meals::get(&state.db_pool, meal_id).await?;
    family_role(&state.db_pool, existing.family_id, user.user_id).await?;

    match method {
        "PUT" => {
            let request: UpdateMealRequest = validated_body(event.body())?;
            let updated = meals::update(&state.db_pool, meal_id, &request).await?;
            info!(meal_id = %meal_id, user_id = %user.user_id, "Updated meal");
            reply(200, updated)
        }
        "DELETE" => {
            meals::delete(&state.db_pool, meal_id).await?;
            info!(meal_id = %meal_id, user_id = %user.user_id, "Deleted meal");
            reply(200, serde_json::json!({ "message": "Meal deleted" }))
        }
        _ => Err(route_not_found()),
    }
}

async fn list_meals(
    state: &AppState,
    event: &Request,
    family_id: Uuid,
) -> shared::Result<Response<Body>> {
    let params = event.query_string_parameters();
    let child_id = params
        .first("childId")
        .map(|id| parse_id(id, "child"))
        .transpose()?;

    if params.first("from").is_none() && params.first("to").is_none() {
        let day = match params.first("week") {
            Some(raw) => parse_date(raw)?,
            None => Utc::now().date_naive(),
        };
        let week = meals::week_range(day)?;
        let entries = meals::list_for_family(&state.db_pool, family_id, &week, child_id).await?;
        return reply(200, WeekPlan::build(day, entries)?);
    }

    let today = Utc::now().date_naive();
    let range = DateRange::from_query(
        params.first("from"),
        params.first("to"),
        today,
        today + Duration::days(6),
    )?;
    range.ensure_max_days(MAX_LIST_DAYS)?;

    let entries = meals::list_for_family(&state.db_pool, family_id, &range, child_id).await?;
    reply(200, entries)
}

async fn create_meal(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
    family_id: Uuid,
) -> shared::Result<Response<Body>> {
    let request: CreateMealRequest = validated_body(event.body())?;
    let entry = meals::create(&state.db_pool, family_id, user.user_id, &request).await?;

    info!(
        meal_id = %entry.id,
        family_id = %family_id,
        plan_date = %entry.plan_date,
        meal_type = %entry.meal_type,
        "Planned meal"
    );
    reply(201, entry)
}

async fn copy_week(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
    family_id: Uuid,
) -> shared::Result<Response<Body>> {
    let request: CopyWeekRequest = json_body(event.body())?;
    let inserted = meals::copy_week_plan(
        &state.db_pool,
        family_id,
        user.user_id,
        request.from_week,
        request.to_week,
    )
    .await?;

    let target = meals::week_range(request.to_week)?;
    let entries = meals::list_for_family(&state.db_pool, family_id, &target, None).await?;

    reply(
        201,
        serde_json::json!({
            "copied": inserted,
            "week": WeekPlan::build(target.from, entries)?,
        }),
    )
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
