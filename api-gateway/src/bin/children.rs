//! Children Lambda - Handles child profile CRUD.
//!
//! Endpoints:
//! - POST /v1/children - Create a child profile (parents only)
//! - GET /v1/children - List children across the caller's families (`?familyId=` filter)
//! - GET /v1/children/{id} - Get a child profile
//! - PUT /v1/children/{id} - Update a child profile (parents only)
//! - DELETE /v1/children/{id} - Delete a child and their events (parents only)

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::http::{parse_id, path_segments, reply, respond, route_not_found, validated_body};
use shared::models::{ChildResponse, CreateChildRequest, UpdateChildRequest};
use shared::{authenticated_user, child_access, children, family_role};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
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
    let segments = path_segments(event.uri().path(), "/v1/children").ok_or_else(route_not_found)?;
    let today = Utc::now().date_naive();

    match (event.method().as_str(), segments.as_slice()) {
        ("POST", []) => {
            let request: CreateChildRequest = validated_body(event.body())?;
            children::check_birth_date(request.birth_date, today)?;
            family_role(&state.db_pool, request.family_id, user.user_id)
                .await?
                .require_manage("add children")?;

            let child = children::create(&state.db_pool, &request).await?;
            info!(child_id = %child.id, family_id = %child.family_id, user_id = %user.user_id, "Created child");

            reply(201, ChildResponse::from_row(child, today))
        }

        ("GET", []) => {
            let params = event.query_string_parameters();
            let family_id = params
                .first("familyId")
                .map(|id| parse_id(id, "family"))
                .transpose()?;

            let rows = children::list_for_user(&state.db_pool, user.user_id, family_id).await?;
            let profiles: Vec<ChildResponse> = rows
                .into_iter()
                .map(|row| ChildResponse::from_row(row, today))
                .collect();

            reply(200, profiles)
        }

        ("GET", [id]) => {
            let child_id = parse_id(id, "child")?;
            child_access(&state.db_pool, child_id, user.user_id).await?;

            let child = children::get(&state.db_pool, child_id).await?;
            reply(200, ChildResponse::from_row(child, today))
        }

        ("PUT", [id]) => {
            let child_id = parse_id(id, "child")?;
            let request: UpdateChildRequest = validated_body(event.body())?;
            children::check_birth_date(request.birth_date, today)?;
            child_access(&state.db_pool, child_id, user.user_id)
                .await?
                .role
                .require_manage("edit children")?;

            let child = children::update(&state.db_pool, child_id, &request).await?;
            info!(child_id = %child_id, user_id = %user.user_id, "Updated child");

            reply(200, ChildResponse::from_row(child, today))
        }

        ("DELETE", [id]) => {
            let child_id = parse_id(id, "child")?;
            child_access(&state.db_pool, child_id, user.user_id)
                .await?
                .role
                .require_manage("delete children")?;

            children::delete(&state.db_pool, child_id).await?;
            info!(child_id = %child_id, user_id = %user.user_id, "Deleted child");

            reply(200, serde_json::json!({ "message": "Child deleted" }))
        }

        _ => Err(route_not_found()),
    }
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
