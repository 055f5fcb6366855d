//! Events Lambda - Handles activity logging for children.
//!
//! Endpoints:
//! - POST /v1/children/{id}/events - Log an event
//! - GET /v1/children/{id}/events - List events (`from`, `to`, `category`, `limit`, `offset`)
//! - GET /v1/events/{id} - Get an event
//! - PUT /v1/events/{id} - Update an event
//! - DELETE /v1/events/{id} - Delete an event

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::http::{
    parse_date, parse_id, path_segments, reply, respond, route_not_found, validated_body,
};
use shared::models::{CreateEventRequest, EventCategory, EventResponse, UpdateEventRequest};
use shared::{authenticated_user, child_access, events, AuthenticatedUser, Pagination};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

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

    if let Some(segments) = path_segments(path, "/v1/children") {
        return match (method, segments.as_slice()) {
            ("POST", [id, "events"]) => log_event(state, event, &user, parse_id(id, "child")?).await,
            ("GET", [id, "events"]) => list_events(state, event, &user, parse_id(id, "child")?).await,
            _ => Err(route_not_found()),
        };
    }

    let segments = path_segments(path, "/v1/events").ok_or_else(route_not_found)?;
    let event_id = match segments.as_slice() {
        [id] => parse_id(id, "event")?,
        _ => return Err(route_not_found()),
    };

    let existing = events::get(&state.db_pool, event_id).await?;
    let access = child_access(&state.db_pool, existing.child_id, user.user_id).await?;

    match method {
        "GET" => reply(200, EventResponse::from(existing)),

        "PUT" => {
            if !events::can_modify(access.role, &existing, user.user_id) {
                return Err(shared::Error::Unauthorized(
                    "Caregivers can only edit events they logged".to_string(),
                ));
            }
            let request: UpdateEventRequest = validated_body(event.body())?;
            let updated = events::update(&state.db_pool, event_id, &request).await?;
            info!(event_id = %event_id, user_id = %user.user_id, "Updated event");

            reply(200, EventResponse::from(updated))
        }

        "DELETE" => {
            if !events::can_modify(access.role, &existing, user.user_id) {
                return Err(shared::Error::Unauthorized(
                    "Caregivers can only delete events they logged".to_string(),
                ));
            }
            events::delete(&state.db_pool, event_id).await?;
            info!(event_id = %event_id, user_id = %user.user_id, "Deleted event");

            reply(200, serde_json::json!({ "message": "Event deleted" }))
        }

        _ => Err(route_not_found()),
    }
}

async fn log_event(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
    child_id: Uuid,
) -> shared::Result<Response<Body>> {
    child_access(&state.db_pool, child_id, user.user_id).await?;

    let request: CreateEventRequest = validated_body(event.body())?;
    let logged = events::log_event(&state.db_pool, child_id, user.user_id, &request).await?;

    info!(
        event_id = %logged.id,
        child_id = %child_id,
        category = %logged.category,
        user_id = %user.user_id,
        "Logged event"
    );

    reply(201, EventResponse::from(logged))
}

async fn list_events(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
    child_id: Uuid,
) -> shared::Result<Response<Body>> {
    child_access(&state.db_pool, child_id, user.user_id).await?;

    let params = event.query_string_parameters();
    let from = params.first("from").map(parse_date).transpose()?;
    let to = params.first("to").map(parse_date).transpose()?;
    let category = params
        .first("category")
        .map(str::parse::<EventCategory>)
        .transpose()?;
    let page = Pagination::from_query(params.first("limit"), params.first("offset"));

    let found = events::list_for_child(&state.db_pool, child_id, from, to, category, page).await?;
    let items: Vec<EventResponse> = found.into_iter().map(EventResponse::from).collect();

    reply(
        200,
        serde_json::json!({
            "items": items,
            "limit": page.limit,
            "offset": page.offset,
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
