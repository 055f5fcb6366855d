//! Account Lambda - The signed-in user's own profile.
//!
//! Endpoints:
//! - GET /v1/me - Current profile
//! - PUT /v1/me - Update display name and merge settings

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{path_segments, reply, respond, route_not_found, validated_body};
use shared::models::{UpdateProfileRequest, UserResponse, UserRow};
use shared::{authenticated_user, AuthenticatedUser};
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
    let segments = path_segments(event.uri().path(), "/v1/me").ok_or_else(route_not_found)?;
    if !segments.is_empty() {
        return Err(route_not_found());
    }

    match event.method().as_str() {
        "GET" => {
            let profile = load_profile(&state.db_pool, &user).await?;
            reply(200, UserResponse::from(profile))
        }
        "PUT" => {
            let request: UpdateProfileRequest = validated_body(event.body())?;
            let profile = update_profile(&state.db_pool, &user, &request).await?;
            info!(user_id = %user.user_id, "Updated profile");
            reply(200, UserResponse::from(profile))
        }
        _ => Err(route_not_found()),
    }
}

async fn load_profile(pool: &PgPool, user: &AuthenticatedUser) -> shared::Result<UserRow> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, email, display_name, settings, created_at FROM users WHERE id = $1",
    )
    .bind(user.user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| shared::Error::NotFound("User not found".to_string()))
}

async fn update_profile(
    pool: &PgPool,
    user: &AuthenticatedUser,
    request: &UpdateProfileRequest,
) -> shared::Result<UserRow> {
    if let Some(settings) = &request.settings {
        if !settings.is_object() {
            return Err(shared::Error::Validation(
                "settings must be a JSON object".to_string(),
            ));
        }
    }

    sqlx::query_as::<_, UserRow>(
        r#"
        UPDATE users SET
            display_name = COALESCE($2, display_name),
            settings = settings || COALESCE($3::jsonb, '{}'::jsonb),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, email, display_name, settings, created_at
        "#,
    )
    .bind(user.user_id)
    .bind(request.display_name.as_deref().map(str::trim))
    .bind(&request.settings)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| shared::Error::NotFound("User not found".to_string()))
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
