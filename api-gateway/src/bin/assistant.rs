//! Assistant Lambda - Chat with the family Bedrock agent.
//!
//! Endpoints:
//! - POST /v1/assistant/messages - Send a message (`{ message, sessionId? }`)
//! - GET /v1/assistant/sessions/{id}/messages - Conversation history
//! - DELETE /v1/assistant/sessions/{id} - End a conversation

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::agents::{self, normalize_message, resolve_session_id};
use shared::http::{json_body, path_segments, reply, respond, route_not_found};
use shared::models::{AssistantMessageRequest, AssistantMessageResponse, MessageRole};
use shared::{authenticated_user, children, AgentContext, AssistantClient, AuthenticatedUser};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    db_pool: PgPool,
    assistant: AssistantClient,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let (config, db_pool) = shared::db::connect_from_env().await?;
        let agent_config = config.agent()?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let bedrock = aws_sdk_bedrockagentruntime::Client::new(&aws_config);

        Ok(Self {
            db_pool,
            assistant: AssistantClient::new(bedrock, &agent_config),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    respond(route(&state, &event).await)
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let user = authenticated_user(event)?;
    let segments = path_segments(event.uri().path(), "/v1/assistant").ok_or_else(route_not_found)?;

    match (event.method().as_str(), segments.as_slice()) {
        ("POST", ["messages"]) => send_message(state, event, &user).await,

        ("GET", ["sessions", session_id, "messages"]) => {
            agents::require_owned_session(&state.db_pool, session_id, user.user_id).await?;
            let messages = agents::history(&state.db_pool, session_id).await?;
            reply(200, messages)
        }

        ("DELETE", ["sessions", session_id]) => {
            agents::require_owned_session(&state.db_pool, session_id, user.user_id).await?;
            state.assistant.end_session(session_id).await?;
            agents::mark_session_ended(&state.db_pool, session_id).await?;
            reply(200, serde_json::json!({ "message": "Conversation ended" }))
        }

        _ => Err(route_not_found()),
    }
}

async fn send_message(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
) -> shared::Result<Response<Body>> {
    let request: AssistantMessageRequest = json_body(event.body())?;
    let message = normalize_message(&request.message)?;
    let (session_id, created) = resolve_session_id(request.session_id.as_deref())?;

    agents::touch_session(&state.db_pool, &session_id, user.user_id).await?;
    agents::record_message(&state.db_pool, &session_id, MessageRole::User, &message).await?;

    let today = Utc::now().date_naive();
    let family_children = children::list_for_user(&state.db_pool, user.user_id, None).await?;
    let context = AgentContext::new(user.user_id, today, &family_children);

    let reply_text = match state.assistant.send(&session_id, &message, &context).await {
        Ok(text) => text,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Agent invocation failed");
            return Err(e);
        }
    };

    agents::record_message(&state.db_pool, &session_id, MessageRole::Assistant, &reply_text).await?;

    info!(
        session_id = %session_id,
        user_id = %user.user_id,
        new_session = created,
        reply_chars = reply_text.chars().count(),
        "Assistant replied"
    );

    reply(
        200,
        AssistantMessageResponse {
            reply: reply_text,
            session_id,
        },
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
