//! User Signup Lambda - Cognito Post-Confirmation Trigger
//!
//! Creates (or refreshes) the `users` row once a Cognito account is confirmed.
//! The event is echoed back unchanged, as Cognito requires.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use shared::models::default_user_settings;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Cognito trigger event. Unknown fields are carried through in `extra`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CognitoTriggerEvent {
    trigger_source: String,
    user_name: String,
    request: CognitoRequest,
    #[serde(default)]
    response: serde_json::Value,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CognitoRequest {
    user_attributes: UserAttributes,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct UserAttributes {
    sub: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(
        rename = "custom:display_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    display_name: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl UserAttributes {
    /// Explicit display name, then `name`, then the email's local part.
    fn preferred_name(&self) -> String {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.email
                    .split('@')
                    .next()
                    .filter(|local| !local.is_empty())
                    .unwrap_or("Parent")
                    .to_string()
            })
    }
}

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

async fn upsert_user(pool: &PgPool, attrs: &UserAttributes) -> shared::Result<Uuid> {
    let user_id = Uuid::parse_str(&attrs.sub)
        .map_err(|_| shared::Error::Validation(format!("Invalid user sub '{}'", attrs.sub)))?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name, cognito_sub, settings)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            email = EXCLUDED.email,
            display_name = COALESCE(NULLIF(users.display_name, ''), EXCLUDED.display_name),
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(attrs.email.trim())
    .bind(attrs.preferred_name())
    .bind(&attrs.sub)
    .bind(default_user_settings())
    .execute(pool)
    .await?;

    Ok(user_id)
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<CognitoTriggerEvent>,
) -> Result<CognitoTriggerEvent, Error> {
    let trigger = event.payload;

    if !trigger.trigger_source.starts_with("PostConfirmation") {
        info!(trigger_source = %trigger.trigger_source, "Skipping non-PostConfirmation trigger");
        return Ok(trigger);
    }

    match upsert_user(&state.db_pool, &trigger.request.user_attributes).await {
        Ok(user_id) => info!(user_id = %user_id, user_name = %trigger.user_name, "Provisioned user"),
        // The account stays usable; the row is created again on the next confirmation.
        Err(e) => error!(user_name = %trigger.user_name, error = %e, "Failed to provision user"),
    }

    Ok(trigger)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_json() -> serde_json::Value {
        serde_json::json!({
            "version": "1",
            "triggerSource": "PostConfirmation_ConfirmSignUp",
            "region": "us-east-1",
            "userPoolId": "us-east-1_abc",
            "userName": "jane",
            "callerContext": { "clientId": "xyz" },
            "request": {
                "userAttributes": {
                    "sub": "6f1c2d3e-4b5a-4c7d-8e9f-0a1b2c3d4e5f",
                    "email": "jane@example.com",
                    "email_verified": "true"
                }
            },
            "response": {}
        })
    }

    #[test]
    fn test_event_round_trips_unknown_fields() {
        let input = trigger_json();
        let parsed: CognitoTriggerEvent = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&parsed).unwrap(), input);
    }

    #[test]
    fn test_preferred_name_fallbacks() {
        let parsed: CognitoTriggerEvent = serde_json::from_value(trigger_json()).unwrap();
        assert_eq!(parsed.request.user_attributes.preferred_name(), "jane");

        let mut attrs = parsed.request.user_attributes;
        attrs.name = Some("Jane Doe".to_string());
        assert_eq!(attrs.preferred_name(), "Jane Doe");
        attrs.display_name = Some("  ".to_string());
        assert_eq!(attrs.preferred_name(), "Jane Doe");
        attrs.display_name = Some("JD".to_string());
        assert_eq!(attrs.preferred_name(), "JD");
    }
}
