//! Assistant backed by an Amazon Bedrock agent.
//!
//! The agent keeps conversation memory per session id; this module decides which
//! session a message belongs to, forwards the text and records both turns.

use aws_sdk_bedrockagentruntime::types::{ResponseStream, SessionState};
use aws_sdk_bedrockagentruntime::Client as BedrockAgentClient;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::models::{AssistantMessage, ChildRow, MessageRole};
use crate::{Error, Result};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Trim a user message and check it is non-empty and within limits.
pub fn normalize_message(raw: &str) -> Result<String> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(Error::Validation("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(Error::Validation(format!(
            "Message exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message.to_string())
}

/// Bedrock session ids are 2-100 characters of `[0-9A-Za-z._:-]`.
pub fn is_valid_session_id(id: &str) -> bool {
    (2..=100).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// Use the client's session id when given, otherwise start a new one.
///
/// Returns the id and whether it was newly created.
pub fn resolve_session_id(requested: Option<&str>) -> Result<(String, bool)> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok((Uuid::new_v4().to_string(), true)),
        Some(id) if is_valid_session_id(id) => Ok((id.to_string(), false)),
        Some(_) => Err(Error::Validation("Invalid session id".to_string())),
    }
}

/// Per-child facts handed to the agent as prompt context.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildContext {
    pub name: String,
    pub age: Option<String>,
    pub allergies: Vec<String>,
}

/// Context attached to every agent invocation.
#[derive(Debug)]
pub struct AgentContext {
    pub user_id: Uuid,
    pub today: NaiveDate,
    pub children: Vec<ChildContext>,
}

impl AgentContext {
    pub fn new(user_id: Uuid, today: NaiveDate, children: &[ChildRow]) -> Self {
        Self {
            user_id,
            today,
            children: children
                .iter()
                .map(|c| ChildContext {
                    name: c.display_name(),
                    age: c.age_on(today).map(|a| a.to_string()),
                    allergies: c.allergies.clone(),
                })
                .collect(),
        }
    }

    fn session_state(&self) -> Result<SessionState> {
        Ok(SessionState::builder()
            .session_attributes("userId", self.user_id.to_string())
            .prompt_session_attributes("currentDate", self.today.to_string())
            .prompt_session_attributes("children", serde_json::to_string(&self.children)?)
            .build())
    }
}

/// Client for the family assistant agent.
pub struct AssistantClient {
    client: BedrockAgentClient,
    agent_id: String,
    agent_alias_id: String,
}

impl AssistantClient {
    pub fn new(client: BedrockAgentClient, config: &AgentConfig) -> Self {
        Self {
            client,
            agent_id: config.agent_id.clone(),
            agent_alias_id: config.agent_alias_id.clone(),
        }
    }

    /// Send one user message and collect the streamed reply.
    pub async fn send(&self, session_id: &str, text: &str, context: &AgentContext) -> Result<String> {
        let output = self
            .client
            .invoke_agent()
            .agent_id(&self.agent_id)
            .agent_alias_id(&self.agent_alias_id)
            .session_id(session_id)
            .input_text(text)
            .session_state(context.session_state()?)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to invoke agent: {}", e)))?;

        let mut stream = output.completion;
        let mut bytes = Vec::new();

        while let Some(event) = stream
            .recv()
            .await
            .map_err(|e| Error::Aws(format!("Agent stream failed: {}", e)))?
        {
            match event {
                ResponseStream::Chunk(part) => {
                    if let Some(chunk) = part.bytes() {
                        bytes.extend_from_slice(chunk.as_ref());
                    }
                }
                other => debug!(event = ?other, "Ignoring agent stream event"),
            }
        }

        decode_reply(bytes)
    }

    /// Ask the agent to drop its memory for `session_id`.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.client
            .invoke_agent()
            .agent_id(&self.agent_id)
            .agent_alias_id(&self.agent_alias_id)
            .session_id(session_id)
            .end_session(true)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to end agent session: {}", e)))?;
        info!(session_id, "Ended agent session");
        Ok(())
    }
}

/// Decode the concatenated stream chunks; characters may span chunk boundaries.
fn decode_reply(bytes: Vec<u8>) -> Result<String> {
    let reply = String::from_utf8(bytes)
        .map_err(|e| Error::Aws(format!("Agent returned invalid UTF-8: {}", e)))?;
    if reply.trim().is_empty() {
        return Err(Error::Aws("Agent returned an empty reply".to_string()));
    }
    Ok(reply)
}

/// Ownership and liveness of a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Missing,
    Owned { ended: bool },
    Foreign,
}

/// Decide whether `user_id` may post to a session with the given stored owner.
pub fn check_session(status: SessionStatus) -> Result<()> {
    match status {
        SessionStatus::Missing | SessionStatus::Owned { ended: false } => Ok(()),
        SessionStatus::Owned { ended: true } => Err(Error::Conflict(
            "This conversation has ended; start a new one".to_string(),
        )),
        SessionStatus::Foreign => Err(Error::Unauthorized(
            "Session belongs to another user".to_string(),
        )),
    }
}

async fn session_status(pool: &PgPool, session_id: &str, user_id: Uuid) -> Result<SessionStatus> {
    let row: Option<(Uuid, Option<DateTime<Utc>>)> =
        sqlx::query_as("SELECT user_id, ended_at FROM assistant_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;

    Ok(match row {
        None => SessionStatus::Missing,
        Some((owner, ended_at)) if owner == user_id => SessionStatus::Owned {
            ended: ended_at.is_some(),
        },
        Some(_) => SessionStatus::Foreign,
    })
}

/// Map a session claim that changed no row to the reason it was refused.
fn refused_claim(status: SessionStatus) -> Error {
    match check_session(status) {
        Err(e) => e,
        Ok(()) => Error::Conflict("Session changed concurrently; retry".to_string()),
    }
}

/// Create the session row on first use or refresh its activity timestamp.
///
/// The upsert only touches a live row owned by `user_id`.
pub async fn touch_session(pool: &PgPool, session_id: &str, user_id: Uuid) -> Result<()> {
    let claimed = sqlx::query(
        r#"
        INSERT INTO assistant_sessions (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET last_active_at = NOW()
        WHERE assistant_sessions.user_id = EXCLUDED.user_id
          AND assistant_sessions.ended_at IS NULL
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if claimed.rows_affected() == 0 {
        return Err(refused_claim(
            session_status(pool, session_id, user_id).await?,
        ));
    }
    Ok(())
}

/// Fail unless `user_id` owns the session.
pub async fn require_owned_session(pool: &PgPool, session_id: &str, user_id: Uuid) -> Result<()> {
    match session_status(pool, session_id, user_id).await? {
        SessionStatus::Owned { .. } => Ok(()),
        SessionStatus::Missing => Err(Error::NotFound("Session not found".to_string())),
        SessionStatus::Foreign => Err(Error::Unauthorized(
            "Session belongs to another user".to_string(),
        )),
    }
}

pub async fn record_message(
    pool: &PgPool,
    session_id: &str,
    role: MessageRole,
    content: &str,
) -> Result<()> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO assistant_messages (id, session_id, role, content)
        SELECT $1::uuid, $2::text, $3::text, $4::text
        WHERE EXISTS (
            SELECT 1 FROM assistant_sessions WHERE id = $2::text AND ended_at IS NULL
        )
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(role.as_str())
    .bind(content)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(Error::Conflict(
            "This conversation has ended; start a new one".to_string(),
        ));
    }
    Ok(())
}

/// Messages of a session, oldest first.
pub async fn history(pool: &PgPool, session_id: &str) -> Result<Vec<AssistantMessage>> {
    let messages = sqlx::query_as::<_, AssistantMessage>(
        r#"
        SELECT role, content, created_at
        FROM assistant_messages
        WHERE session_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

pub async fn mark_session_ended(pool: &PgPool, session_id: &str) -> Result<()> {
    sqlx::query("UPDATE assistant_sessions SET ended_at = NOW() WHERE id = $1 AND ended_at IS NULL")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_message() {
        assert_eq!(normalize_message("  hello ").unwrap(), "hello");
        assert!(normalize_message("   ").is_err());
        assert!(normalize_message(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
        assert!(normalize_message(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn test_session_id_rules() {
        assert!(is_valid_session_id("ab"));
        assert!(is_valid_session_id("user-1:session.2_x"));
        assert!(!is_valid_session_id("a"));
        assert!(!is_valid_session_id(&"a".repeat(101)));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id("slash/id"));
    }

    #[test]
    fn test_resolve_session_id() {
        let (id, created) = resolve_session_id(None).unwrap();
        assert!(created);
        assert!(is_valid_session_id(&id));

        let (id, created) = resolve_session_id(Some("  ")).unwrap();
        assert!(created);
        assert!(Uuid::parse_str(&id).is_ok());

        let (id, created) = resolve_session_id(Some("existing-session")).unwrap();
        assert!(!created);
        assert_eq!(id, "existing-session");

        assert!(matches!(
            resolve_session_id(Some("bad id!")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_check_session() {
        assert!(check_session(SessionStatus::Missing).is_ok());
        assert!(check_session(SessionStatus::Owned { ended: false }).is_ok());
        assert!(matches!(
            check_session(SessionStatus::Owned { ended: true }),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            check_session(SessionStatus::Foreign),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_refused_claim_reasons() {
        // Another user won the race for the same id.
        assert!(matches!(
            refused_claim(SessionStatus::Foreign),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            refused_claim(SessionStatus::Owned { ended: true }),
            Error::Conflict(_)
        ));
        assert!(matches!(
            refused_claim(SessionStatus::Owned { ended: false }),
            Error::Conflict(_)
        ));
        assert!(matches!(
            refused_claim(SessionStatus::Missing),
            Error::Conflict(_)
        ));
    }

    #[test]
    fn test_decode_reply_across_chunk_boundaries() {
        let text = "Bedtime at 7:30 🌙, naps ~90 min";
        let raw = text.as_bytes();
        let moon = text.find('🌙').unwrap();

        let mut joined = Vec::new();
        for chunk in [&raw[..moon + 2], &raw[moon + 2..]] {
            assert!(std::str::from_utf8(chunk).is_err());
            joined.extend_from_slice(chunk);
        }
        assert_eq!(decode_reply(joined).unwrap(), text);

        assert!(matches!(decode_reply(b"  \n".to_vec()), Err(Error::Aws(_))));
        assert!(matches!(decode_reply(vec![0xF0, 0x9F]), Err(Error::Aws(_))));
    }

    #[test]
    fn test_agent_context() {
        let child = ChildRow {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: None,
            birth_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            allergies: vec!["Dairy".to_string()],
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let context = AgentContext::new(Uuid::nil(), today, &[child]);

        assert_eq!(context.children.len(), 1);
        assert_eq!(context.children[0].age.as_deref(), Some("2y 6m"));

        let state = context.session_state().unwrap();
        let prompt = state.prompt_session_attributes().unwrap();
        assert_eq!(prompt["currentDate"], "2026-10-17");
        assert!(prompt["children"].contains("\"allergies\":[\"Dairy\"]"));
    }
}
