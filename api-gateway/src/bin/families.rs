//! Family Management Lambda - Handles family CRUD and membership.
//!
//! Endpoints:
//! - POST /v1/families - Create a family (creator becomes a parent)
//! - GET /v1/families - List the caller's families
//! - GET /v1/families/{id} - Family details with members
//! - PUT /v1/families/{id} - Rename / describe (parents only)
//! - POST /v1/families/{id}/members - Add a registered user by email
//! - DELETE /v1/families/{id}/members/{user_id} - Remove a member or leave

use chrono::{DateTime, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{parse_id, path_segments, reply, respond, route_not_found, validated_body};
use shared::models::{
    CreateFamilyRequest, FamilyMemberResponse, FamilySummary, InviteMemberRequest,
    UpdateFamilyRequest,
};
use shared::{authenticated_user, family_role, AuthenticatedUser, Role};
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

#[derive(Debug, sqlx::FromRow)]
struct FamilyRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

/// Removing a parent must leave at least one parent behind.
fn check_parent_remains(removed_role: Role, parent_count: i64) -> shared::Result<()> {
    if removed_role == Role::Parent && parent_count <= 1 {
        return Err(shared::Error::Conflict(
            "A family needs at least one parent".to_string(),
        ));
    }
    Ok(())
}

/// Trimmed name and description as stored; a blank description is dropped.
fn normalized_family(request: &CreateFamilyRequest) -> shared::Result<(String, Option<String>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(shared::Error::Validation("name cannot be blank".to_string()));
    }
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from);
    Ok((name.to_string(), description))
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    respond(route(&state, &event).await)
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let user = authenticated_user(event)?;
    let segments = path_segments(event.uri().path(), "/v1/families").ok_or_else(route_not_found)?;

    match (event.method().as_str(), segments.as_slice()) {
        ("POST", []) => create_family(state, event, &user).await,

        ("GET", []) => {
            let families = sqlx::query_as::<_, FamilySummary>(
                r#"
                SELECT f.id, f.name, f.description, fm.role,
                       (SELECT COUNT(*) FROM family_members m WHERE m.family_id = f.id) AS member_count,
                       (SELECT COUNT(*) FROM children c WHERE c.family_id = f.id) AS child_count
                FROM families f
                JOIN family_members fm ON fm.family_id = f.id
                WHERE fm.user_id = $1
                ORDER BY f.name
                "#,
            )
            .bind(user.user_id)
            .fetch_all(&state.db_pool)
            .await?;
            reply(200, families)
        }

        ("GET", [id]) => {
            let family_id = parse_id(id, "family")?;
            let role = family_role(&state.db_pool, family_id, user.user_id).await?;
            family_details(state, family_id, role).await
        }

        ("PUT", [id]) => {
            let family_id = parse_id(id, "family")?;
            family_role(&state.db_pool, family_id, user.user_id)
                .await?
                .require_manage("edit the family")?;

            let request: UpdateFamilyRequest = validated_body(event.body())?;
            sqlx::query(
                r#"
                UPDATE families SET
                    name = COALESCE($2, name),
                    description = COALESCE($3, description)
                WHERE id = $1
                "#,
            )
            .bind(family_id)
            .bind(request.name.as_deref().map(str::trim))
            .bind(request.description.as_deref().map(str::trim))
            .execute(&state.db_pool)
            .await?;

            info!(family_id = %family_id, user_id = %user.user_id, "Updated family");
            family_details(state, family_id, Role::Parent).await
        }

        ("POST", [id, "members"]) => {
            let family_id = parse_id(id, "family")?;
            family_role(&state.db_pool, family_id, user.user_id)
                .await?
                .require_manage("invite members")?;
            add_member(state, event, family_id).await
        }

        ("DELETE", [id, "members", member]) => {
            let family_id = parse_id(id, "family")?;
            let member_id = parse_id(member, "user")?;
            remove_member(state, &user, family_id, member_id).await
        }

        _ => Err(route_not_found()),
    }
}

async fn create_family(
    state: &AppState,
    event: &Request,
    user: &AuthenticatedUser,
) -> shared::Result<Response<Body>> {
    let request: CreateFamilyRequest = validated_body(event.body())?;
    let (name, description) = normalized_family(&request)?;
    let family_id = Uuid::new_v4();

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        "INSERT INTO families (id, name, description, created_by) VALUES ($1, $2, $3, $4)",
    )
    .bind(family_id)
    .bind(&name)
    .bind(&description)
    .bind(user.user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO family_members (family_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(family_id)
        .bind(user.user_id)
        .bind(Role::Parent.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(family_id = %family_id, user_id = %user.user_id, "Created family");

    reply(
        201,
        FamilySummary {
            id: family_id,
            name,
            description,
            role: Role::Parent.as_str().to_string(),
            member_count: 1,
            child_count: 0,
        },
    )
}

async fn family_details(
    state: &AppState,
    family_id: Uuid,
    role: Role,
) -> shared::Result<Response<Body>> {
    let family = sqlx::query_as::<_, FamilyRow>(
        "SELECT id, name, description, created_by, created_at FROM families WHERE id = $1",
    )
    .bind(family_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| shared::Error::NotFound("Family not found".to_string()))?;

    let members = sqlx::query_as::<_, FamilyMemberResponse>(
        r#"
        SELECT u.id AS user_id, u.email, u.display_name, fm.role, fm.joined_at
        FROM family_members fm
        JOIN users u ON u.id = fm.user_id
        WHERE fm.family_id = $1
        ORDER BY fm.role DESC, fm.joined_at
        "#,
    )
    .bind(family_id)
    .fetch_all(&state.db_pool)
    .await?;

    reply(
        200,
        serde_json::json!({
            "id": family.id,
            "name": family.name,
            "description": family.description,
            "createdBy": family.created_by,
            "createdAt": family.created_at,
            "role": role.as_str(),
            "members": members,
        }),
    )
}

async fn add_member(
    state: &AppState,
    event: &Request,
    family_id: Uuid,
) -> shared::Result<Response<Body>> {
    let request: InviteMemberRequest = validated_body(event.body())?;
    let role: Role = request.role.as_deref().unwrap_or("caregiver").parse()?;

    let invitee: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = lower($1)")
        .bind(request.email.trim())
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| shared::Error::NotFound("No user with that email".to_string()))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO family_members (family_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (family_id, user_id) DO NOTHING
        "#,
    )
    .bind(family_id)
    .bind(invitee)
    .bind(role.as_str())
    .execute(&state.db_pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(shared::Error::Conflict(
            "User is already a member of this family".to_string(),
        ));
    }

    info!(family_id = %family_id, member_id = %invitee, role = role.as_str(), "Added family member");

    reply(
        201,
        serde_json::json!({ "userId": invitee, "role": role.as_str() }),
    )
}

async fn remove_member(
    state: &AppState,
    user: &AuthenticatedUser,
    family_id: Uuid,
    member_id: Uuid,
) -> shared::Result<Response<Body>> {
    let caller_role = family_role(&state.db_pool, family_id, user.user_id).await?;
    if member_id != user.user_id {
        caller_role.require_manage("remove members")?;
    }

    let mut tx = state.db_pool.begin().await?;

    // Lock the family's membership rows so two parents cannot leave at once.
    let roles: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT user_id, role FROM family_members WHERE family_id = $1 FOR UPDATE",
    )
    .bind(family_id)
    .fetch_all(&mut *tx)
    .await?;

    let removed_role: Role = roles
        .iter()
        .find(|(id, _)| *id == member_id)
        .ok_or_else(|| shared::Error::NotFound("Member not found".to_string()))?
        .1
        .parse()?;
    let parent_count = roles
        .iter()
        .filter(|(_, role)| role == Role::Parent.as_str())
        .count() as i64;
    check_parent_remains(removed_role, parent_count)?;

    sqlx::query("DELETE FROM family_members WHERE family_id = $1 AND user_id = $2")
        .bind(family_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        family_id = %family_id,
        member_id = %member_id,
        removed_by = %user.user_id,
        "Removed family member"
    );
    reply(200, serde_json::json!({ "message": "Member removed" }))
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

    #[test]
    fn test_created_family_is_trimmed() {
        let request: CreateFamilyRequest = serde_json::from_value(serde_json::json!({
            "name": "  The Smiths ",
            "description": "  Weekday routine  "
        }))
        .unwrap();
        let (name, description) = normalized_family(&request).unwrap();
        assert_eq!(name, "The Smiths");
        assert_eq!(description.as_deref(), Some("Weekday routine"));

        let blank: CreateFamilyRequest =
            serde_json::from_value(serde_json::json!({ "name": "Smiths", "description": "   " }))
                .unwrap();
        assert_eq!(normalized_family(&blank).unwrap().1, None);

        let unnamed: CreateFamilyRequest =
            serde_json::from_value(serde_json::json!({ "name": "   " })).unwrap();
        assert!(matches!(
            normalized_family(&unnamed),
            Err(shared::Error::Validation(_))
        ));
    }

    #[test]
    fn test_last_parent_cannot_leave() {
        assert!(matches!(
            check_parent_remains(Role::Parent, 1),
            Err(shared::Error::Conflict(_))
        ));
        assert!(check_parent_remains(Role::Parent, 2).is_ok());
        assert!(check_parent_remains(Role::Caregiver, 1).is_ok());
    }
}
