//! Family membership checks.
//!
//! Every family-scoped resource (children, their events, meal plans) is reachable
//! only through a membership row in `family_members`.

use serde::Serialize;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// A member's role within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages the family, its members and children.
    Parent,
    /// Views children and logs events.
    Caregiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Caregiver => "caregiver",
        }
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Parent)
    }

    /// Fail with `Unauthorized` unless this role can manage the family.
    pub fn require_manage(&self, action: &str) -> Result<()> {
        if self.can_manage() {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!("Only parents can {}", action)))
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parent" => Ok(Role::Parent),
            "caregiver" => Ok(Role::Caregiver),
            other => Err(Error::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// Caller's standing toward one child.
#[derive(Debug, Clone, Copy)]
pub struct ChildAccess {
    pub family_id: Uuid,
    pub role: Role,
}

/// Role of `user_id` in `family_id`.
pub async fn family_role(pool: &PgPool, family_id: Uuid, user_id: Uuid) -> Result<Role> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM family_members WHERE family_id = $1 AND user_id = $2",
    )
    .bind(family_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match role {
        Some(role) => role.parse(),
        None => Err(Error::Unauthorized("Not a member of this family".to_string())),
    }
}

/// Resolve the family of `child_id` and the caller's role in it.
pub async fn child_access(pool: &PgPool, child_id: Uuid, user_id: Uuid) -> Result<ChildAccess> {
    let row: Option<(Uuid, Option<String>)> = sqlx::query_as(
        r#"
        SELECT c.family_id, fm.role
        FROM children c
        LEFT JOIN family_members fm ON fm.family_id = c.family_id AND fm.user_id = $2
        WHERE c.id = $1
        "#,
    )
    .bind(child_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        None => Err(Error::NotFound("Child not found".to_string())),
        Some((_, None)) => Err(Error::Unauthorized(
            "Not a member of this child's family".to_string(),
        )),
        Some((family_id, Some(role))) => Ok(ChildAccess {
            family_id,
            role: role.parse()?,
        }),
    }
}
