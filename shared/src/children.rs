//! Child profile storage.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ChildRow, CreateChildRequest, UpdateChildRequest};
use crate::{Error, Result};

const CHILD_COLUMNS: &str = "c.id, c.family_id, c.first_name, c.last_name, c.birth_date, \
     c.allergies, c.notes, c.created_at, c.updated_at";

/// Trim, drop empty entries and remove case-insensitive duplicates, keeping first spelling.
pub fn normalize_allergies(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Reject birth dates after `today`.
pub fn check_birth_date(birth_date: Option<NaiveDate>, today: NaiveDate) -> Result<()> {
    match birth_date {
        Some(date) if date > today => Err(Error::Validation(
            "Birth date cannot be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Optional text field of a partial update.
///
/// Returns whether the field was sent and its trimmed value; a blank value clears it.
fn clearable(value: Option<&str>) -> (bool, Option<String>) {
    (value.is_some(), trimmed(value))
}

pub async fn create(pool: &PgPool, request: &CreateChildRequest) -> Result<ChildRow> {
    let allergies = normalize_allergies(request.allergies.as_deref().unwrap_or_default());

    let child = sqlx::query_as::<_, ChildRow>(&format!(
        r#"
        INSERT INTO children AS c (id, family_id, first_name, last_name, birth_date, allergies, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        CHILD_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.family_id)
    .bind(request.first_name.trim())
    .bind(trimmed(request.last_name.as_deref()))
    .bind(request.birth_date)
    .bind(&allergies)
    .bind(trimmed(request.notes.as_deref()))
    .fetch_one(pool)
    .await?;

    Ok(child)
}

pub async fn get(pool: &PgPool, child_id: Uuid) -> Result<ChildRow> {
    sqlx::query_as::<_, ChildRow>(&format!(
        "SELECT {} FROM children c WHERE c.id = $1",
        CHILD_COLUMNS
    ))
    .bind(child_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Child not found".to_string()))
}

/// Children in every family the user belongs to, optionally narrowed to one family.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    family_id: Option<Uuid>,
) -> Result<Vec<ChildRow>> {
    let children = sqlx::query_as::<_, ChildRow>(&format!(
        r#"
        SELECT {}
        FROM children c
        JOIN family_members fm ON fm.family_id = c.family_id
        WHERE fm.user_id = $1
          AND ($2::uuid IS NULL OR c.family_id = $2)
        ORDER BY c.birth_date ASC NULLS LAST, c.first_name
        "#,
        CHILD_COLUMNS
    ))
    .bind(user_id)
    .bind(family_id)
    .fetch_all(pool)
    .await?;

    Ok(children)
}

/// Apply a partial update; absent fields keep their stored value and blank
/// `lastName`/`notes` clear it.
pub async fn update(pool: &PgPool, child_id: Uuid, request: &UpdateChildRequest) -> Result<ChildRow> {
    let first_name = match request.first_name.as_deref() {
        Some(name) => Some(
            trimmed(Some(name))
                .ok_or_else(|| Error::Validation("firstName cannot be blank".to_string()))?,
        ),
        None => None,
    };
    let (last_name_sent, last_name) = clearable(request.last_name.as_deref());
    let (notes_sent, notes) = clearable(request.notes.as_deref());
    let allergies = request
        .allergies
        .as_deref()
        .map(normalize_allergies);

    sqlx::query_as::<_, ChildRow>(&format!(
        r#"
        UPDATE children AS c SET
            first_name = COALESCE($2, c.first_name),
            last_name = CASE WHEN $3 THEN $4 ELSE c.last_name END,
            birth_date = COALESCE($5, c.birth_date),
            allergies = COALESCE($6, c.allergies),
            notes = CASE WHEN $7 THEN $8 ELSE c.notes END,
            updated_at = NOW()
        WHERE c.id = $1
        RETURNING {}
        "#,
        CHILD_COLUMNS
    ))
    .bind(child_id)
    .bind(first_name)
    .bind(last_name_sent)
    .bind(last_name)
    .bind(request.birth_date)
    .bind(allergies)
    .bind(notes_sent)
    .bind(notes)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Child not found".to_string()))
}

/// Delete a child; events cascade in the schema.
pub async fn delete(pool: &PgPool, child_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM children WHERE id = $1")
        .bind(child_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("Child not found".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_allergies() {
        let raw = vec![
            " Peanuts ".to_string(),
            "".to_string(),
            "peanuts".to_string(),
            "Dairy".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(normalize_allergies(&raw), vec!["Peanuts", "Dairy"]);
    }

    #[test]
    fn test_birth_date_in_future() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(check_birth_date(None, today).is_ok());
        assert!(check_birth_date(Some(today), today).is_ok());
        assert!(check_birth_date(today.succ_opt(), today).is_err());
    }

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(Some("  hi ")), Some("hi".to_string()));
        assert_eq!(trimmed(Some("   ")), None);
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_clearable_distinguishes_blank_from_absent() {
        assert_eq!(clearable(None), (false, None));
        assert_eq!(clearable(Some("   ")), (true, None));
        assert_eq!(clearable(Some(" Lovelace ")), (true, Some("Lovelace".to_string())));
    }
}
