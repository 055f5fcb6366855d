//! Activity event log.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::access::Role;
use crate::http::{shift_days, DateRange, Pagination};
use crate::models::{ActivityEvent, CreateEventRequest, EventCategory, EventRow, UpdateEventRequest};
use crate::{Error, Result};

/// Tolerated clock skew for client-supplied timestamps.
pub const MAX_FUTURE_SKEW_MINUTES: i64 = 5;

const EVENT_COLUMNS: &str = "e.id, e.child_id, e.category, e.title, e.notes, e.occurred_at, \
     e.duration_minutes, e.logged_by, e.created_at";

/// Resolve when an event happened, rejecting timestamps too far ahead of `now`.
pub fn resolve_occurred_at(
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    match requested {
        None => Ok(now),
        Some(at) if at > now + Duration::minutes(MAX_FUTURE_SKEW_MINUTES) => Err(
            Error::Validation("Events cannot be logged in the future".to_string()),
        ),
        Some(at) => Ok(at),
    }
}

/// Parents may change any event; caregivers only the ones they logged.
pub fn can_modify(role: Role, event: &ActivityEvent, user_id: Uuid) -> bool {
    role.can_manage() || event.logged_by == user_id
}

/// UTC instants bounding an inclusive date range.
pub fn range_bounds(range: &DateRange) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = range.from.and_time(NaiveTime::MIN).and_utc();
    let end = shift_days(range.to, 1)?.and_time(NaiveTime::MIN).and_utc();
    Ok((start, end))
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<ActivityEvent>> {
    rows.into_iter().map(ActivityEvent::try_from).collect()
}

pub async fn log_event(
    pool: &PgPool,
    child_id: Uuid,
    logged_by: Uuid,
    request: &CreateEventRequest,
) -> Result<ActivityEvent> {
    let occurred_at = resolve_occurred_at(request.occurred_at, Utc::now())?;

    let row = sqlx::query_as::<_, EventRow>(&format!(
        r#"
        INSERT INTO activity_events AS e
            (id, child_id, category, title, notes, occurred_at, duration_minutes, logged_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(child_id)
    .bind(request.category.as_str())
    .bind(request.title.trim())
    .bind(request.notes.as_deref().map(str::trim))
    .bind(occurred_at)
    .bind(request.duration_minutes)
    .bind(logged_by)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

pub async fn get(pool: &PgPool, event_id: Uuid) -> Result<ActivityEvent> {
    sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {} FROM activity_events e WHERE e.id = $1",
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Event not found".to_string()))?
    .try_into()
}

/// Events of one child, newest first, optionally bounded by inclusive dates.
pub async fn list_for_child(
    pool: &PgPool,
    child_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    category: Option<EventCategory>,
    page: Pagination,
) -> Result<Vec<ActivityEvent>> {
    if let (Some(from), Some(to)) = (from, to) {
        DateRange::new(from, to)?;
    }
    let start = from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
    let end = to
        .and_then(|d| d.succ_opt())
        .map(|d| d.and_time(NaiveTime::MIN).and_utc());

    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r#"
        SELECT {}
        FROM activity_events e
        WHERE e.child_id = $1
          AND ($2::timestamptz IS NULL OR e.occurred_at >= $2)
          AND ($3::timestamptz IS NULL OR e.occurred_at < $3)
          AND ($4::text IS NULL OR e.category = $4)
        ORDER BY e.occurred_at DESC
        LIMIT $5 OFFSET $6
        "#,
        EVENT_COLUMNS
    ))
    .bind(child_id)
    .bind(start)
    .bind(end)
    .bind(category.map(|c| c.as_str()))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    into_events(rows)
}

/// Every event of one child in the range, oldest first (reports).
pub async fn all_for_child_range(
    pool: &PgPool,
    child_id: Uuid,
    range: &DateRange,
) -> Result<Vec<ActivityEvent>> {
    let (start, end) = range_bounds(range)?;

    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r#"
        SELECT {}
        FROM activity_events e
        WHERE e.child_id = $1 AND e.occurred_at >= $2 AND e.occurred_at < $3
        ORDER BY e.occurred_at ASC
        "#,
        EVENT_COLUMNS
    ))
    .bind(child_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    into_events(rows)
}

/// Events of all children in a family within the range (calendar).
pub async fn list_for_family_range(
    pool: &PgPool,
    family_id: Uuid,
    range: &DateRange,
) -> Result<Vec<ActivityEvent>> {
    let (start, end) = range_bounds(range)?;

    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r#"
        SELECT {}
        FROM activity_events e
        JOIN children c ON c.id = e.child_id
        WHERE c.family_id = $1 AND e.occurred_at >= $2 AND e.occurred_at < $3
        ORDER BY e.occurred_at ASC
        "#,
        EVENT_COLUMNS
    ))
    .bind(family_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    into_events(rows)
}

pub async fn update(
    pool: &PgPool,
    event_id: Uuid,
    request: &UpdateEventRequest,
) -> Result<ActivityEvent> {
    if let Some(at) = request.occurred_at {
        resolve_occurred_at(Some(at), Utc::now())?;
    }

    sqlx::query_as::<_, EventRow>(&format!(
        r#"
        UPDATE activity_events AS e SET
            category = COALESCE($2, e.category),
            title = COALESCE($3, e.title),
            notes = COALESCE($4, e.notes),
            occurred_at = COALESCE($5, e.occurred_at),
            duration_minutes = COALESCE($6, e.duration_minutes)
        WHERE e.id = $1
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .bind(request.category.map(|c| c.as_str()))
    .bind(request.title.as_deref().map(str::trim))
    .bind(request.notes.as_deref().map(str::trim))
    .bind(request.occurred_at)
    .bind(request.duration_minutes)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Event not found".to_string()))?
    .try_into()
}

pub async fn delete(pool: &PgPool, event_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM activity_events WHERE id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("Event not found".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(logged_by: Uuid) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            category: EventCategory::Sleep,
            title: "Nap".to_string(),
            notes: None,
            occurred_at: Utc::now(),
            duration_minutes: Some(45),
            logged_by,
        }
    }

    #[test]
    fn test_resolve_occurred_at() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(resolve_occurred_at(None, now).unwrap(), now);

        let earlier = now - Duration::hours(3);
        assert_eq!(resolve_occurred_at(Some(earlier), now).unwrap(), earlier);

        let skewed = now + Duration::minutes(2);
        assert!(resolve_occurred_at(Some(skewed), now).is_ok());

        let future = now + Duration::hours(1);
        assert!(matches!(
            resolve_occurred_at(Some(future), now),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_can_modify() {
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();
        let e = event(author);
        assert!(can_modify(Role::Caregiver, &e, author));
        assert!(!can_modify(Role::Caregiver, &e, other));
        assert!(can_modify(Role::Parent, &e, other));
    }

    #[test]
    fn test_range_bounds_cover_whole_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        )
        .unwrap();
        let (start, end) = range_bounds(&range).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_range_bounds_at_last_date_is_rejected() {
        let range = DateRange::new(NaiveDate::MAX, NaiveDate::MAX).unwrap();
        assert!(matches!(range_bounds(&range), Err(Error::Validation(_))));
    }
}
