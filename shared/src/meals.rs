//! Meal planner: storage plus week grouping and week copying.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::http::{shift_days, DateRange};
use crate::models::{CreateMealRequest, MealPlanEntry, MealRow, UpdateMealRequest};
use crate::{Error, Result};

const MEAL_COLUMNS: &str =
    "m.id, m.family_id, m.child_id, m.plan_date, m.meal_type, m.title, m.notes, m.created_by";

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> Result<NaiveDate> {
    shift_days(date, -(date.weekday().num_days_from_monday() as i64))
}

/// Seven days starting at the Monday of `date`'s week.
pub fn week_range(date: NaiveDate) -> Result<DateRange> {
    let start = week_start(date)?;
    Ok(DateRange {
        from: start,
        to: shift_days(start, 6)?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub date: NaiveDate,
    pub weekday: String,
    pub meals: Vec<MealPlanEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlan {
    pub week_start: NaiveDate,
    pub days: Vec<DayPlan>,
}

impl WeekPlan {
    /// Group entries into the seven days of the week containing `any_day`.
    ///
    /// Entries outside that week are ignored. Within a day meals are ordered by
    /// slot, then title.
    pub fn build(any_day: NaiveDate, entries: Vec<MealPlanEntry>) -> Result<Self> {
        let range = week_range(any_day)?;
        let mut days: Vec<DayPlan> = range
            .iter_days()
            .map(|date| DayPlan {
                date,
                weekday: date.weekday().to_string(),
                meals: Vec::new(),
            })
            .collect();

        for entry in entries {
            if !range.contains(entry.plan_date) {
                continue;
            }
            let index = (entry.plan_date - range.from).num_days() as usize;
            days[index].meals.push(entry);
        }

        for day in &mut days {
            day.meals
                .sort_by(|a, b| a.meal_type.cmp(&b.meal_type).then_with(|| a.title.cmp(&b.title)));
        }

        Ok(Self {
            week_start: range.from,
            days,
        })
    }
}

/// Entries from the week of `from_week` shifted onto the week of `to_week`.
///
/// Weekday, slot, child and text are preserved; ids are left to the caller.
pub fn copy_week(
    entries: &[MealPlanEntry],
    from_week: NaiveDate,
    to_week: NaiveDate,
) -> Result<Vec<MealPlanEntry>> {
    let source = week_range(from_week)?;
    let target = week_range(to_week)?;
    let shift = (target.from - source.from).num_days();
    if shift == 0 {
        return Err(Error::Validation(
            "Source and target weeks are the same".to_string(),
        ));
    }

    entries
        .iter()
        .filter(|e| source.contains(e.plan_date))
        .map(|e| {
            Ok(MealPlanEntry {
                plan_date: shift_days(e.plan_date, shift)?,
                ..e.clone()
            })
        })
        .collect()
}

fn into_entries(rows: Vec<MealRow>) -> Result<Vec<MealPlanEntry>> {
    rows.into_iter().map(MealPlanEntry::try_from).collect()
}

pub async fn create(
    pool: &PgPool,
    family_id: Uuid,
    created_by: Uuid,
    request: &CreateMealRequest,
) -> Result<MealPlanEntry> {
    if let Some(child_id) = request.child_id {
        ensure_child_in_family(pool, child_id, family_id).await?;
    }

    sqlx::query_as::<_, MealRow>(&format!(
        r#"
        INSERT INTO meal_plan_entries AS m
            (id, family_id, child_id, plan_date, meal_type, title, notes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        MEAL_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(family_id)
    .bind(request.child_id)
    .bind(request.plan_date)
    .bind(request.meal_type.as_str())
    .bind(request.title.trim())
    .bind(request.notes.as_deref().map(str::trim))
    .bind(created_by)
    .fetch_one(pool)
    .await?
    .try_into()
}

async fn ensure_child_in_family(pool: &PgPool, child_id: Uuid, family_id: Uuid) -> Result<()> {
    let belongs: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM children WHERE id = $1 AND family_id = $2)",
    )
    .bind(child_id)
    .bind(family_id)
    .fetch_one(pool)
    .await?;

    if !belongs {
        return Err(Error::Validation(
            "Child does not belong to this family".to_string(),
        ));
    }
    Ok(())
}

pub async fn get(pool: &PgPool, meal_id: Uuid) -> Result<MealPlanEntry> {
    sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {} FROM meal_plan_entries m WHERE m.id = $1",
        MEAL_COLUMNS
    ))
    .bind(meal_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Meal not found".to_string()))?
    .try_into()
}

/// Planned meals in the range; with `child_id`, family-wide meals plus that child's.
pub async fn list_for_family(
    pool: &PgPool,
    family_id: Uuid,
    range: &DateRange,
    child_id: Option<Uuid>,
) -> Result<Vec<MealPlanEntry>> {
    let rows = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        SELECT {}
        FROM meal_plan_entries m
        WHERE m.family_id = $1
          AND m.plan_date BETWEEN $2 AND $3
          AND ($4::uuid IS NULL OR m.child_id IS NULL OR m.child_id = $4)
        ORDER BY m.plan_date, m.title
        "#,
        MEAL_COLUMNS
    ))
    .bind(family_id)
    .bind(range.from)
    .bind(range.to)
    .bind(child_id)
    .fetch_all(pool)
    .await?;

    into_entries(rows)
}

pub async fn update(pool: &PgPool, meal_id: Uuid, request: &UpdateMealRequest) -> Result<MealPlanEntry> {
    sqlx::query_as::<_, MealRow>(&format!(
        r#"
        UPDATE meal_plan_entries AS m SET
            plan_date = COALESCE($2, m.plan_date),
            meal_type = COALESCE($3, m.meal_type),
            title = COALESCE($4, m.title),
            notes = COALESCE($5, m.notes)
        WHERE m.id = $1
        RETURNING {}
        "#,
        MEAL_COLUMNS
    ))
    .bind(meal_id)
    .bind(request.plan_date)
    .bind(request.meal_type.map(|t| t.as_str()))
    .bind(request.title.as_deref().map(str::trim))
    .bind(request.notes.as_deref().map(str::trim))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound("Meal not found".to_string()))?
    .try_into()
}

pub async fn delete(pool: &PgPool, meal_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM meal_plan_entries WHERE id = $1")
        .bind(meal_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("Meal not found".to_string()));
    }
    Ok(())
}

/// Copy one week's plan onto another inside a transaction.
///
/// Entries already present in the target week (same date, slot, child and title)
/// are skipped. Returns the number of inserted entries.
pub async fn copy_week_plan(
    pool: &PgPool,
    family_id: Uuid,
    created_by: Uuid,
    from_week: NaiveDate,
    to_week: NaiveDate,
) -> Result<u64> {
    let source = list_for_family(pool, family_id, &week_range(from_week)?, None).await?;
    let copies = copy_week(&source, from_week, to_week)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for entry in &copies {
        let result = sqlx::query(
            r#"
            INSERT INTO meal_plan_entries
                (id, family_id, child_id, plan_date, meal_type, title, notes, created_by)
            SELECT $1::uuid, $2::uuid, $3::uuid, $4::date, $5::text, $6::text, $7::text, $8::uuid
            WHERE NOT EXISTS (
                SELECT 1 FROM meal_plan_entries
                WHERE family_id = $2
                  AND child_id IS NOT DISTINCT FROM $3
                  AND plan_date = $4
                  AND meal_type = $5
                  AND title = $6
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(family_id)
        .bind(entry.child_id)
        .bind(entry.plan_date)
        .bind(entry.meal_type.as_str())
        .bind(&entry.title)
        .bind(&entry.notes)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;

    info!(
        family_id = %family_id,
        from_week = %from_week,
        to_week = %to_week,
        inserted,
        "Copied meal plan week"
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CopyWeekRequest, MealType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(plan_date: NaiveDate, meal_type: MealType, title: &str) -> MealPlanEntry {
        MealPlanEntry {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            child_id: None,
            plan_date,
            meal_type,
            title: title.to_string(),
            notes: None,
            created_by: Uuid::nil(),
        }
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2026-10-17 is a Saturday
        assert_eq!(week_start(date(2026, 10, 17)).unwrap(), date(2026, 10, 12));
        assert_eq!(week_start(date(2026, 10, 12)).unwrap(), date(2026, 10, 12));
        assert_eq!(week_start(date(2026, 10, 18)).unwrap(), date(2026, 10, 12));
        assert_eq!(week_range(date(2026, 10, 14)).unwrap().to, date(2026, 10, 18));
    }

    #[test]
    fn test_extreme_week_dates_are_rejected() {
        let request: CopyWeekRequest = serde_json::from_str(
            r#"{"fromWeek":"2026-10-12","toWeek":"+262142-12-31"}"#,
        )
        .unwrap();
        assert!(matches!(week_range(request.to_week), Err(Error::Validation(_))));

        let entries = vec![entry(date(2026, 10, 14), MealType::Lunch, "Soup")];
        assert!(matches!(
            copy_week(&entries, request.from_week, request.to_week),
            Err(Error::Validation(_))
        ));
        assert!(WeekPlan::build(request.to_week, Vec::new()).is_err());
    }

    #[test]
    fn test_week_plan_groups_and_orders() {
        let entries = vec![
            entry(date(2026, 10, 13), MealType::Dinner, "Tacos"),
            entry(date(2026, 10, 13), MealType::Breakfast, "Oatmeal"),
            entry(date(2026, 10, 18), MealType::Snack, "Apple"),
            entry(date(2026, 10, 20), MealType::Lunch, "Next week"),
        ];

        let plan = WeekPlan::build(date(2026, 10, 15), entries).unwrap();
        assert_eq!(plan.week_start, date(2026, 10, 12));
        assert_eq!(plan.days.len(), 7);
        assert_eq!(plan.days[0].weekday, "Mon");

        let tuesday: Vec<&str> = plan.days[1].meals.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(tuesday, vec!["Oatmeal", "Tacos"]);
        assert_eq!(plan.days[6].meals.len(), 1);
        let total: usize = plan.days.iter().map(|d| d.meals.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_copy_week_shifts_dates() {
        let entries = vec![
            entry(date(2026, 10, 12), MealType::Breakfast, "Pancakes"),
            entry(date(2026, 10, 16), MealType::Dinner, "Pizza"),
            entry(date(2026, 10, 19), MealType::Lunch, "Outside source week"),
        ];

        let copies = copy_week(&entries, date(2026, 10, 14), date(2026, 10, 28)).unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].plan_date, date(2026, 10, 26));
        assert_eq!(copies[0].meal_type, MealType::Breakfast);
        assert_eq!(copies[1].plan_date, date(2026, 10, 30));
        assert_eq!(copies[1].plan_date.weekday(), entries[1].plan_date.weekday());
    }

    #[test]
    fn test_copy_week_backwards_and_same_week() {
        let entries = vec![entry(date(2026, 10, 14), MealType::Lunch, "Soup")];
        let copies = copy_week(&entries, date(2026, 10, 14), date(2026, 10, 1)).unwrap();
        assert_eq!(copies[0].plan_date, date(2026, 9, 30));

        assert!(copy_week(&entries, date(2026, 10, 12), date(2026, 10, 18)).is_err());
    }
}
