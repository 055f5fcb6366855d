//! Calendar view: logged events and planned meals laid out per day.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::http::DateRange;
use crate::models::{ActivityEvent, EventCategory, MealPlanEntry, MealType};
use crate::{Error, Result};

/// Longest range a single calendar request may cover.
pub const MAX_CALENDAR_DAYS: i64 = 92;

/// First and last day of a `YYYY-MM` month.
pub fn month_range(month: &str) -> Result<DateRange> {
    let invalid = || Error::Validation(format!("Invalid month '{}', expected YYYY-MM", month));

    let (year, month_num) = month.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month_num: u32 = month_num.parse().map_err(|_| invalid())?;

    let first = NaiveDate::from_ymd_opt(year, month_num, 1).ok_or_else(invalid)?;
    let next = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .ok_or_else(invalid)?;

    DateRange::new(first, next.pred_opt().ok_or_else(invalid)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: Uuid,
    pub child_id: Uuid,
    pub child_name: Option<String>,
    pub category: EventCategory,
    pub title: String,
    pub time: String,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMeal {
    pub id: Uuid,
    pub meal_type: MealType,
    pub title: String,
    pub child_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_weekend: bool,
    pub event_counts: BTreeMap<EventCategory, usize>,
    pub events: Vec<CalendarEvent>,
    pub meals: Vec<CalendarMeal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_events: usize,
    pub days: Vec<CalendarDay>,
}

/// Lay out events and meals over every date of `range`, empty days included.
///
/// Events are bucketed by their UTC date; items outside the range are dropped.
/// `child_names` labels events with the child's display name when known.
pub fn build_calendar(
    range: &DateRange,
    events: &[ActivityEvent],
    meals: &[MealPlanEntry],
    child_names: &BTreeMap<Uuid, String>,
) -> Result<CalendarView> {
    range.ensure_max_days(MAX_CALENDAR_DAYS)?;

    let mut days: Vec<CalendarDay> = range
        .iter_days()
        .map(|date| CalendarDay {
            date,
            is_weekend: date.weekday().number_from_monday() >= 6,
            event_counts: BTreeMap::new(),
            events: Vec::new(),
            meals: Vec::new(),
        })
        .collect();

    let index_of = |date: NaiveDate| -> Option<usize> {
        range
            .contains(date)
            .then(|| (date - range.from).num_days() as usize)
    };

    let mut sorted: Vec<&ActivityEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.occurred_at);

    let mut total_events = 0;
    for event in sorted {
        let Some(index) = index_of(event.occurred_at.date_naive()) else {
            continue;
        };
        let day = &mut days[index];
        *day.event_counts.entry(event.category).or_insert(0) += 1;
        day.events.push(CalendarEvent {
            id: event.id,
            child_id: event.child_id,
            child_name: child_names.get(&event.child_id).cloned(),
            category: event.category,
            title: event.title.clone(),
            time: event.occurred_at.format("%H:%M").to_string(),
            duration_minutes: event.duration_minutes,
        });
        total_events += 1;
    }

    for meal in meals {
        let Some(index) = index_of(meal.plan_date) else {
            continue;
        };
        days[index].meals.push(CalendarMeal {
            id: meal.id,
            meal_type: meal.meal_type,
            title: meal.title.clone(),
            child_id: meal.child_id,
        });
    }
    for day in &mut days {
        day.meals.sort_by_key(|m| m.meal_type);
    }

    Ok(CalendarView {
        from: range.from,
        to: range.to,
        total_events,
        days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(child_id: Uuid, day: u32, hour: u32, category: EventCategory) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            child_id,
            category,
            title: format!("{} at {}", category, hour),
            notes: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap(),
            duration_minutes: None,
            logged_by: Uuid::nil(),
        }
    }

    fn meal(plan_date: NaiveDate, meal_type: MealType) -> MealPlanEntry {
        MealPlanEntry {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            child_id: None,
            plan_date,
            meal_type,
            title: meal_type.to_string(),
            notes: None,
            created_by: Uuid::nil(),
        }
    }

    #[test]
    fn test_month_range() {
        let range = month_range("2026-02").unwrap();
        assert_eq!(range.from, date(2026, 2, 1));
        assert_eq!(range.to, date(2026, 2, 28));

        let range = month_range("2024-12").unwrap();
        assert_eq!(range.to, date(2024, 12, 31));

        assert!(month_range("2026-13").is_err());
        assert!(month_range("October").is_err());
    }

    #[test]
    fn test_every_day_present_once() {
        let range = month_range("2026-10").unwrap();
        let view = build_calendar(&range, &[], &[], &BTreeMap::new()).unwrap();
        assert_eq!(view.days.len(), 31);
        assert!(view
            .days
            .windows(2)
            .all(|w| w[1].date == w[0].date + Duration::days(1)));
        // 2026-10-17 is a Saturday
        assert!(view.days[16].is_weekend);
        assert!(!view.days[14].is_weekend);
    }

    #[test]
    fn test_events_and_meals_bucketed() {
        let child = Uuid::new_v4();
        let mut names = BTreeMap::new();
        names.insert(child, "Ada".to_string());

        let events = vec![
            event(child, 5, 15, EventCategory::Sleep),
            event(child, 5, 8, EventCategory::Meal),
            event(child, 5, 12, EventCategory::Meal),
            event(child, 6, 9, EventCategory::Activity),
        ];
        let meals = vec![
            meal(date(2026, 10, 5), MealType::Dinner),
            meal(date(2026, 10, 5), MealType::Breakfast),
            meal(date(2026, 11, 1), MealType::Lunch),
        ];

        let range = DateRange::new(date(2026, 10, 5), date(2026, 10, 11)).unwrap();
        let view = build_calendar(&range, &events, &meals, &names).unwrap();

        assert_eq!(view.total_events, 4);
        let monday = &view.days[0];
        assert_eq!(monday.events.len(), 3);
        assert_eq!(monday.events[0].time, "08:00");
        assert_eq!(monday.events[0].child_name.as_deref(), Some("Ada"));
        assert_eq!(monday.event_counts[&EventCategory::Meal], 2);
        assert_eq!(monday.meals[0].meal_type, MealType::Breakfast);
        assert_eq!(view.days[1].events.len(), 1);
        let meal_total: usize = view.days.iter().map(|d| d.meals.len()).sum();
        assert_eq!(meal_total, 2);
    }

    #[test]
    fn test_range_limit() {
        let range = DateRange::new(date(2026, 1, 1), date(2026, 6, 30)).unwrap();
        assert!(build_calendar(&range, &[], &[], &BTreeMap::new()).is_err());
    }
}
