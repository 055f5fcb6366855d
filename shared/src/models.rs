//! Shared data models.
//!
//! Rows are read with `sqlx::FromRow`; enumerations are stored as text and
//! converted through `FromStr`/`as_str`. API payloads use camelCase.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::Error;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants in display order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "Unknown {} '{}'", $what, other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Kind of a logged activity.
    EventCategory, "event category" {
        Meal => "meal",
        Sleep => "sleep",
        Activity => "activity",
        Health => "health",
        Milestone => "milestone",
        Behavior => "behavior",
        Note => "note",
    }
);

text_enum!(
    /// Slot of a planned meal; variant order is the order within a day.
    MealType, "meal type" {
        Breakfast => "breakfast",
        Lunch => "lunch",
        Dinner => "dinner",
        Snack => "snack",
    }
);

text_enum!(
    /// Author of an assistant conversation turn.
    MessageRole, "message role" {
        User => "user",
        Assistant => "assistant",
    }
);

// ---------------------------------------------------------------------------
// Users and families
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub settings: serde_json::Value,
    pub created_at: String,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            settings: row.settings,
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
    /// Merged into the stored settings object.
    pub settings: Option<serde_json::Value>,
}

/// Default settings for a newly provisioned user.
pub fn default_user_settings() -> serde_json::Value {
    serde_json::json!({
        "timezone": "America/New_York",
        "weekStartsOn": "monday",
        "defaultReportFormat": "pdf",
        "assistantEnabled": true,
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFamilyRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InviteMemberRequest {
    #[validate(email)]
    pub email: String,
    /// "parent" or "caregiver"; defaults to caregiver.
    pub role: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilySummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: String,
    pub member_count: i64,
    pub child_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMemberResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChildRow {
    pub id: Uuid,
    pub family_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub allergies: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Age split into whole years and remaining months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Age {
    pub years: u32,
    pub months: u32,
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.years, self.months) {
            (0, m) => write!(f, "{} month{}", m, if m == 1 { "" } else { "s" }),
            (y, 0) => write!(f, "{} year{}", y, if y == 1 { "" } else { "s" }),
            (y, m) => write!(f, "{}y {}m", y, m),
        }
    }
}

impl ChildRow {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    /// Age on `date`; `None` without a birth date or when `date` precedes it.
    pub fn age_on(&self, date: NaiveDate) -> Option<Age> {
        let birth = self.birth_date?;
        if date < birth {
            return None;
        }
        let mut months = (date.year() - birth.year()) * 12 + date.month() as i32
            - birth.month() as i32;
        if date.day() < birth.day() {
            months -= 1;
        }
        let months = months.max(0) as u32;
        Some(Age {
            years: months / 12,
            months: months % 12,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildResponse {
    pub id: Uuid,
    pub family_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub display_name: String,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<Age>,
    pub allergies: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChildResponse {
    pub fn from_row(row: ChildRow, today: NaiveDate) -> Self {
        Self {
            display_name: row.display_name(),
            age: row.age_on(today),
            id: row.id,
            family_id: row.family_id,
            first_name: row.first_name,
            last_name: row.last_name,
            birth_date: row.birth_date,
            allergies: row.allergies,
            notes: row.notes,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildRequest {
    pub family_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub allergies: Option<Vec<String>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChildRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub allergies: Option<Vec<String>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub child_id: Uuid,
    pub category: String,
    pub title: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub logged_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A logged activity with its category parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub child_id: Uuid,
    pub category: EventCategory,
    pub title: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub logged_by: Uuid,
}

impl TryFrom<EventRow> for ActivityEvent {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self, Error> {
        Ok(Self {
            category: row.category.parse()?,
            id: row.id,
            child_id: row.child_id,
            title: row.title,
            notes: row.notes,
            occurred_at: row.occurred_at,
            duration_minutes: row.duration_minutes,
            logged_by: row.logged_by,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: Uuid,
    pub child_id: Uuid,
    pub category: EventCategory,
    pub title: String,
    pub notes: Option<String>,
    pub occurred_at: String,
    pub duration_minutes: Option<i32>,
    pub logged_by: Uuid,
}

impl From<ActivityEvent> for EventResponse {
    fn from(event: ActivityEvent) -> Self {
        Self {
            id: event.id,
            child_id: event.child_id,
            category: event.category,
            title: event.title,
            notes: event.notes,
            occurred_at: event.occurred_at.to_rfc3339(),
            duration_minutes: event.duration_minutes,
            logged_by: event.logged_by,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub category: EventCategory,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    /// Defaults to the time of logging.
    pub occurred_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 1440))]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub category: Option<EventCategory>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 1440))]
    pub duration_minutes: Option<i32>,
}

// ---------------------------------------------------------------------------
// Meal planner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub family_id: Uuid,
    pub child_id: Option<Uuid>,
    pub plan_date: NaiveDate,
    pub meal_type: String,
    pub title: String,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanEntry {
    pub id: Uuid,
    pub family_id: Uuid,
    pub child_id: Option<Uuid>,
    pub plan_date: NaiveDate,
    pub meal_type: MealType,
    pub title: String,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

impl TryFrom<MealRow> for MealPlanEntry {
    type Error = Error;

    fn try_from(row: MealRow) -> Result<Self, Error> {
        Ok(Self {
            meal_type: row.meal_type.parse()?,
            id: row.id,
            family_id: row.family_id,
            child_id: row.child_id,
            plan_date: row.plan_date,
            title: row.title,
            notes: row.notes,
            created_by: row.created_by,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMealRequest {
    pub plan_date: NaiveDate,
    pub meal_type: MealType,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    /// Plan the meal for one child instead of the whole family.
    pub child_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMealRequest {
    pub plan_date: Option<NaiveDate>,
    pub meal_type: Option<MealType>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyWeekRequest {
    pub from_week: NaiveDate,
    pub to_week: NaiveDate,
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageResponse {
    pub reply: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(birth: Option<NaiveDate>) -> ChildRow {
        ChildRow {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: Some("Lovelace".to_string()),
            birth_date: birth,
            allergies: vec![],
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Sleep".parse::<EventCategory>().unwrap(), EventCategory::Sleep);
        assert_eq!(" dinner ".parse::<MealType>().unwrap(), MealType::Dinner);
        assert!("brunch".parse::<MealType>().is_err());
        assert_eq!(MealType::Snack.to_string(), "snack");
        assert_eq!(EventCategory::ALL.len(), 7);
    }

    #[test]
    fn test_meal_type_order() {
        let mut types = vec![MealType::Snack, MealType::Breakfast, MealType::Dinner, MealType::Lunch];
        types.sort();
        assert_eq!(types, MealType::ALL.to_vec());
    }

    #[test]
    fn test_enum_serde() {
        let json = serde_json::to_string(&EventCategory::Milestone).unwrap();
        assert_eq!(json, "\"milestone\"");
        let parsed: MealType = serde_json::from_str("\"lunch\"").unwrap();
        assert_eq!(parsed, MealType::Lunch);
    }

    #[test]
    fn test_age_on() {
        let c = child(Some(date(2023, 5, 20)));
        assert_eq!(c.age_on(date(2023, 5, 19)), None);
        assert_eq!(c.age_on(date(2023, 6, 19)), Some(Age { years: 0, months: 0 }));
        assert_eq!(c.age_on(date(2023, 6, 20)), Some(Age { years: 0, months: 1 }));
        assert_eq!(c.age_on(date(2026, 10, 17)), Some(Age { years: 3, months: 4 }));
        assert_eq!(child(None).age_on(date(2026, 1, 1)), None);
    }

    #[test]
    fn test_age_display() {
        assert_eq!(Age { years: 0, months: 1 }.to_string(), "1 month");
        assert_eq!(Age { years: 2, months: 0 }.to_string(), "2 years");
        assert_eq!(Age { years: 3, months: 4 }.to_string(), "3y 4m");
    }

    #[test]
    fn test_display_name() {
        let mut c = child(None);
        assert_eq!(c.display_name(), "Ada Lovelace");
        c.last_name = Some("  ".to_string());
        assert_eq!(c.display_name(), "Ada");
    }

    #[test]
    fn test_event_row_with_unknown_category() {
        let row = EventRow {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            category: "party".to_string(),
            title: "Birthday".to_string(),
            notes: None,
            occurred_at: Utc::now(),
            duration_minutes: None,
            logged_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        assert!(ActivityEvent::try_from(row).is_err());
    }

    #[test]
    fn test_create_event_validation() {
        let request: CreateEventRequest = serde_json::from_value(serde_json::json!({
            "category": "sleep",
            "title": "Nap",
            "durationMinutes": 2000
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
