//! Child activity reports.
//!
//! A [`ChildReport`] aggregates one child's events over a date range; the
//! renderers turn it into CSV, Excel or PDF bytes.

mod csv;
mod pdf;
mod xlsx;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::http::DateRange;
use crate::models::{ActivityEvent, Age, ChildRow, EventCategory};
use crate::{Error, Result};

pub use self::csv::render_csv;
pub use self::pdf::render_pdf;
pub use self::xlsx::render_xlsx;

/// Longest range one report may cover.
pub const MAX_REPORT_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ReportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "xlsx" | "excel" => Ok(ReportFormat::Xlsx),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(Error::Validation(format!(
                "Unsupported report format '{}', expected pdf, xlsx or csv",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: EventCategory,
    pub count: usize,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub date: NaiveDate,
    pub time: String,
    pub category: EventCategory,
    pub title: String,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildReport {
    pub child_name: String,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<Age>,
    pub allergies: Vec<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub total_events: usize,
    pub total_minutes: i64,
    pub average_per_day: f64,
    /// Categories with at least one event, in category order.
    pub categories: Vec<CategorySummary>,
    /// One entry per date in the range.
    pub daily: Vec<DailyCount>,
    /// Events in chronological order.
    pub rows: Vec<ReportRow>,
}

impl ChildReport {
    /// Aggregate `events` of `child` that fall inside `range` (by UTC date).
    pub fn build(
        child: &ChildRow,
        range: &DateRange,
        events: &[ActivityEvent],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut in_range: Vec<&ActivityEvent> = events
            .iter()
            .filter(|e| range.contains(e.occurred_at.date_naive()))
            .collect();
        in_range.sort_by_key(|e| e.occurred_at);

        let mut by_category: BTreeMap<EventCategory, CategorySummary> = BTreeMap::new();
        let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

        for event in &in_range {
            let summary = by_category
                .entry(event.category)
                .or_insert_with(|| CategorySummary {
                    category: event.category,
                    count: 0,
                    total_minutes: 0,
                });
            summary.count += 1;
            summary.total_minutes += i64::from(event.duration_minutes.unwrap_or(0));
            *by_day.entry(event.occurred_at.date_naive()).or_insert(0) += 1;
        }

        let daily: Vec<DailyCount> = range
            .iter_days()
            .map(|date| DailyCount {
                date,
                count: by_day.get(&date).copied().unwrap_or(0),
            })
            .collect();

        let total_events = in_range.len();
        let categories: Vec<CategorySummary> = by_category.into_values().collect();
        let total_minutes = categories.iter().map(|c| c.total_minutes).sum();

        let rows = in_range
            .into_iter()
            .map(|e| ReportRow {
                date: e.occurred_at.date_naive(),
                time: e.occurred_at.format("%H:%M").to_string(),
                category: e.category,
                title: e.title.clone(),
                duration_minutes: e.duration_minutes,
                notes: e.notes.clone(),
            })
            .collect();

        Self {
            child_name: child.display_name(),
            birth_date: child.birth_date,
            age: child.age_on(range.to),
            allergies: child.allergies.clone(),
            from: range.from,
            to: range.to,
            generated_at,
            total_events,
            total_minutes,
            average_per_day: total_events as f64 / range.days() as f64,
            categories,
            daily,
            rows,
        }
    }

    fn period_label(&self) -> String {
        format!("{} to {}", self.from, self.to)
    }
}

/// Render `report` in `format`.
pub fn render(report: &ChildReport, format: ReportFormat) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Csv => render_csv(report),
        ReportFormat::Xlsx => render_xlsx(report),
        ReportFormat::Pdf => render_pdf(report),
    }
}

/// Download name such as `ada-lovelace-report-2026-10-01-to-2026-10-31.pdf`.
pub fn report_filename(child_name: &str, range: &DateRange, format: ReportFormat) -> String {
    let mut slug = String::new();
    for c in child_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "child" } else { slug };

    format!(
        "{}-report-{}-to-{}.{}",
        slug,
        range.from,
        range.to,
        format.extension()
    )
}

fn minutes_label(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
