use rust_xlsxwriter::{Format, Workbook, XlsxError};

use super::{minutes_label, ChildReport};
use crate::{Error, Result};

impl From<XlsxError> for Error {
    fn from(e: XlsxError) -> Self {
        Error::Report(format!("Excel write failed: {}", e))
    }
}

/// Workbook with a "Summary" sheet and an "Events" sheet.
pub fn render_xlsx(report: &ChildReport) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let title = Format::new().set_bold().set_font_size(14);
    let bold = Format::new().set_bold();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    summary.set_column_width(0, 24.0)?;
    summary.set_column_width(1, 28.0)?;
    summary.set_column_width(2, 16.0)?;

    summary.write_string_with_format(0, 0, "Activity report", &title)?;

    let age = report.age.map(|a| a.to_string()).unwrap_or_default();
    let allergies = report.allergies.join(", ");
    let period = report.period_label();
    let generated = report.generated_at.format("%Y-%m-%d %H:%M UTC").to_string();
    let details = [
        ("Child", report.child_name.as_str()),
        ("Age", age.as_str()),
        ("Allergies", allergies.as_str()),
        ("Period", period.as_str()),
        ("Generated", generated.as_str()),
    ];
    let mut row: u32 = 2;
    for (label, value) in details {
        summary.write_string_with_format(row, 0, label, &bold)?;
        summary.write_string(row, 1, value)?;
        row += 1;
    }

    row += 1;
    summary.write_string_with_format(row, 0, "Total events", &bold)?;
    summary.write_number(row, 1, report.total_events as f64)?;
    row += 1;
    summary.write_string_with_format(row, 0, "Average per day", &bold)?;
    summary.write_number(row, 1, (report.average_per_day * 100.0).round() / 100.0)?;
    row += 1;
    summary.write_string_with_format(row, 0, "Total time", &bold)?;
    summary.write_string(row, 1, minutes_label(report.total_minutes).as_str())?;

    row += 2;
    summary.write_string_with_format(row, 0, "Category", &bold)?;
    summary.write_string_with_format(row, 1, "Events", &bold)?;
    summary.write_string_with_format(row, 2, "Minutes", &bold)?;
    for category in &report.categories {
        row += 1;
        summary.write_string(row, 0, category.category.as_str())?;
        summary.write_number(row, 1, category.count as f64)?;
        summary.write_number(row, 2, category.total_minutes as f64)?;
    }

    row += 2;
    summary.write_string_with_format(row, 0, "Date", &bold)?;
    summary.write_string_with_format(row, 1, "Events", &bold)?;
    for day in &report.daily {
        row += 1;
        summary.write_string(row, 0, day.date.to_string().as_str())?;
        summary.write_number(row, 1, day.count as f64)?;
    }

    let events = workbook.add_worksheet();
    events.set_name("Events")?;
    events.set_freeze_panes(1, 0)?;
    let headers = ["Date", "Time", "Category", "Title", "Minutes", "Notes"];
    let widths = [12.0, 8.0, 12.0, 36.0, 10.0, 48.0];
    for (col, (header, width)) in headers.iter().zip(widths).enumerate() {
        let col = col as u16;
        events.write_string_with_format(0, col, *header, &bold)?;
        events.set_column_width(col, width)?;
    }

    for (index, entry) in report.rows.iter().enumerate() {
        let row = index as u32 + 1;
        events.write_string(row, 0, entry.date.to_string().as_str())?;
        events.write_string(row, 1, entry.time.as_str())?;
        events.write_string(row, 2, entry.category.as_str())?;
        events.write_string(row, 3, entry.title.as_str())?;
        if let Some(minutes) = entry.duration_minutes {
            events.write_number(row, 4, minutes as f64)?;
        }
        if let Some(notes) = &entry.notes {
            events.write_string(row, 5, notes.as_str())?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
