use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::{minutes_label, ChildReport};
use crate::{Error, Result};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const LINE_HEIGHT: f32 = 5.5;

/// Event table columns: (x offset in mm, max characters).
const COLUMNS: [(f32, usize); 5] = [(0.0, 10), (24.0, 5), (38.0, 10), (62.0, 44), (156.0, 8)];

fn pdf_err(e: impl std::fmt::Display) -> Error {
    Error::Report(format!("PDF write failed: {}", e))
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Top-down text cursor that starts a new page when the current one is full.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_err)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, lines: f32) {
        if self.y - lines * LINE_HEIGHT < MARGIN {
            self.pages += 1;
            let (page, layer) = self.doc.add_page(
                Mm(PAGE_WIDTH),
                Mm(PAGE_HEIGHT),
                format!("Layer {}", self.pages),
            );
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text_at(&self, x: f32, text: &str, size: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(text, size, Mm(MARGIN + x), Mm(self.y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_space(1.0);
        self.text_at(0.0, text, size, bold);
        self.y -= LINE_HEIGHT * (size / 10.0).max(1.0);
    }

    fn row(&mut self, cells: &[&str], bold: bool) {
        self.ensure_space(1.0);
        for ((x, max), cell) in COLUMNS.iter().zip(cells) {
            self.text_at(*x, &clip(cell, *max), 9.0, bold);
        }
        self.y -= LINE_HEIGHT;
    }

    fn gap(&mut self) {
        self.y -= LINE_HEIGHT;
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc.save_to_bytes().map_err(pdf_err)
    }
}

/// A4 document: header, summary, per-category table, then the event log.
pub fn render_pdf(report: &ChildReport) -> Result<Vec<u8>> {
    let mut pdf = PageWriter::new(&format!("Activity report - {}", report.child_name))?;

    pdf.line(&format!("Activity report: {}", report.child_name), 18.0, true);
    pdf.line(&format!("Period: {}", report.period_label()), 10.0, false);
    if let Some(age) = report.age {
        pdf.line(&format!("Age: {}", age), 10.0, false);
    }
    if !report.allergies.is_empty() {
        pdf.line(&format!("Allergies: {}", report.allergies.join(", ")), 10.0, false);
    }
    pdf.line(
        &format!(
            "Generated {}",
            report.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        8.0,
        false,
    );
    pdf.gap();

    pdf.line("Summary", 13.0, true);
    pdf.line(&format!("Total events: {}", report.total_events), 10.0, false);
    pdf.line(
        &format!("Average per day: {:.2}", report.average_per_day),
        10.0,
        false,
    );
    pdf.line(
        &format!("Total recorded time: {}", minutes_label(report.total_minutes)),
        10.0,
        false,
    );
    pdf.gap();

    if !report.categories.is_empty() {
        pdf.line("By category", 13.0, true);
        for category in &report.categories {
            pdf.line(
                &format!(
                    "{}: {} event{}, {}",
                    category.category,
                    category.count,
                    if category.count == 1 { "" } else { "s" },
                    minutes_label(category.total_minutes)
                ),
                10.0,
                false,
            );
        }
        pdf.gap();
    }

    pdf.line("Events", 13.0, true);
    if report.rows.is_empty() {
        pdf.line("No events recorded in this period.", 10.0, false);
    } else {
        pdf.row(&["Date", "Time", "Category", "Title", "Minutes"], true);
        for entry in &report.rows {
            let date = entry.date.to_string();
            let minutes = entry
                .duration_minutes
                .map(|m| m.to_string())
                .unwrap_or_default();
            pdf.row(
                &[
                    date.as_str(),
                    entry.time.as_str(),
                    entry.category.as_str(),
                    entry.title.as_str(),
                    minutes.as_str(),
                ],
                false,
            );
        }
    }

    pdf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::tests::sample_report;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("a much longer title", 10), "a much ...");
        assert_eq!(clip("abc", 2), "...");
    }

    #[test]
    fn test_pdf_header() {
        let bytes = render_pdf(&sample_report()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_reports_paginate() {
        let mut report = sample_report();
        let template = report.rows[0].clone();
        report.rows = (0..200).map(|_| template.clone()).collect();

        let mut writer = PageWriter::new("test").unwrap();
        for entry in &report.rows {
            writer.row(&[entry.title.as_str()], false);
        }
        assert!(writer.pages > 1);
        assert!(render_pdf(&report).unwrap().starts_with(b"%PDF"));
    }
}
