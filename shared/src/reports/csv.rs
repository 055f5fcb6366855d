use super::ChildReport;
use crate::{Error, Result};

const HEADER: [&str; 6] = ["date", "time", "category", "title", "duration_minutes", "notes"];

/// One header row followed by one row per event.
pub fn render_csv(report: &ChildReport) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    let report_err = |e: ::csv::Error| Error::Report(format!("CSV write failed: {}", e));

    writer.write_record(HEADER).map_err(report_err)?;

    for row in &report.rows {
        let date = row.date.to_string();
        let duration = row
            .duration_minutes
            .map(|m| m.to_string())
            .unwrap_or_default();
        writer
            .write_record([
                date.as_str(),
                row.time.as_str(),
                row.category.as_str(),
                row.title.as_str(),
                duration.as_str(),
                row.notes.as_deref().unwrap_or(""),
            ])
            .map_err(report_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Report(format!("CSV flush failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::tests::sample_report;

    #[test]
    fn test_csv_rows() {
        let bytes = render_csv(&sample_report()).unwrap();
        let mut reader = ::csv::Reader::from_reader(bytes.as_slice());

        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), HEADER.to_vec());

        let records: Vec<::csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 4);
        assert_eq!(&records[0][0], "2026-10-01");
        assert_eq!(&records[0][2], "meal");
        assert_eq!(&records[0][4], "20");
        assert_eq!(&records[1][4], "");
        assert_eq!(&records[0][5], "with \"quotes\", and commas");
    }
}
