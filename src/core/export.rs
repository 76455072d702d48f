//! CSV export of stored records

use crate::core::record::RecordRow;
use crate::core::sink::StoredRecord;
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::{info, warn};

/// Field delimiter
pub const DELIMITER: char = ';';

/// Document title
pub const TITLE: &str = "LOGS SEALLESS TEST RIG";

const DESCRIPTION: [&str; 6] = [
    "",
    "total testrig cycles",
    "cycles since last counter reset",
    "maximum force",
    "peak battery current",
    "peak battery current",
];

const HEADER: [&str; 6] = [
    "TIMESTAMP",
    "CYCLES TOTAL",
    "CYCLES RESET",
    "TENSION FORCE",
    "TENSION CURRENT",
    "CRIMP CURRENT",
];

const UNITS: [&str; 6] = ["", "", "", "[N]", "[A]", "[A]"];

/// Render `records` as a `;`-delimited CSV document.
///
/// Rows are sorted by key. Values that do not split into five fields are
/// skipped with a warning.
pub fn render_csv(records: &[StoredRecord], created_at: DateTime<Local>) -> String {
    let mut rows: Vec<RecordRow> = records
        .iter()
        .filter_map(|r| {
            let row = RecordRow::parse(&r.key, &r.value);
            if row.is_none() {
                warn!(key = %r.key, value = %r.value, "malformed stored value, skipped");
            }
            row
        })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    let mut out = String::new();
    push_row(&mut out, &[TITLE]);
    let date = created_at.format("%d/%m/%Y").to_string();
    let time = created_at.format("%H:%M:%S").to_string();
    push_row(&mut out, &["File creation date:", date.as_str()]);
    push_row(&mut out, &["File creation time:", time.as_str()]);
    out.push('\n');
    push_row(&mut out, &DESCRIPTION);
    push_row(&mut out, &HEADER);
    push_row(&mut out, &UNITS);

    for row in &rows {
        push_row(
            &mut out,
            &[
                row.key.as_str(),
                row.cycle_total.as_str(),
                row.cycle_reset.as_str(),
                row.tension_force.as_str(),
                row.tension_current.as_str(),
                row.crimp_current.as_str(),
            ],
        );
    }
    out
}

/// Render `records` and write them to `path`, creating parent directories
pub fn write_csv(path: &Path, records: &[StoredRecord]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_csv(records, Local::now()))?;
    info!(path = %path.display(), records = records.len(), "CSV written");
    Ok(())
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        out.push_str(&escape(field));
    }
    out.push('\n');
}

fn escape(field: &str) -> String {
    if field.contains(|c: char| c == DELIMITER || c == '"' || c == '\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stored(key: &str, value: &str) -> StoredRecord {
        StoredRecord {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_layout_and_order() {
        let created = Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        let csv = render_csv(
            &[
                stored("2024-03-07_10-00-01-000", "2;2;800;40.1;55;"),
                stored("2024-03-07_09-59-00-500", "1;1;812.5;4.2;6.1;"),
            ],
            created,
        );
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], TITLE);
        assert_eq!(lines[1], "File creation date:;07/03/2024");
        assert_eq!(lines[2], "File creation time:;14:05:09");
        assert_eq!(lines[3], "");
        assert_eq!(
            lines[5],
            "TIMESTAMP;CYCLES TOTAL;CYCLES RESET;TENSION FORCE;TENSION CURRENT;CRIMP CURRENT"
        );
        assert_eq!(lines[6], ";;;[N];[A];[A]");
        assert_eq!(lines[7], "2024-03-07_09-59-00-500;1;1;812.5;4.2;6.1");
        assert_eq!(lines[8], "2024-03-07_10-00-01-000;2;2;800;40.1;55");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn test_malformed_value_is_skipped() {
        let csv = render_csv(&[stored("k", "1;2;")], Local::now());
        assert_eq!(csv.lines().count(), 7);
    }

    #[test]
    fn test_write_csv_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("logs.csv");
        write_csv(&path, &[stored("k", "1;1;1;1;1;")]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("k;1;1;1;1;1\n"));
    }
}
