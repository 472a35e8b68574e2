//! Cell and header handling for raw worksheet data.

use calamine::{Data, Range};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use super::LoadError;

/// Formats tried, in order, for timestamps stored as text.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only formats; the time part becomes midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// A worksheet with its header row split off.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Data>>,
}

impl RawSheet {
    /// Build a sheet from a calamine range. The first row is the header.
    pub fn from_range(name: &str, range: &Range<Data>) -> Result<Self, LoadError> {
        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| LoadError::EmptySheet(name.to_string()))?;

        let headers = header_row
            .iter()
            .map(|cell| cell_text(cell).unwrap_or_default())
            .collect();

        Ok(Self::new(name, headers, rows.map(|r| r.to_vec()).collect()))
    }

    /// Build a sheet from headers and rows. Fully empty rows are dropped.
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Data>>) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|c| cell_text(c).is_some()))
            .collect();

        Self {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    /// Index of the first header matching one of `candidates`.
    ///
    /// Matching ignores case and surrounding whitespace. The error names the
    /// first candidate.
    pub fn column(&self, candidates: &[&str]) -> Result<usize, LoadError> {
        self.optional_column(candidates)
            .ok_or_else(|| LoadError::MissingColumn {
                sheet: self.name.clone(),
                column: candidates.first().copied().unwrap_or_default().to_string(),
            })
    }

    /// Like [`RawSheet::column`] but returns `None` when absent.
    pub fn optional_column(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|wanted| {
            self.headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        })
    }

    /// Cell at (`row`, `col`), or `Data::Empty` for short rows.
    pub fn cell(&self, row: usize, col: usize) -> &Data {
        const EMPTY: &Data = &Data::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(EMPTY)
    }

    /// 1-based spreadsheet row number for a data row index.
    pub fn excel_row(row: usize) -> usize {
        row + 2
    }

    /// Optional timestamp; empty cells give `None`, unparseable ones an error.
    pub fn timestamp(&self, row: usize, col: usize) -> Result<Option<NaiveDateTime>, LoadError> {
        let cell = self.cell(row, col);
        cell_timestamp(cell).map_err(|value| LoadError::UnparseableTimestamp {
            sheet: self.name.clone(),
            column: self.headers[col].clone(),
            row: Self::excel_row(row),
            value,
        })
    }

    /// Required timestamp; empty cells are an error.
    pub fn required_timestamp(&self, row: usize, col: usize) -> Result<NaiveDateTime, LoadError> {
        self.timestamp(row, col)?
            .ok_or_else(|| LoadError::MissingValue {
                sheet: self.name.clone(),
                column: self.headers[col].clone(),
                row: Self::excel_row(row),
            })
    }
}

/// Text content of a cell, trimmed. Empty cells and blank strings give `None`.
///
/// Integral floats are written without a fractional part so that numeric
/// identifiers like `12.0` compare equal to `"12"`.
pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(|ts| ts.to_string())
            .unwrap_or_default(),
        Data::Error(e) => format!("{:?}", e),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Timestamp content of a cell.
///
/// Native date cells and numeric serials are converted from the Excel epoch;
/// text is parsed with the known formats. On failure the offending text is
/// returned as the error.
pub fn cell_timestamp(cell: &Data) -> Result<Option<NaiveDateTime>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Some)
            .ok_or_else(|| dt.as_f64().to_string()),
        Data::Float(f) => excel_serial_to_datetime(*f)
            .map(Some)
            .ok_or_else(|| f.to_string()),
        Data::Int(i) => excel_serial_to_datetime(*i as f64)
            .map(Some)
            .ok_or_else(|| i.to_string()),
        Data::String(s) | Data::DateTimeIso(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                parse_timestamp(trimmed).map(Some).ok_or_else(|| s.clone())
            }
        }
        other => Err(cell_text(other).unwrap_or_default()),
    }
}

/// Parse a textual timestamp.
///
/// Accepts RFC 3339 (converted to UTC), the common `YYYY-MM-DD HH:MM:SS`
/// shapes, and bare dates.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Convert an Excel serial date (1900 date system) to a timestamp.
///
/// Serial 1.0 is 1900-01-01; the epoch is 1899-12-30 to absorb the
/// spreadsheet's phantom 1900-02-29. Values are rounded to the millisecond.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> RawSheet {
        RawSheet::new(
            "Runs",
            vec![" ID ".to_string(), "START_TIME".to_string()],
            vec![
                vec![Data::Float(7.0), Data::String("2024-03-01 08:30:00".to_string())],
                vec![Data::Empty, Data::Empty],
                vec![Data::String("r-2".to_string()), Data::String("soon".to_string())],
            ],
        )
    }

    #[test]
    fn test_from_range_splits_header() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String(" RUN_ID ".to_string()));
        range.set_value((0, 1), Data::String("QC_CHECK".to_string()));
        range.set_value((1, 0), Data::Float(12.0));
        range.set_value((1, 1), Data::String("pass".to_string()));

        let sheet = RawSheet::from_range("QC Checks", &range).unwrap();
        assert_eq!(sheet.headers, vec!["RUN_ID", "QC_CHECK"]);
        // the third row is all empty and is dropped
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.column(&["run_id"]).unwrap(), 0);
        assert_eq!(cell_text(sheet.cell(0, 0)).as_deref(), Some("12"));
    }

    #[test]
    fn test_from_empty_range() {
        let range: Range<Data> = Range::empty();
        match RawSheet::from_range("Runs", &range) {
            Err(LoadError::EmptySheet(name)) => assert_eq!(name, "Runs"),
            other => panic!("expected empty sheet, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_rows_are_dropped() {
        assert_eq!(sheet().rows.len(), 2);
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let sheet = sheet();
        assert_eq!(sheet.column(&["id"]).unwrap(), 0);
        assert_eq!(sheet.column(&["RUN_ID", "ID"]).unwrap(), 0);
        assert_eq!(sheet.optional_column(&["STOP_TIME"]), None);

        let err = sheet.column(&["OUTCOME"]).unwrap_err();
        assert!(err.to_string().contains("OUTCOME"));
        assert!(err.to_string().contains("Runs"));
    }

    #[test]
    fn test_integral_float_ids() {
        assert_eq!(cell_text(&Data::Float(12.0)), Some("12".to_string()));
        assert_eq!(cell_text(&Data::Float(1.5)), Some("1.5".to_string()));
        assert_eq!(cell_text(&Data::String("  ".to_string())), None);
    }

    #[test]
    fn test_unparseable_timestamp_reports_row() {
        let sheet = sheet();
        assert!(sheet.timestamp(0, 1).unwrap().is_some());

        let err = sheet.timestamp(1, 1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("soon"));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("START_TIME"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-01 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T09:30:00+01:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_excel_serial_conversion() {
        // 45352.5 is 2024-03-01 12:00
        let ts = excel_serial_to_datetime(45352.5).unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 12:00:00");
        assert_eq!(excel_serial_to_datetime(-1.0), None);
        assert_eq!(excel_serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn test_cell_timestamp_variants() {
        assert_eq!(cell_timestamp(&Data::Empty), Ok(None));
        assert!(cell_timestamp(&Data::Float(45352.0)).unwrap().is_some());
        assert_eq!(
            cell_timestamp(&Data::Bool(true)),
            Err("true".to_string())
        );
    }
}
