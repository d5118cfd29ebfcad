//! Sensor CSV reader.
//!
//! Reads the raw sensor export (`sensor_id`, `latitude`, `longitude`,
//! `rainfall_mm`, `timestamp`) into [`RawRow`]s. Columns are matched by
//! header name, extra columns are ignored and every cell is trimmed.
//!
//! The whole file is buffered before simulation; row order is preserved.
//! Cell-level problems never fail the read: bad numbers become `None` and
//! bad timestamps become `None`. Only a missing file, an I/O failure or a
//! structurally broken CSV ends the run.

use crate::model::{ImportError, RawRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Naive formats tried after RFC 3339, interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// ============================================================================
// CSV record
// ============================================================================

#[derive(Debug, Deserialize)]
struct SensorRecord {
    #[serde(default)]
    sensor_id: Option<String>,
    #[serde(default)]
    latitude: Option<String>,
    #[serde(default)]
    longitude: Option<String>,
    #[serde(default)]
    rainfall_mm: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl From<SensorRecord> for RawRow {
    fn from(record: SensorRecord) -> Self {
        let parse_coord = |s: Option<String>| -> Option<f64> {
            s.and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        RawRow {
            station_id: record.sensor_id.unwrap_or_default().trim().to_string(),
            latitude: parse_coord(record.latitude),
            longitude: parse_coord(record.longitude),
            rainfall_mm: record.rainfall_mm,
            timestamp: record.timestamp.as_deref().and_then(parse_timestamp),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Reads every row of the CSV file at `path`, in file order.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<RawRow>, ImportError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImportError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => ImportError::SourceUnreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    read_rows_from(file)
}

/// Reads rows from any CSV byte source with a header line.
pub fn read_rows_from<R: Read>(reader: R) -> Result<Vec<RawRow>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<SensorRecord>() {
        let record = result?;
        rows.push(RawRow::from(record));
    }
    Ok(rows)
}

/// Parses a timestamp cell. Accepts RFC 3339, a few naive
/// `YYYY-MM-DD[ T]HH:MM[:SS[.f]]` forms (UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = "\
sensor_id,latitude,longitude,rainfall_mm,timestamp,humidity
HYD_AMEERPET_1744_7845,17.4396,78.4599,0,2024-01-01T00:00:00Z,80
HYD_AMEERPET_1744_7845,17.4396,78.4599,12,2024-01-01T01:00:00Z,82
UNKNOWN_STATION,0,0,3,2024-01-01 02:00:00,10
HYD_UPPAL_1739_7856, 17.3916 , 78.5614 ,abc,2024-01-01,55
";

    #[test]
    fn test_rows_are_read_in_file_order() {
        let rows = read_rows_from(SAMPLE.as_bytes()).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.station_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "HYD_AMEERPET_1744_7845",
                "HYD_AMEERPET_1744_7845",
                "UNKNOWN_STATION",
                "HYD_UPPAL_1739_7856"
            ]
        );
    }

    #[test]
    fn test_cells_are_trimmed_and_parsed() {
        let rows = read_rows_from(SAMPLE.as_bytes()).unwrap();
        let uppal = &rows[3];
        assert_eq!(uppal.latitude, Some(17.3916));
        assert_eq!(uppal.longitude, Some(78.5614));
        assert_eq!(uppal.rainfall_mm.as_deref(), Some("abc"));
        assert_eq!(
            uppal.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_rainfall_column_reads_as_none() {
        let csv = "sensor_id,timestamp\nHYD_UPPAL_1739_7856,2024-01-01T00:00:00Z\n";
        let rows = read_rows_from(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rainfall_mm, None);
        assert!(rows[0].latitude.is_none());
    }

    #[test]
    fn test_bad_timestamp_becomes_none() {
        let csv = "sensor_id,rainfall_mm,timestamp\nHYD_UPPAL_1739_7856,1,yesterday\n";
        let rows = read_rows_from(csv.as_bytes()).unwrap();
        assert!(rows[0].timestamp.is_none());
    }

    #[test]
    fn test_missing_file_is_source_not_found() {
        let err = read_rows("/nonexistent/hyderabad_sensor_data.csv").unwrap_err();
        assert!(err.is_source_not_found(), "got {:?}", err);
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        let rows = read_rows_from("sensor_id,rainfall_mm,timestamp\n".as_bytes()).unwrap();
        assert!(rows.is_empty());
    }

    // --- Timestamp formats ---------------------------------------------------

    #[test]
    fn test_rfc3339_with_offset_is_converted_to_utc() {
        let ts = parse_timestamp("2024-01-01T05:30:00+05:30").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_formats_are_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-15 13:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-15T13:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-15 13:45"), Some(expected));
    }

    #[test]
    fn test_unparseable_timestamps() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("15/03/2024").is_none());
        assert!(parse_timestamp("2024-13-01").is_none());
    }
}
