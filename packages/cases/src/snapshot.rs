//! Snapshot file persistence.
//!
//! A snapshot is a CSV with the header `Country,Date,Confirmed,Deaths,Recovered`
//! holding raw cumulative counts only. Derived columns are recomputed on load.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corona_board_case_models::{RawCaseRow, parse_report_date};

use crate::DataLoadError;

/// Column headers, in file order.
pub const SNAPSHOT_COLUMNS: [&str; 5] = ["Country", "Date", "Confirmed", "Deaths", "Recovered"];

/// Reads every row of a snapshot file.
///
/// # Errors
///
/// Returns [`DataLoadError`] if the file is missing, is not valid CSV, lacks
/// a required column, or holds an unparseable date or count.
pub fn read_snapshot(path: &Path) -> Result<Vec<RawCaseRow>, DataLoadError> {
    let file = std::fs::File::open(path)?;
    let rows = parse_snapshot(file)?;
    log::info!("Read {} snapshot rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Parses snapshot rows from any reader.
///
/// Columns are matched by header name (case-insensitive), so extra columns
/// and reordered columns are tolerated.
///
/// # Errors
///
/// Returns [`DataLoadError`] on CSV errors, missing columns, rows shorter
/// than the header's required columns, or invalid values.
pub fn parse_snapshot(reader: impl Read) -> Result<Vec<RawCaseRow>, DataLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut positions = [0usize; 5];
    for (slot, column) in positions.iter_mut().zip(SNAPSHOT_COLUMNS) {
        *slot = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(column))
            .ok_or_else(|| DataLoadError::Malformed {
                message: format!("snapshot has no '{column}' column"),
            })?;
    }
    let [region_idx, date_idx, confirmed_idx, deaths_idx, recovered_idx] = positions;
    let required_len = positions.iter().max().map_or(0, |idx| idx + 1);

    let mut rows = Vec::new();

    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        // header is line 1
        let line = line + 2;

        if record.len() < required_len {
            return Err(DataLoadError::Malformed {
                message: format!(
                    "line {line}: expected {required_len} columns, found {}",
                    record.len()
                ),
            });
        }

        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let region = field(region_idx);
        if region.is_empty() {
            return Err(DataLoadError::Malformed {
                message: format!("line {line}: empty country name"),
            });
        }

        let date = parse_report_date(field(date_idx)).ok_or_else(|| DataLoadError::Malformed {
            message: format!("line {line}: invalid date '{}'", field(date_idx)),
        })?;

        rows.push(RawCaseRow {
            region: region.to_string(),
            date,
            confirmed: parse_count(field(confirmed_idx), line, "Confirmed")?,
            deaths: parse_count(field(deaths_idx), line, "Deaths")?,
            recovered: parse_count(field(recovered_idx), line, "Recovered")?,
        });
    }

    Ok(rows)
}

/// Parses a cumulative count. Empty cells count as zero; whole-number
/// floats (`"12.0"`) are accepted since some exports write counts that way.
fn parse_count(value: &str, line: usize, column: &str) -> Result<u64, DataLoadError> {
    if value.is_empty() {
        return Ok(0);
    }
    if let Ok(count) = value.parse::<u64>() {
        return Ok(count);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = f as u64;
            Ok(count)
        }
        _ => Err(DataLoadError::Malformed {
            message: format!("line {line}: invalid {column} count '{value}'"),
        }),
    }
}

/// Writes rows to any writer in snapshot format.
///
/// # Errors
///
/// Returns [`DataLoadError`] if serialization or the underlying write fails.
pub fn write_rows<'a>(
    writer: impl Write,
    rows: impl IntoIterator<Item = &'a RawCaseRow>,
) -> Result<(), DataLoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(SNAPSHOT_COLUMNS)?;

    for row in rows {
        csv_writer.write_record([
            row.region.as_str(),
            &row.date.format("%Y-%m-%d").to_string(),
            &row.confirmed.to_string(),
            &row.deaths.to_string(),
            &row.recovered.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Persists rows to `path`.
///
/// The file is written next to its destination and renamed into place, so
/// a reader never observes a half-written snapshot.
///
/// # Errors
///
/// Returns [`DataLoadError`] if the directory is not writable or the
/// rename fails.
pub fn write_snapshot<'a>(
    path: &Path,
    rows: impl IntoIterator<Item = &'a RawCaseRow>,
) -> Result<(), DataLoadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = staging_path(path);
    let file = std::fs::File::create(&tmp_path)?;

    if let Err(e) = write_rows(std::io::BufWriter::new(file), rows) {
        std::fs::remove_file(&tmp_path).ok();
        return Err(e);
    }

    std::fs::rename(&tmp_path, path)?;
    log::info!("Wrote snapshot to {}", path.display());
    Ok(())
}

/// Last-modified time of the snapshot file, if it exists.
#[must_use]
pub fn snapshot_modified(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaseDataset;
    use crate::test_support::{registry, row};

    #[test]
    fn parses_snapshot_with_reordered_and_extra_columns() {
        let text = "\
idx,date,Country,Recovered,Deaths,Confirmed
0,2020-03-01,Chinaland,10,1,100
1,3/2/20,Chinaland,20,2,150
";
        let rows = parse_snapshot(text.as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![
                row("Chinaland", "2020-03-01", 100, 1, 10),
                row("Chinaland", "2020-03-02", 150, 2, 20),
            ]
        );
    }

    #[test]
    fn accepts_float_counts_and_empty_cells() {
        let text = "Country,Date,Confirmed,Deaths,Recovered\nChinaland,2020-03-01,12.0,,3\n";
        let rows = parse_snapshot(text.as_bytes()).unwrap();
        assert_eq!(rows, vec![row("Chinaland", "2020-03-01", 12, 0, 3)]);
    }

    #[test]
    fn rejects_missing_column() {
        let text = "Country,Date,Confirmed,Deaths\nChinaland,2020-03-01,1,0\n";
        let err = parse_snapshot(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed { .. }));
    }

    #[test]
    fn rejects_truncated_row() {
        let text = "Country,Date,Confirmed,Deaths,Recovered\nChinaland,2020-03-01,100,1,10\nChinaland,2020-03-02\n";
        let err = parse_snapshot(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed { .. }));
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn rejects_negative_count_with_line_number() {
        let text = "Country,Date,Confirmed,Deaths,Recovered\nChinaland,2020-03-01,-4,0,0\n";
        let err = parse_snapshot(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn rejects_invalid_date() {
        let text = "Country,Date,Confirmed,Deaths,Recovered\nChinaland,someday,1,0,0\n";
        assert!(parse_snapshot(text.as_bytes()).is_err());
    }

    #[test]
    fn round_trip_reproduces_raw_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("corona_data.csv");
        let registry = registry();

        let original = CaseDataset::build(
            vec![
                row("Chinaland", "2020-03-01", 100, 1, 10),
                row("Chinaland", "2020-03-02", 150, 2, 20),
                row("Europia", "2020-03-02", 5, 0, 1),
                row("Atlantis", "2020-03-01", 3, 0, 0),
            ],
            &registry,
        );

        write_snapshot(&path, original.raw_rows()).unwrap();
        let reloaded = CaseDataset::build(read_snapshot(&path).unwrap(), &registry);

        assert_eq!(reloaded.raw_rows(), original.raw_rows());
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn reports_modification_time_of_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corona_data.csv");
        assert!(snapshot_modified(&path).is_none());

        write_snapshot(&path, &[row("Chinaland", "2020-03-01", 1, 0, 0)]).unwrap();
        let modified = snapshot_modified(&path).unwrap();
        assert!((Utc::now() - modified).num_minutes().abs() < 5);
    }

    #[test]
    fn writes_iso_dates() {
        let mut buffer = Vec::new();
        write_rows(&mut buffer, &[row("Chinaland", "2020-03-01", 1, 2, 3)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "Country,Date,Confirmed,Deaths,Recovered\nChinaland,2020-03-01,1,2,3\n"
        );
    }
}
