//! World Bank population table parsing.
//!
//! The `SP.POP.TOTL` export starts with a few metadata lines, then a header
//! row (`Country Name`, `Country Code`, `Indicator Name`, `Indicator Code`,
//! followed by one column per year). Each country's population is the most
//! recent non-empty year at or before [`LATEST_POPULATION_YEAR`].

use std::collections::BTreeMap;
use std::io::Read;

use crate::DataLoadError;

/// Most recent year considered when picking a population estimate.
pub const LATEST_POPULATION_YEAR: i32 = 2019;

/// Oldest year considered when picking a population estimate.
pub const EARLIEST_POPULATION_YEAR: i32 = 1960;

/// Parses a World Bank population export into ISO alpha-3 code -> population.
///
/// Countries with no usable value in the year window are omitted.
///
/// # Errors
///
/// Returns [`DataLoadError`] if the CSV cannot be read or has no header row
/// containing a `Country Code` column.
pub fn parse_world_bank(reader: impl Read) -> Result<BTreeMap<String, u64>, DataLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = csv_reader.records();

    // Skip the metadata preamble up to the real header row.
    let header = loop {
        match records.next() {
            Some(record) => {
                let record = record?;
                if record.iter().any(|field| field.trim() == "Country Code") {
                    break record;
                }
            }
            None => {
                return Err(DataLoadError::Malformed {
                    message: "population table has no 'Country Code' header".to_string(),
                });
            }
        }
    };

    let code_idx = header
        .iter()
        .position(|field| field.trim() == "Country Code")
        .ok_or_else(|| DataLoadError::Malformed {
            message: "population table has no 'Country Code' column".to_string(),
        })?;

    // Newest first, restricted to the configured window.
    let mut year_columns: Vec<(i32, usize)> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, field)| field.trim().parse::<i32>().ok().map(|year| (year, idx)))
        .filter(|(year, _)| (EARLIEST_POPULATION_YEAR..=LATEST_POPULATION_YEAR).contains(year))
        .collect();
    year_columns.sort_by(|a, b| b.0.cmp(&a.0));

    let mut populations = BTreeMap::new();

    for record in records {
        let record = record?;
        let Some(code) = record.get(code_idx).map(str::trim) else {
            continue;
        };
        if code.is_empty() {
            continue;
        }

        let latest = year_columns
            .iter()
            .find_map(|(_, idx)| record.get(*idx).and_then(parse_population));

        if let Some(population) = latest {
            populations.insert(code.to_string(), population);
        }
    }

    log::debug!("Parsed population for {} country codes", populations.len());

    Ok(populations)
}

/// Parses a population cell. Empty, non-numeric and negative values are
/// treated as unknown.
#[must_use]
pub fn parse_population(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = value.parse::<f64>().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let population = parsed.round() as u64;
    Some(population)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD_BANK: &str = "\
\"Data Source\",\"World Development Indicators\",
\"Last Updated Date\",\"2020-03-18\",
\"Country Name\",\"Country Code\",\"Indicator Name\",\"Indicator Code\",\"2017\",\"2018\",\"2019\",\"2020\",
\"Aruba\",\"ABW\",\"Population, total\",\"SP.POP.TOTL\",\"105366\",\"105845\",\"\",\"107000\",
\"France\",\"FRA\",\"Population, total\",\"SP.POP.TOTL\",\"66918020\",\"66987244\",\"67059887\",\"\",
\"Nowhere\",\"NWH\",\"Population, total\",\"SP.POP.TOTL\",\"\",\"\",\"\",\"\",
";

    #[test]
    fn picks_latest_year_in_window() {
        let populations = parse_world_bank(WORLD_BANK.as_bytes()).unwrap();
        assert_eq!(populations.get("FRA"), Some(&67_059_887));
    }

    #[test]
    fn falls_back_to_older_year_and_ignores_future_columns() {
        let populations = parse_world_bank(WORLD_BANK.as_bytes()).unwrap();
        assert_eq!(populations.get("ABW"), Some(&105_845));
    }

    #[test]
    fn omits_countries_without_values() {
        let populations = parse_world_bank(WORLD_BANK.as_bytes()).unwrap();
        assert!(!populations.contains_key("NWH"));
    }

    #[test]
    fn rejects_table_without_header() {
        let err = parse_world_bank("a,b\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed { .. }));
    }

    #[test]
    fn parses_population_cells() {
        assert_eq!(parse_population("1000"), Some(1000));
        assert_eq!(parse_population("2.5e3"), Some(2500));
        assert_eq!(parse_population(" "), None);
        assert_eq!(parse_population("-4"), None);
        assert_eq!(parse_population("n/a"), None);
    }
}
