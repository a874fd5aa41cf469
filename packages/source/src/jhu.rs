//! Johns Hopkins CSSE global time series.
//!
//! Upstream publishes three wide CSV files (confirmed, deaths, recovered)
//! with the columns `Province/State`, `Country/Region`, `Lat`, `Long` and
//! then one cumulative count column per `M/D/YY` date. Each file is
//! reshaped to long form, attributed to reference country names, summed
//! per (country, date), and the three series are unioned into
//! [`RawCaseRow`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use corona_board_case_models::{CaseCounts, RawCaseRow, parse_report_date};
use corona_board_spatial::GeoRegistry;
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::progress::{ProgressCallback, null_progress};
use crate::{CaseSource, SourceError};

const BASE_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series";

/// User agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("corona-board/", env!("CARGO_PKG_VERSION"));

const COUNTRY_COLUMNS: &[&str] = &["Country/Region", "Country_Region"];
const LATITUDE_COLUMNS: &[&str] = &["Lat"];
const LONGITUDE_COLUMNS: &[&str] = &["Long", "Long_"];

/// One of the three upstream series.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum SeriesKind {
    /// Cumulative confirmed cases.
    Confirmed,
    /// Cumulative deaths.
    Deaths,
    /// Cumulative recoveries.
    Recovered,
}

impl SeriesKind {
    /// All series, in download order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

/// One value per [`SeriesKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesSet<T> {
    /// Confirmed series.
    pub confirmed: T,
    /// Deaths series.
    pub deaths: T,
    /// Recovered series.
    pub recovered: T,
}

impl<T> SeriesSet<T> {
    /// The value for `kind`.
    #[must_use]
    pub const fn get(&self, kind: SeriesKind) -> &T {
        match kind {
            SeriesKind::Confirmed => &self.confirmed,
            SeriesKind::Deaths => &self.deaths,
            SeriesKind::Recovered => &self.recovered,
        }
    }
}

impl SeriesSet<String> {
    /// The public CSSE global time series URLs.
    #[must_use]
    pub fn jhu_urls() -> Self {
        let url = |name: &str| format!("{BASE_URL}/time_series_covid19_{name}_global.csv");
        Self {
            confirmed: url("confirmed"),
            deaths: url("deaths"),
            recovered: url("recovered"),
        }
    }
}

/// Cumulative counts of one series, keyed by (country, date).
pub type SeriesCounts = BTreeMap<(String, NaiveDate), u64>;

/// Reshapes one wide series file to long form.
///
/// Each row is attributed to a reference country: an exact name match
/// first, then the country containing the row's `Long`/`Lat` point,
/// otherwise the upstream name is kept. Rows attributed to the same
/// country (provinces, overseas territories) are summed per date.
///
/// Empty cells count as zero and negative corrections are clamped to zero.
///
/// # Errors
///
/// Returns [`SourceError`] if the text is not CSV, lacks a country column or
/// any date column, or holds a non-numeric count.
pub fn reshape_wide_series(
    kind: SeriesKind,
    csv_text: &str,
    registry: &GeoRegistry,
) -> Result<SeriesCounts, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|header| names.iter().any(|name| header.eq_ignore_ascii_case(name)))
    };

    let country_idx = find(COUNTRY_COLUMNS).ok_or_else(|| SourceError::Normalization {
        message: format!("{kind} series has no Country/Region column"),
    })?;
    let lat_idx = find(LATITUDE_COLUMNS);
    let lon_idx = find(LONGITUDE_COLUMNS);

    let date_columns: Vec<(usize, NaiveDate)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| parse_report_date(header).map(|date| (idx, date)))
        .collect();

    if date_columns.is_empty() {
        return Err(SourceError::Normalization {
            message: format!("{kind} series has no date columns"),
        });
    }

    let mut counts = SeriesCounts::new();
    let mut unmatched: BTreeSet<String> = BTreeSet::new();
    let mut rows = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        // header is line 1
        let line = line + 2;
        rows += 1;

        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let upstream = field(country_idx);
        if upstream.is_empty() {
            log::debug!("[{kind}] line {line}: skipping row without country");
            continue;
        }

        let coordinate = |idx: Option<usize>| idx.and_then(|idx| field(idx).parse::<f64>().ok());
        let country = attribute(
            registry,
            upstream,
            coordinate(lon_idx),
            coordinate(lat_idx),
        )
        .unwrap_or_else(|| {
            unmatched.insert(upstream.to_owned());
            upstream.to_owned()
        });

        for &(idx, date) in &date_columns {
            let value = field(idx);
            let count = parse_cumulative(value).ok_or_else(|| SourceError::Normalization {
                message: format!("{kind} series line {line}: invalid count '{value}'"),
            })?;
            *counts.entry((country.clone(), date)).or_default() += count;
        }
    }

    if !unmatched.is_empty() {
        log::warn!(
            "[{kind}] {} upstream regions matched no reference country and keep their upstream name: {}",
            unmatched.len(),
            unmatched.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
    }

    log::debug!(
        "[{kind}] reshaped {rows} rows x {} dates into {} (country, date) counts",
        date_columns.len(),
        counts.len()
    );

    Ok(counts)
}

/// Resolves an upstream row to a reference country name.
fn attribute(
    registry: &GeoRegistry,
    upstream: &str,
    lon: Option<f64>,
    lat: Option<f64>,
) -> Option<String> {
    if registry.contains_country(upstream) {
        return Some(upstream.to_owned());
    }
    let (lon, lat) = lon.zip(lat)?;
    registry
        .lookup_by_point(lon, lat)
        .map(|info| info.name.clone())
}

fn parse_cumulative(value: &str) -> Option<u64> {
    if value.is_empty() {
        return Some(0);
    }
    if let Ok(count) = value.parse::<u64>() {
        return Some(count);
    }
    let value = value.parse::<f64>().ok().filter(|f| f.is_finite())?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = value.max(0.0).round() as u64;
    Some(count)
}

/// Folds one reshaped series into the merged table.
///
/// The merge is a union: a (country, date) key missing from one series
/// counts as zero for that series.
pub fn merge_series(
    merged: &mut BTreeMap<(String, NaiveDate), CaseCounts>,
    kind: SeriesKind,
    series: SeriesCounts,
) {
    for (key, count) in series {
        let counts = merged.entry(key).or_default();
        match kind {
            SeriesKind::Confirmed => counts.confirmed += count,
            SeriesKind::Deaths => counts.deaths += count,
            SeriesKind::Recovered => counts.recovered += count,
        }
    }
}

/// Reshapes and merges the three series texts into long-form rows.
///
/// # Errors
///
/// Returns [`SourceError`] if any series fails to reshape.
pub fn assemble_rows(
    texts: &SeriesSet<String>,
    registry: &GeoRegistry,
) -> Result<Vec<RawCaseRow>, SourceError> {
    let mut merged = BTreeMap::new();
    for kind in SeriesKind::all() {
        let series = reshape_wide_series(kind, texts.get(kind), registry)?;
        merge_series(&mut merged, kind, series);
    }

    Ok(merged
        .into_iter()
        .map(|((region, date), counts)| RawCaseRow {
            region,
            date,
            confirmed: counts.confirmed,
            deaths: counts.deaths,
            recovered: counts.recovered,
        })
        .collect())
}

/// Downloads the three series over HTTP.
pub struct JhuTimeSeriesSource {
    client: reqwest::Client,
    urls: SeriesSet<String>,
    progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for JhuTimeSeriesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JhuTimeSeriesSource")
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

impl JhuTimeSeriesSource {
    /// Creates a source fetching `urls`, each request bounded by
    /// `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(urls: SeriesSet<String>, request_timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            urls,
            progress: null_progress(),
        })
    }

    /// Reports one step per downloaded series to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Configured series URLs.
    #[must_use]
    pub const fn urls(&self) -> &SeriesSet<String> {
        &self.urls
    }

    async fn download(&self, kind: SeriesKind) -> Result<String, SourceError> {
        let url = self.urls.get(kind);
        log::info!("Downloading {kind} series from {url}");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let text = response.text().await?;

        log::debug!("Downloaded {} bytes of {kind} series", text.len());
        self.progress.inc(1);
        Ok(text)
    }
}

impl CaseSource for JhuTimeSeriesSource {
    fn name(&self) -> &str {
        "JHU CSSE time series"
    }

    async fn fetch(&self, registry: &GeoRegistry) -> Result<Vec<RawCaseRow>, SourceError> {
        self.progress.set_total(3);
        self.progress.set_message("Downloading time series".to_string());

        let (confirmed, deaths, recovered) = tokio::try_join!(
            self.download(SeriesKind::Confirmed),
            self.download(SeriesKind::Deaths),
            self.download(SeriesKind::Recovered),
        )?;

        let texts = SeriesSet {
            confirmed,
            deaths,
            recovered,
        };
        let rows = assemble_rows(&texts, registry)?;

        self.progress
            .finish(format!("Downloaded {} country-day rows", rows.len()));
        log::info!("Fetched {} rows from {}", rows.len(), self.name());

        Ok(rows)
    }
}

/// Reads the three series from local files in the upstream format.
#[derive(Debug, Clone)]
pub struct LocalSeriesSource {
    paths: SeriesSet<PathBuf>,
}

impl LocalSeriesSource {
    /// Creates a source reading `paths`.
    #[must_use]
    pub const fn new(paths: SeriesSet<PathBuf>) -> Self {
        Self { paths }
    }
}

impl CaseSource for LocalSeriesSource {
    fn name(&self) -> &str {
        "local time series files"
    }

    async fn fetch(&self, registry: &GeoRegistry) -> Result<Vec<RawCaseRow>, SourceError> {
        let (confirmed, deaths, recovered) = tokio::try_join!(
            tokio::fs::read_to_string(&self.paths.confirmed),
            tokio::fs::read_to_string(&self.paths.deaths),
            tokio::fs::read_to_string(&self.paths.recovered),
        )?;

        assemble_rows(
            &SeriesSet {
                confirmed,
                deaths,
                recovered,
            },
            registry,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTRIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"ADMIN": "Chinaland", "ADM0_A3": "CHL", "CONTINENT": "Asia", "POP_EST": 1000},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"ADMIN": "Francia", "ADM0_A3": "FRA", "CONTINENT": "Europe", "POP_EST": 2000},
                "geometry": {"type": "Polygon", "coordinates": [[[20,20],[30,20],[30,30],[20,30],[20,20]]]}
            }
        ]
    }"#;

    const CONFIRMED: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
Hubia,Mainland Chinaland,5,5,10,15
Shanxa,Mainland Chinaland,2,3,1,2
,Francia,45,2,0,3
,Cruise Ship,-40,-100,7,7
";

    const DEATHS: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
Hubia,Mainland Chinaland,5,5,1,2
,Francia,45,2,,0
";

    const RECOVERED: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
Hubia,Mainland Chinaland,5,5,0,4
";

    fn registry() -> GeoRegistry {
        GeoRegistry::from_geojson_str(COUNTRIES, None).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn attributes_by_point_and_sums_provinces() {
        let series = reshape_wide_series(SeriesKind::Confirmed, CONFIRMED, &registry()).unwrap();

        assert_eq!(series[&("Chinaland".to_string(), date("2020-01-22"))], 11);
        assert_eq!(series[&("Chinaland".to_string(), date("2020-01-23"))], 17);
    }

    #[test]
    fn exact_name_match_wins_over_coordinates() {
        // Francia's upstream point lies outside its polygon
        let series = reshape_wide_series(SeriesKind::Confirmed, CONFIRMED, &registry()).unwrap();
        assert_eq!(series[&("Francia".to_string(), date("2020-01-23"))], 3);
    }

    #[test]
    fn unmatched_rows_keep_upstream_name() {
        let series = reshape_wide_series(SeriesKind::Confirmed, CONFIRMED, &registry()).unwrap();
        assert_eq!(series[&("Cruise Ship".to_string(), date("2020-01-22"))], 7);
    }

    #[test]
    fn empty_cells_count_as_zero_and_negatives_clamp() {
        assert_eq!(parse_cumulative(""), Some(0));
        assert_eq!(parse_cumulative("12"), Some(12));
        assert_eq!(parse_cumulative("12.0"), Some(12));
        assert_eq!(parse_cumulative("-1"), Some(0));
        assert_eq!(parse_cumulative("n/a"), None);
    }

    #[test]
    fn rejects_series_without_country_column() {
        let text = "Province/State,Lat,Long,1/22/20\nHubia,5,5,1\n";
        let err = reshape_wide_series(SeriesKind::Deaths, text, &registry()).unwrap_err();
        assert!(err.to_string().contains("deaths"), "{err}");
    }

    #[test]
    fn rejects_series_without_dates() {
        let text = "Province/State,Country/Region,Lat,Long\nHubia,Chinaland,5,5\n";
        assert!(reshape_wide_series(SeriesKind::Confirmed, text, &registry()).is_err());
    }

    #[test]
    fn rejects_non_numeric_counts_with_line() {
        let text = "Province/State,Country/Region,Lat,Long,1/22/20\n,Chinaland,5,5,lots\n";
        let err = reshape_wide_series(SeriesKind::Confirmed, text, &registry()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn merge_is_a_union_with_zero_defaults() {
        let texts = SeriesSet {
            confirmed: CONFIRMED.to_string(),
            deaths: DEATHS.to_string(),
            recovered: RECOVERED.to_string(),
        };
        let rows = assemble_rows(&texts, &registry()).unwrap();

        let find = |region: &str, day: &str| {
            rows.iter()
                .find(|row| row.region == region && row.date == date(day))
                .unwrap()
        };

        let chinaland = find("Chinaland", "2020-01-23");
        assert_eq!(
            (chinaland.confirmed, chinaland.deaths, chinaland.recovered),
            (17, 2, 4)
        );

        // present in confirmed only
        let ship = find("Cruise Ship", "2020-01-23");
        assert_eq!((ship.confirmed, ship.deaths, ship.recovered), (7, 0, 0));

        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn series_set_indexes_by_kind() {
        let urls = SeriesSet::jhu_urls();
        for kind in SeriesKind::all() {
            assert!(urls.get(kind).contains(&format!("covid19_{kind}_global")));
        }
    }

    #[tokio::test]
    async fn local_source_reads_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, text).unwrap();
            path
        };
        let source = LocalSeriesSource::new(SeriesSet {
            confirmed: write("confirmed.csv", CONFIRMED),
            deaths: write("deaths.csv", DEATHS),
            recovered: write("recovered.csv", RECOVERED),
        });

        let rows = source.fetch(&registry()).await.unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().any(|row| row.region == "Francia"));
    }

    #[tokio::test]
    async fn local_source_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.csv");
        let source = LocalSeriesSource::new(SeriesSet {
            confirmed: missing.clone(),
            deaths: missing.clone(),
            recovered: missing,
        });
        assert!(matches!(
            source.fetch(&registry()).await,
            Err(SourceError::Io(_))
        ));
    }
}
