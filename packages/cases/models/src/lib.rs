#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Case count, derived metric and query key types.
//!
//! A [`RawCaseRow`] is one line of the persisted snapshot. Building a
//! dataset turns raw rows into [`CaseRecord`]s, which carry the counts plus
//! every [`DerivedMetrics`] value a chart may bind to.

pub mod metric;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use corona_board_geography_models::{RegionKind, WORLD};
pub use metric::{Metric, UnknownMetric};

/// Per-capita rates are expressed per this many residents.
pub const PER_CAPITA_SCALE: f64 = 10_000.0;

/// Date formats accepted for report dates: ISO, upstream `M/D/YY`, and the
/// legacy `YYYY/MM/DD`.
const REPORT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%Y/%m/%d", "%m/%d/%Y"];

/// Parses a report date in any of the accepted formats.
#[must_use]
pub fn parse_report_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    REPORT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// One (region, date) observation as persisted in the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawCaseRow {
    /// Country name.
    #[serde(rename = "Country")]
    pub region: String,
    /// Calendar day of the observation.
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Cumulative confirmed cases.
    #[serde(rename = "Confirmed")]
    pub confirmed: u64,
    /// Cumulative deaths.
    #[serde(rename = "Deaths")]
    pub deaths: u64,
    /// Cumulative recoveries.
    #[serde(rename = "Recovered")]
    pub recovered: u64,
}

impl RawCaseRow {
    /// Counts carried by this row.
    #[must_use]
    pub const fn counts(&self) -> CaseCounts {
        CaseCounts {
            confirmed: self.confirmed,
            deaths: self.deaths,
            recovered: self.recovered,
        }
    }
}

/// Cumulative counts for one region on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCounts {
    /// Cumulative confirmed cases.
    pub confirmed: u64,
    /// Cumulative deaths.
    pub deaths: u64,
    /// Cumulative recoveries.
    pub recovered: u64,
}

impl CaseCounts {
    /// Confirmed cases that are neither dead nor recovered.
    ///
    /// Signed because upstream corrections occasionally push deaths plus
    /// recoveries above the confirmed count.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn active(&self) -> i64 {
        self.confirmed as i64 - self.deaths as i64 - self.recovered as i64
    }

    /// Confirmed plus deaths plus recovered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.confirmed + self.deaths + self.recovered
    }

    /// Adds another set of counts to this one.
    pub const fn accumulate(&mut self, other: &Self) {
        self.confirmed += other.confirmed;
        self.deaths += other.deaths;
        self.recovered += other.recovered;
    }
}

impl std::ops::Add for CaseCounts {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.accumulate(&rhs);
        self
    }
}

impl std::iter::Sum for CaseCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, counts| acc + counts)
    }
}

/// Day-over-day change of the cumulative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChange {
    /// New confirmed cases.
    pub confirmed: i64,
    /// New deaths.
    pub deaths: i64,
    /// New recoveries.
    pub recovered: i64,
}

impl DailyChange {
    /// Change from `prior` to `current`; a missing prior counts as zero.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn between(current: &CaseCounts, prior: Option<&CaseCounts>) -> Self {
        let prior = prior.copied().unwrap_or_default();
        Self {
            confirmed: current.confirmed as i64 - prior.confirmed as i64,
            deaths: current.deaths as i64 - prior.deaths as i64,
            recovered: current.recovered as i64 - prior.recovered as i64,
        }
    }

    /// Adds another change to this one.
    pub const fn accumulate(&mut self, other: &Self) {
        self.confirmed += other.confirmed;
        self.deaths += other.deaths;
        self.recovered += other.recovered;
    }
}

/// Values computed from counts, the daily change and the population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Day-over-day change.
    pub daily: DailyChange,
    /// `deaths / (deaths + recovered)`, or 0 when nothing is closed yet.
    pub death_rate: f64,
    /// Active cases per 10k residents.
    pub active_per_10k: Option<f64>,
    /// Confirmed cases per 10k residents.
    pub confirmed_per_10k: Option<f64>,
    /// Deaths per 10k residents.
    pub deaths_per_10k: Option<f64>,
    /// Recoveries per 10k residents.
    pub recovered_per_10k: Option<f64>,
    /// `(confirmed + deaths + recovered) / population`.
    pub contamination: Option<f64>,
}

impl DerivedMetrics {
    /// Computes every derived value. Per-capita values are `None` when the
    /// population is unknown or zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(counts: &CaseCounts, daily: DailyChange, population: Option<u64>) -> Self {
        let closed = counts.deaths + counts.recovered;
        let death_rate = if closed == 0 {
            0.0
        } else {
            counts.deaths as f64 / closed as f64
        };

        let population = population.filter(|&p| p > 0).map(|p| p as f64);
        let per_10k = |count: f64| population.map(|p| count * PER_CAPITA_SCALE / p);

        Self {
            daily,
            death_rate,
            active_per_10k: per_10k(counts.active() as f64),
            confirmed_per_10k: per_10k(counts.confirmed as f64),
            deaths_per_10k: per_10k(counts.deaths as f64),
            recovered_per_10k: per_10k(counts.recovered as f64),
            contamination: population.map(|p| counts.total() as f64 / p),
        }
    }

    /// Metrics of a synthetic zero-count row: every value is an explicit zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            daily: DailyChange {
                confirmed: 0,
                deaths: 0,
                recovered: 0,
            },
            death_rate: 0.0,
            active_per_10k: Some(0.0),
            confirmed_per_10k: Some(0.0),
            deaths_per_10k: Some(0.0),
            recovered_per_10k: Some(0.0),
            contamination: Some(0.0),
        }
    }
}

/// A (region, date) observation with every derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    /// Country, continent or [`WORLD`].
    pub region: String,
    /// Continent of a country row, if the country is registered.
    pub continent: Option<String>,
    /// Calendar day.
    pub date: NaiveDate,
    /// Days since the first report in the dataset, starting at 1.
    pub day: u32,
    /// Cumulative counts.
    pub counts: CaseCounts,
    /// Population of the region, if known.
    pub population: Option<u64>,
    /// Derived values.
    pub metrics: DerivedMetrics,
}

impl CaseRecord {
    /// Builds a record and computes its derived metrics.
    #[must_use]
    pub fn new(
        region: String,
        continent: Option<String>,
        date: NaiveDate,
        day: u32,
        counts: CaseCounts,
        daily: DailyChange,
        population: Option<u64>,
    ) -> Self {
        Self {
            region,
            continent,
            date,
            day,
            counts,
            population,
            metrics: DerivedMetrics::compute(&counts, daily, population),
        }
    }

    /// A zero-count placeholder for a region missing on `date`.
    #[must_use]
    pub const fn zero(
        region: String,
        continent: Option<String>,
        date: NaiveDate,
        day: u32,
        population: Option<u64>,
    ) -> Self {
        Self {
            region,
            continent,
            date,
            day,
            counts: CaseCounts {
                confirmed: 0,
                deaths: 0,
                recovered: 0,
            },
            population,
            metrics: DerivedMetrics::zero(),
        }
    }

    /// Active cases (confirmed minus deaths minus recovered).
    #[must_use]
    pub const fn active(&self) -> i64 {
        self.counts.active()
    }

    /// Reads one metric as a float. `None` when the value is undefined
    /// (per-capita values with unknown population).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Confirmed => Some(self.counts.confirmed as f64),
            Metric::Active => Some(self.active() as f64),
            Metric::Deaths => Some(self.counts.deaths as f64),
            Metric::Recovered => Some(self.counts.recovered as f64),
            Metric::DeathRate => Some(self.metrics.death_rate),
            Metric::DailyConfirmed => Some(self.metrics.daily.confirmed as f64),
            Metric::DailyDeaths => Some(self.metrics.daily.deaths as f64),
            Metric::DailyRecovered => Some(self.metrics.daily.recovered as f64),
            Metric::Population => self.population.map(|p| p as f64),
            Metric::Contamination => self.metrics.contamination,
            Metric::ActivePer10k => self.metrics.active_per_10k,
            Metric::ConfirmedPer10k => self.metrics.confirmed_per_10k,
            Metric::DeathsPer10k => self.metrics.deaths_per_10k,
            Metric::RecoveredPer10k => self.metrics.recovered_per_10k,
        }
    }
}

/// Identifies a day either by report offset or by calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "by", content = "value")]
pub enum DayKey {
    /// Days since the first report (1-based).
    Report(u32),
    /// Calendar date.
    Calendar(NaiveDate),
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Report(day) => write!(f, "{day}"),
            Self::Calendar(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Error returned when a day key is neither a positive integer nor an ISO
/// date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid day '{value}': expected a report day number or YYYY-MM-DD")]
pub struct InvalidDayKey {
    /// The rejected input.
    pub value: String,
}

impl FromStr for DayKey {
    type Err = InvalidDayKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(day) = s.parse::<u32>() {
            if day > 0 {
                return Ok(Self::Report(day));
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Calendar(date));
        }
        Err(InvalidDayKey {
            value: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn counts(confirmed: u64, deaths: u64, recovered: u64) -> CaseCounts {
        CaseCounts {
            confirmed,
            deaths,
            recovered,
        }
    }

    #[test]
    fn active_is_confirmed_minus_closed() {
        assert_eq!(counts(150, 2, 20).active(), 128);
        assert_eq!(counts(5, 4, 3).active(), -2);
    }

    #[test]
    fn death_rate_is_zero_without_closed_cases() {
        let metrics = DerivedMetrics::compute(&counts(10, 0, 0), DailyChange::default(), None);
        assert!(metrics.death_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn death_rate_uses_closed_cases() {
        let metrics = DerivedMetrics::compute(&counts(150, 2, 20), DailyChange::default(), None);
        assert!((metrics.death_rate - 2.0 / 22.0).abs() < 1e-12);
    }

    #[test]
    fn per_capita_values_need_population() {
        let metrics = DerivedMetrics::compute(&counts(150, 2, 20), DailyChange::default(), None);
        assert!(metrics.confirmed_per_10k.is_none());
        assert!(metrics.contamination.is_none());

        let metrics = DerivedMetrics::compute(&counts(150, 2, 20), DailyChange::default(), Some(0));
        assert!(metrics.confirmed_per_10k.is_none());
    }

    #[test]
    fn per_capita_values_scale_by_ten_thousand() {
        let metrics =
            DerivedMetrics::compute(&counts(150, 2, 20), DailyChange::default(), Some(1000));
        assert!((metrics.confirmed_per_10k.unwrap() - 1500.0).abs() < 1e-9);
        assert!((metrics.active_per_10k.unwrap() - 1280.0).abs() < 1e-9);
        assert!((metrics.deaths_per_10k.unwrap() - 20.0).abs() < 1e-9);
        assert!((metrics.recovered_per_10k.unwrap() - 200.0).abs() < 1e-9);
        assert!((metrics.contamination.unwrap() - 0.172).abs() < 1e-12);
    }

    #[test]
    fn daily_change_treats_missing_prior_as_zero() {
        let current = counts(150, 2, 20);
        assert_eq!(
            DailyChange::between(&current, None),
            DailyChange {
                confirmed: 150,
                deaths: 2,
                recovered: 20
            }
        );
        assert_eq!(
            DailyChange::between(&current, Some(&counts(100, 1, 10))),
            DailyChange {
                confirmed: 50,
                deaths: 1,
                recovered: 10
            }
        );
    }

    #[test]
    fn zero_record_has_explicit_zero_rates() {
        let record = CaseRecord::zero("Alpha".to_string(), None, date("2020-03-01"), 1, None);
        for metric in Metric::all() {
            if metric == Metric::Population {
                assert!(record.value(metric).is_none());
            } else {
                assert_eq!(record.value(metric), Some(0.0), "{metric}");
            }
        }
    }

    #[test]
    fn counts_sum() {
        let total: CaseCounts = [counts(1, 2, 3), counts(10, 20, 30)].into_iter().sum();
        assert_eq!(total, counts(11, 22, 33));
    }

    #[test]
    fn parses_report_dates_in_every_format() {
        let expected = date("2020-03-01");
        assert_eq!(parse_report_date("2020-03-01"), Some(expected));
        assert_eq!(parse_report_date("3/1/20"), Some(expected));
        assert_eq!(parse_report_date("2020/03/01"), Some(expected));
        assert_eq!(parse_report_date(" 03/01/2020 "), Some(expected));
        assert_eq!(parse_report_date("March 1st"), None);
    }

    #[test]
    fn parses_day_keys() {
        assert_eq!("12".parse::<DayKey>().unwrap(), DayKey::Report(12));
        assert_eq!(
            "2020-03-02".parse::<DayKey>().unwrap(),
            DayKey::Calendar(date("2020-03-02"))
        );
        assert!("0".parse::<DayKey>().is_err());
        assert!("yesterday".parse::<DayKey>().is_err());
    }

    #[test]
    fn day_key_display_roundtrip() {
        for key in [DayKey::Report(3), DayKey::Calendar(date("2020-04-01"))] {
            assert_eq!(key.to_string().parse::<DayKey>().unwrap(), key);
        }
    }
}
