//! Table columns a chart can bind to.
//!
//! Every [`Metric`] has a short column code (`"CODay"`) and a human
//! description (`"Daily confirmed"`). Both directions are validated: an
//! unknown code or description is an [`UnknownMetric`] error.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A numeric column of a case table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum Metric {
    /// Cumulative confirmed cases.
    #[strum(serialize = "Confirmed")]
    #[serde(rename = "Confirmed")]
    Confirmed,
    /// Confirmed minus deaths minus recovered.
    #[strum(serialize = "Active")]
    #[serde(rename = "Active")]
    Active,
    /// Cumulative deaths.
    #[strum(serialize = "Deaths")]
    #[serde(rename = "Deaths")]
    Deaths,
    /// Cumulative recoveries.
    #[strum(serialize = "Recovered")]
    #[serde(rename = "Recovered")]
    Recovered,
    /// Deaths over closed cases (deaths + recovered).
    #[strum(serialize = "LRate")]
    #[serde(rename = "LRate")]
    DeathRate,
    /// New confirmed cases since the previous day.
    #[strum(serialize = "CODay")]
    #[serde(rename = "CODay")]
    DailyConfirmed,
    /// New deaths since the previous day.
    #[strum(serialize = "DEDay")]
    #[serde(rename = "DEDay")]
    DailyDeaths,
    /// New recoveries since the previous day.
    #[strum(serialize = "REDay")]
    #[serde(rename = "REDay")]
    DailyRecovered,
    /// Population size.
    #[strum(serialize = "PopSize")]
    #[serde(rename = "PopSize")]
    Population,
    /// Share of the population ever counted (confirmed + deaths + recovered).
    #[strum(serialize = "PrcCont")]
    #[serde(rename = "PrcCont")]
    Contamination,
    /// Active cases per 10,000 residents.
    #[strum(serialize = "AC10K")]
    #[serde(rename = "AC10K")]
    ActivePer10k,
    /// Confirmed cases per 10,000 residents.
    #[strum(serialize = "CO10K")]
    #[serde(rename = "CO10K")]
    ConfirmedPer10k,
    /// Deaths per 10,000 residents.
    #[strum(serialize = "DE10K")]
    #[serde(rename = "DE10K")]
    DeathsPer10k,
    /// Recoveries per 10,000 residents.
    #[strum(serialize = "RE10K")]
    #[serde(rename = "RE10K")]
    RecoveredPer10k,
}

/// Error returned for a metric code or description that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric '{name}'")]
pub struct UnknownMetric {
    /// The rejected input.
    pub name: String,
}

impl Metric {
    /// All metrics in display order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Short column code (e.g. `"CODay"`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Active => "Active",
            Self::Deaths => "Deaths",
            Self::Recovered => "Recovered",
            Self::DeathRate => "LRate",
            Self::DailyConfirmed => "CODay",
            Self::DailyDeaths => "DEDay",
            Self::DailyRecovered => "REDay",
            Self::Population => "PopSize",
            Self::Contamination => "PrcCont",
            Self::ActivePer10k => "AC10K",
            Self::ConfirmedPer10k => "CO10K",
            Self::DeathsPer10k => "DE10K",
            Self::RecoveredPer10k => "RE10K",
        }
    }

    /// Human-readable label shown in selectors and tooltips.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Active => "Active",
            Self::Deaths => "Deaths",
            Self::Recovered => "Recovered",
            Self::DeathRate => "Lethality rate",
            Self::DailyConfirmed => "Daily confirmed",
            Self::DailyDeaths => "Daily deaths",
            Self::DailyRecovered => "Daily recovered",
            Self::Population => "Population size",
            Self::Contamination => "Contaminated population (%)",
            Self::ActivePer10k => "Active per 10K",
            Self::ConfirmedPer10k => "Confirmed per 10K",
            Self::DeathsPer10k => "Deaths per 10K",
            Self::RecoveredPer10k => "Recovered per 10K",
        }
    }

    /// Whether the metric is a ratio rather than a count.
    #[must_use]
    pub const fn is_rate(self) -> bool {
        matches!(
            self,
            Self::DeathRate
                | Self::Contamination
                | Self::ActivePer10k
                | Self::ConfirmedPer10k
                | Self::DeathsPer10k
                | Self::RecoveredPer10k
        )
    }

    /// Parses a column code.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMetric`] if no metric has this code.
    pub fn from_code(code: &str) -> Result<Self, UnknownMetric> {
        Self::from_str(code).map_err(|_| UnknownMetric {
            name: code.to_string(),
        })
    }

    /// Parses a human-readable description.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMetric`] if no metric has this description.
    pub fn from_description(description: &str) -> Result<Self, UnknownMetric> {
        Self::iter()
            .find(|metric| metric.description() == description)
            .ok_or_else(|| UnknownMetric {
                name: description.to_string(),
            })
    }

    /// Parses either a code or a description.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMetric`] if the input matches neither.
    pub fn parse(name: &str) -> Result<Self, UnknownMetric> {
        Self::from_code(name).or_else(|_| Self::from_description(name))
    }
}
