#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Country, continent and region grouping types.
//!
//! These types describe the static reference geography that case counts
//! are joined against. They carry no geometry; polygons live in the
//! spatial registry that owns them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the synthetic region that aggregates every country.
pub const WORLD: &str = "World";

/// A country as known to the reference geography.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryInfo {
    /// Display name, unique among countries (e.g. "France").
    pub name: String,
    /// ISO 3166-1 alpha-3 code (e.g. "FRA"), used to join population data.
    pub iso_a3: String,
    /// Continent this country belongs to (e.g. "Europe").
    pub continent: String,
    /// Population estimate, if known.
    pub population: Option<u64>,
}

/// The level at which case counts are grouped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RegionKind {
    /// One row per country.
    #[default]
    Country,
    /// Countries summed per continent.
    Continent,
    /// Every country summed into a single [`WORLD`] row.
    World,
}

impl RegionKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Country, Self::Continent, Self::World]
    }

    /// Whether rows of this kind are sums over several countries.
    #[must_use]
    pub const fn is_aggregate(self) -> bool {
        !matches!(self, Self::Country)
    }
}
