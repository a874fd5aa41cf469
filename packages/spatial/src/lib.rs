#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory country registry for case attribution and per-capita metrics.
//!
//! Loads country polygons (with continent and population) once at startup,
//! builds an R-tree over their bounding boxes, and provides point-in-polygon
//! and name lookups. The registry is immutable after construction.

pub mod population;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use corona_board_geography_models::CountryInfo;
use geo::{Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};

/// `GeoJSON` feature property holding the country display name.
pub const NAME_PROPERTY: &str = "ADMIN";
/// `GeoJSON` feature property holding the ISO alpha-3 code.
pub const ISO_PROPERTY: &str = "ADM0_A3";
/// `GeoJSON` feature property holding the continent name.
pub const CONTINENT_PROPERTY: &str = "CONTINENT";
/// `GeoJSON` feature property holding the built-in population estimate.
pub const POPULATION_PROPERTY: &str = "POP_EST";

/// Errors raised while loading reference or snapshot data.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The input parsed but its content is unusable.
    #[error("Malformed data: {message}")]
    Malformed {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<geojson::Error> for DataLoadError {
    fn from(value: geojson::Error) -> Self {
        Self::GeoJson(Box::new(value))
    }
}

/// A country with its geometry, as handed to [`GeoRegistry::from_countries`].
#[derive(Debug, Clone)]
pub struct CountryShape {
    /// Reference attributes.
    pub info: CountryInfo,
    /// Country outline (`Polygon` or `MultiPolygon`).
    pub geometry: geojson::Geometry,
}

/// A registered country: attributes, the original geometry for rendering,
/// and the converted polygon for containment tests.
struct CountryEntry {
    info: CountryInfo,
    geometry: geojson::Geometry,
    polygon: MultiPolygon<f64>,
}

/// R-tree node pointing back into the load-ordered country list.
struct CountryEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CountryEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Static reference geography for every known country.
pub struct GeoRegistry {
    countries: Vec<CountryEntry>,
    by_name: BTreeMap<String, usize>,
    /// continent -> member indexes, in load order
    by_continent: BTreeMap<String, Vec<usize>>,
    index: RTree<CountryEnvelope>,
}

impl std::fmt::Debug for GeoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoRegistry")
            .field("countries", &self.countries.len())
            .field("continents", &self.by_continent.len())
            .finish_non_exhaustive()
    }
}

impl GeoRegistry {
    /// Loads country polygons from a `GeoJSON` file and, optionally,
    /// population from a World Bank export.
    ///
    /// When `population_csv` is `None` the `POP_EST` feature property is used.
    ///
    /// # Errors
    ///
    /// Returns [`DataLoadError`] if either file is missing or malformed.
    pub fn load(countries_geojson: &Path, population_csv: Option<&Path>) -> Result<Self, DataLoadError> {
        let text = std::fs::read_to_string(countries_geojson)?;

        let populations = population_csv
            .map(|path| {
                let file = std::fs::File::open(path)?;
                population::parse_world_bank(file)
            })
            .transpose()?;

        let registry = Self::from_geojson_str(&text, populations.as_ref())?;
        log::info!(
            "Loaded {} countries across {} continents from {}",
            registry.countries.len(),
            registry.by_continent.len(),
            countries_geojson.display()
        );

        Ok(registry)
    }

    /// Parses a `GeoJSON` `FeatureCollection` of countries.
    ///
    /// `populations` maps ISO alpha-3 codes to population and, when given,
    /// replaces the `POP_EST` property entirely.
    ///
    /// # Errors
    ///
    /// Returns [`DataLoadError`] if the text is not a feature collection, a
    /// feature lacks a name, continent or polygon geometry, or two features
    /// share a name.
    pub fn from_geojson_str(
        text: &str,
        populations: Option<&BTreeMap<String, u64>>,
    ) -> Result<Self, DataLoadError> {
        let geojson: GeoJson = text.parse()?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(DataLoadError::Malformed {
                message: "country geometry must be a FeatureCollection".to_string(),
            });
        };

        let mut shapes = Vec::with_capacity(collection.features.len());

        for (position, feature) in collection.features.into_iter().enumerate() {
            let name = string_property(&feature, NAME_PROPERTY).ok_or_else(|| {
                DataLoadError::Malformed {
                    message: format!("feature #{position} has no {NAME_PROPERTY} property"),
                }
            })?;
            let continent = string_property(&feature, CONTINENT_PROPERTY).ok_or_else(|| {
                DataLoadError::Malformed {
                    message: format!("country {name} has no {CONTINENT_PROPERTY} property"),
                }
            })?;
            let iso_a3 = string_property(&feature, ISO_PROPERTY).unwrap_or_default();

            let population = match populations {
                Some(map) => map.get(&iso_a3).copied(),
                None => feature
                    .property(POPULATION_PROPERTY)
                    .and_then(population_value),
            };

            let Some(geometry) = feature.geometry else {
                return Err(DataLoadError::Malformed {
                    message: format!("country {name} has no geometry"),
                });
            };

            shapes.push(CountryShape {
                info: CountryInfo {
                    name,
                    iso_a3,
                    continent,
                    population,
                },
                geometry,
            });
        }

        Self::from_countries(shapes)
    }

    /// Builds a registry from in-memory countries, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns [`DataLoadError::Malformed`] on duplicate names or geometry
    /// that is not a `Polygon`/`MultiPolygon`.
    pub fn from_countries(shapes: Vec<CountryShape>) -> Result<Self, DataLoadError> {
        let mut countries = Vec::with_capacity(shapes.len());
        let mut by_name = BTreeMap::new();
        let mut by_continent: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut envelopes = Vec::with_capacity(shapes.len());

        for (index, shape) in shapes.into_iter().enumerate() {
            let Some(polygon) = to_multipolygon(&shape.geometry) else {
                return Err(DataLoadError::Malformed {
                    message: format!("country {} geometry is not a polygon", shape.info.name),
                });
            };

            if by_name.insert(shape.info.name.clone(), index).is_some() {
                return Err(DataLoadError::Malformed {
                    message: format!("duplicate country name {}", shape.info.name),
                });
            }

            by_continent
                .entry(shape.info.continent.clone())
                .or_default()
                .push(index);

            envelopes.push(CountryEnvelope {
                index,
                envelope: compute_envelope(&polygon),
            });

            countries.push(CountryEntry {
                info: shape.info,
                geometry: shape.geometry,
                polygon,
            });
        }

        Ok(Self {
            countries,
            by_name,
            by_continent,
            index: RTree::bulk_load(envelopes),
        })
    }

    /// Finds the country whose polygon contains the point.
    ///
    /// When polygons overlap, the country loaded first wins. Points exactly
    /// on a shared border may match either neighbour or neither; this is an
    /// accepted approximation.
    #[must_use]
    pub fn lookup_by_point(&self, lon: f64, lat: f64) -> Option<&CountryInfo> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.index
            .locate_in_envelope_intersecting(&query_env)
            .filter(|candidate| self.countries[candidate.index].polygon.contains(&point))
            .map(|candidate| candidate.index)
            .min()
            .map(|index| &self.countries[index].info)
    }

    /// Looks up a country by exact name.
    #[must_use]
    pub fn country(&self, name: &str) -> Option<&CountryInfo> {
        self.by_name.get(name).map(|&index| &self.countries[index].info)
    }

    /// Whether a country with this exact name is registered.
    #[must_use]
    pub fn contains_country(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Country names in load order.
    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.countries.iter().map(|entry| entry.info.name.as_str())
    }

    /// All registered countries in load order.
    pub fn country_infos(&self) -> impl Iterator<Item = &CountryInfo> {
        self.countries.iter().map(|entry| &entry.info)
    }

    /// Number of registered countries.
    #[must_use]
    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    /// Distinct continent names, sorted.
    #[must_use]
    pub fn continents(&self) -> BTreeSet<&str> {
        self.by_continent.keys().map(String::as_str).collect()
    }

    /// Whether any country belongs to this continent.
    #[must_use]
    pub fn contains_continent(&self, continent: &str) -> bool {
        self.by_continent.contains_key(continent)
    }

    /// Member countries of a continent, in load order.
    pub fn countries_in<'a>(&'a self, continent: &str) -> impl Iterator<Item = &'a CountryInfo> + use<'a> {
        self.by_continent
            .get(continent)
            .into_iter()
            .flatten()
            .map(|&index| &self.countries[index].info)
    }

    /// Population of a country, if both the country and its population are
    /// known.
    #[must_use]
    pub fn population_of(&self, country: &str) -> Option<u64> {
        self.country(country).and_then(|info| info.population)
    }

    /// Continent of a country.
    #[must_use]
    pub fn continent_of(&self, country: &str) -> Option<&str> {
        self.country(country).map(|info| info.continent.as_str())
    }

    /// Sum of the known member populations of a continent, or `None` if no
    /// member has a known population.
    #[must_use]
    pub fn continent_population(&self, continent: &str) -> Option<u64> {
        self.countries_in(continent)
            .filter_map(|info| info.population)
            .fold(None, |acc, population| Some(acc.unwrap_or(0) + population))
    }

    /// Original outline of a country, for rendering.
    #[must_use]
    pub fn geometry_of(&self, country: &str) -> Option<&geojson::Geometry> {
        self.by_name
            .get(country)
            .map(|&index| &self.countries[index].geometry)
    }
}

fn string_property(feature: &geojson::Feature, key: &str) -> Option<String> {
    feature
        .property(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn population_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let rounded = f.round() as u64;
                    rounded
                })
        }),
        serde_json::Value::String(s) => population::parse_population(s),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.clone().try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{CountryShape, GeoRegistry};
    use corona_board_geography_models::CountryInfo;

    /// Axis-aligned square polygon with its lower-left corner at `(x, y)`.
    pub fn square(x: f64, y: f64, size: f64) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![x, y],
            vec![x + size, y],
            vec![x + size, y + size],
            vec![x, y + size],
            vec![x, y],
        ]]))
    }

    pub fn shape(name: &str, continent: &str, population: Option<u64>, geometry: geojson::Geometry) -> CountryShape {
        CountryShape {
            info: CountryInfo {
                name: name.to_string(),
                iso_a3: name.chars().take(3).collect::<String>().to_uppercase(),
                continent: continent.to_string(),
                population,
            },
            geometry,
        }
    }

    pub fn registry() -> GeoRegistry {
        GeoRegistry::from_countries(vec![
            shape("Alpha", "Westland", Some(1000), square(0.0, 0.0, 10.0)),
            shape("Beta", "Westland", None, square(10.0, 0.0, 10.0)),
            shape("Gamma", "Eastland", Some(500), square(0.0, 20.0, 10.0)),
            // overlaps Gamma's upper half; loaded after it
            shape("Delta", "Eastland", Some(250), square(0.0, 25.0, 10.0)),
        ])
        .unwrap()
    }
}
