//! Read-only views over a [`CaseDataset`].
//!
//! Every function here is pure: it reads a dataset snapshot and the
//! reference geography and returns freshly built rows. Aggregated rows
//! (continent, world) sum counts and daily changes first and recompute
//! rates on the sums, so a continent's death rate is never an average of
//! its countries' rates.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use corona_board_case_models::{
    CaseCounts, CaseRecord, DailyChange, DayKey, Metric, RegionKind, WORLD,
};
use corona_board_spatial::GeoRegistry;
use serde::Serialize;

use crate::CaseDataset;

/// Parameters of a [`day_slice`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DaySliceQuery {
    /// Day to slice.
    pub day: DayKey,
    /// Row granularity.
    pub grouping: RegionKind,
    /// Emit a zero row for every known region missing on this day.
    pub fill: bool,
    /// Attach country outlines (country grouping only).
    pub include_geometry: bool,
}

impl DaySliceQuery {
    /// A country-level query without fill or geometry.
    #[must_use]
    pub const fn new(day: DayKey) -> Self {
        Self {
            day,
            grouping: RegionKind::Country,
            fill: false,
            include_geometry: false,
        }
    }

    /// Sets the row granularity.
    #[must_use]
    pub const fn grouped_by(mut self, grouping: RegionKind) -> Self {
        self.grouping = grouping;
        self
    }

    /// Enables or disables zero-filling.
    #[must_use]
    pub const fn filled(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    /// Enables or disables country outlines.
    #[must_use]
    pub const fn with_geometry(mut self, include_geometry: bool) -> Self {
        self.include_geometry = include_geometry;
        self
    }
}

/// One row of a [`DayTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRow {
    /// Counts and derived values.
    #[serde(flatten)]
    pub record: CaseRecord,
    /// Country outline, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<geojson::Geometry>,
}

/// All regions of one grouping on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTable {
    /// Calendar day.
    pub date: NaiveDate,
    /// Report day.
    pub day: u32,
    /// Row granularity.
    pub grouping: RegionKind,
    /// Rows, in registry order for filled country tables, otherwise by
    /// region name.
    pub rows: Vec<DayRow>,
}

impl DayTable {
    /// Looks up a row by region name.
    #[must_use]
    pub fn row(&self, region: &str) -> Option<&DayRow> {
        self.rows.iter().find(|row| row.record.region == region)
    }

    /// Region names in row order.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.record.region.as_str())
    }
}

/// Builds the table of one day.
///
/// Returns `None` when the dataset has no records on that day.
#[must_use]
pub fn day_slice(
    dataset: &CaseDataset,
    registry: &GeoRegistry,
    query: DaySliceQuery,
) -> Option<DayTable> {
    let (date, day) = dataset.resolve_day(query.day)?;
    let records = dataset.records_on_day(day);

    let mut rows: Vec<CaseRecord> = match query.grouping {
        RegionKind::Country => country_rows(records, registry, date, day, query.fill),
        RegionKind::Continent => continent_rows(records, registry, date, day, query.fill),
        RegionKind::World => vec![world_row(records, registry, date, day)],
    };

    if !(query.fill && query.grouping == RegionKind::Country) {
        rows.sort_by(|a, b| a.region.cmp(&b.region));
    }

    let attach_geometry = query.include_geometry && query.grouping == RegionKind::Country;

    let rows = rows
        .into_iter()
        .map(|record| {
            let geometry = attach_geometry
                .then(|| registry.geometry_of(&record.region).cloned())
                .flatten();
            DayRow { record, geometry }
        })
        .collect();

    Some(DayTable {
        date,
        day,
        grouping: query.grouping,
        rows,
    })
}

fn country_rows(
    records: &[CaseRecord],
    registry: &GeoRegistry,
    date: NaiveDate,
    day: u32,
    fill: bool,
) -> Vec<CaseRecord> {
    if !fill {
        return records.to_vec();
    }

    let by_region: BTreeMap<&str, &CaseRecord> = records
        .iter()
        .map(|record| (record.region.as_str(), record))
        .collect();

    registry
        .country_infos()
        .map(|info| {
            by_region.get(info.name.as_str()).map_or_else(
                || {
                    CaseRecord::zero(
                        info.name.clone(),
                        Some(info.continent.clone()),
                        date,
                        day,
                        info.population,
                    )
                },
                |record| (*record).clone(),
            )
        })
        .collect()
}

fn continent_rows(
    records: &[CaseRecord],
    registry: &GeoRegistry,
    date: NaiveDate,
    day: u32,
    fill: bool,
) -> Vec<CaseRecord> {
    let mut groups: BTreeMap<&str, Vec<&CaseRecord>> = BTreeMap::new();
    for record in records {
        if let Some(continent) = record.continent.as_deref() {
            groups.entry(continent).or_default().push(record);
        }
    }

    if fill {
        for continent in registry.continents() {
            groups.entry(continent).or_default();
        }
    }

    groups
        .into_iter()
        .map(|(continent, members)| {
            let population = registry.continent_population(continent);
            if members.is_empty() {
                CaseRecord::zero(continent.to_string(), None, date, day, population)
            } else {
                aggregate(continent, date, day, members, population)
            }
        })
        .collect()
}

fn world_row(
    records: &[CaseRecord],
    registry: &GeoRegistry,
    date: NaiveDate,
    day: u32,
) -> CaseRecord {
    aggregate(WORLD, date, day, records.iter(), world_population(registry))
}

/// Sum of every known country population.
fn world_population(registry: &GeoRegistry) -> Option<u64> {
    registry
        .country_infos()
        .filter_map(|info| info.population)
        .fold(None, |acc, population| Some(acc.unwrap_or(0) + population))
}

/// Sums member counts and daily changes, then computes rates on the sums.
fn aggregate<'a>(
    region: &str,
    date: NaiveDate,
    day: u32,
    members: impl IntoIterator<Item = &'a CaseRecord>,
    population: Option<u64>,
) -> CaseRecord {
    let mut counts = CaseCounts::default();
    let mut daily = DailyChange::default();
    for member in members {
        counts.accumulate(&member.counts);
        daily.accumulate(&member.metrics.daily);
    }
    CaseRecord::new(region.to_string(), None, date, day, counts, daily, population)
}

/// Time series of one country, ascending by date.
///
/// With `fill`, every dataset date appears; days without a record become
/// zero rows. An unknown country yields an empty series.
#[must_use]
pub fn country_series(
    dataset: &CaseDataset,
    registry: &GeoRegistry,
    country: &str,
    fill: bool,
) -> Vec<CaseRecord> {
    let observed: Vec<&CaseRecord> = dataset.records_for(country).collect();
    let info = registry.country(country);

    if !fill || (observed.is_empty() && info.is_none()) {
        return observed.into_iter().cloned().collect();
    }

    let continent = info.map(|info| info.continent.clone());
    let population = info.and_then(|info| info.population);
    let by_date: BTreeMap<NaiveDate, &CaseRecord> =
        observed.iter().map(|record| (record.date, *record)).collect();

    dataset
        .dates()
        .iter()
        .filter_map(|date| {
            by_date.get(date).map_or_else(
                || {
                    dataset.day_of(*date).map(|day| {
                        CaseRecord::zero(
                            country.to_string(),
                            continent.clone(),
                            *date,
                            day,
                            population,
                        )
                    })
                },
                |record| Some((*record).clone()),
            )
        })
        .collect()
}

/// Time series of one continent (sum of its member countries), ascending
/// by date.
///
/// With `fill`, dates on which no member reported become zero rows. An
/// unknown continent yields an empty series.
#[must_use]
pub fn continent_series(
    dataset: &CaseDataset,
    registry: &GeoRegistry,
    continent: &str,
    fill: bool,
) -> Vec<CaseRecord> {
    if !registry.contains_continent(continent) {
        return Vec::new();
    }
    let population = registry.continent_population(continent);

    dataset
        .dates()
        .iter()
        .filter_map(|date| {
            let day = dataset.day_of(*date)?;
            let members: Vec<&CaseRecord> = dataset
                .records_on_day(day)
                .iter()
                .filter(|record| record.continent.as_deref() == Some(continent))
                .collect();

            if members.is_empty() {
                fill.then(|| CaseRecord::zero(continent.to_string(), None, *date, day, population))
            } else {
                Some(aggregate(continent, *date, day, members, population))
            }
        })
        .collect()
}

/// Time series of every region summed together, ascending by date.
#[must_use]
pub fn world_series(dataset: &CaseDataset, registry: &GeoRegistry) -> Vec<CaseRecord> {
    let population = world_population(registry);

    dataset
        .dates()
        .iter()
        .filter_map(|date| {
            let day = dataset.day_of(*date)?;
            Some(aggregate(
                WORLD,
                *date,
                day,
                dataset.records_on_day(day),
                population,
            ))
        })
        .collect()
}

/// Dispatches to the series function matching `kind`. `name` is ignored
/// for [`RegionKind::World`].
#[must_use]
pub fn region_series(
    dataset: &CaseDataset,
    registry: &GeoRegistry,
    kind: RegionKind,
    name: &str,
    fill: bool,
) -> Vec<CaseRecord> {
    match kind {
        RegionKind::Country => country_series(dataset, registry, name, fill),
        RegionKind::Continent => continent_series(dataset, registry, name, fill),
        RegionKind::World => world_series(dataset, registry),
    }
}

/// A day and the day before it, restricted to regions present on both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayComparison {
    /// Calendar day of `current`.
    pub date: NaiveDate,
    /// Report day of `current`.
    pub day: u32,
    /// Row granularity.
    pub grouping: RegionKind,
    /// Rows of the requested day.
    pub current: Vec<CaseRecord>,
    /// Rows of the previous day; `previous[i]` is the same region as
    /// `current[i]`.
    pub previous: Vec<CaseRecord>,
}

/// Ratio of two metrics for one region on both compared days.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRatio {
    /// Region name.
    pub region: String,
    /// `x / y` on the requested day.
    pub current: Option<f64>,
    /// `x / y` on the previous day.
    pub previous: Option<f64>,
}

impl DayComparison {
    /// Paired (current, previous) rows.
    pub fn pairs(&self) -> impl Iterator<Item = (&CaseRecord, &CaseRecord)> {
        self.current.iter().zip(&self.previous)
    }

    /// Per-region `x / y` on both days. Undefined when either value is
    /// unknown or `y` is zero.
    #[must_use]
    pub fn ratios(&self, x: Metric, y: Metric) -> Vec<DayRatio> {
        let ratio = |record: &CaseRecord| {
            let denominator = record.value(y).filter(|value| *value != 0.0)?;
            Some(record.value(x)? / denominator)
        };

        self.pairs()
            .map(|(current, previous)| DayRatio {
                region: current.region.clone(),
                current: ratio(current),
                previous: ratio(previous),
            })
            .collect()
    }
}

/// Compares a day with the day before it.
///
/// Regions are inner-joined: a region missing on either day is dropped
/// rather than zero-filled. Returns `None` when the requested day has no
/// records; when the previous day has none the comparison is empty.
#[must_use]
pub fn compare_consecutive_days(
    dataset: &CaseDataset,
    registry: &GeoRegistry,
    day: DayKey,
    grouping: RegionKind,
) -> Option<DayComparison> {
    let current = day_slice(dataset, registry, DaySliceQuery::new(day).grouped_by(grouping))?;

    let mut previous_rows: BTreeMap<String, CaseRecord> = current
        .day
        .checked_sub(1)
        .filter(|previous| *previous > 0)
        .and_then(|previous| {
            day_slice(
                dataset,
                registry,
                DaySliceQuery::new(DayKey::Report(previous)).grouped_by(grouping),
            )
        })
        .map(|table| {
            table
                .rows
                .into_iter()
                .map(|row| (row.record.region.clone(), row.record))
                .collect()
        })
        .unwrap_or_default();

    let mut comparison = DayComparison {
        date: current.date,
        day: current.day,
        grouping,
        current: Vec::new(),
        previous: Vec::new(),
    };

    for row in current.rows {
        if let Some(previous) = previous_rows.remove(&row.record.region) {
            comparison.current.push(row.record);
            comparison.previous.push(previous);
        }
    }

    Some(comparison)
}

/// Rows ordered by a metric, largest first, truncated to `limit`. Rows
/// where the metric is undefined sort last.
#[must_use]
pub fn rank(table: &DayTable, metric: Metric, limit: usize) -> Vec<&DayRow> {
    let mut rows: Vec<&DayRow> = table.rows.iter().collect();
    rows.sort_by(|a, b| {
        let a = a.record.value(metric);
        let b = b.record.value(metric);
        match (a, b) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, registry, row};

    fn dataset() -> CaseDataset {
        CaseDataset::build(
            vec![
                // Asia
                row("Chinaland", "2020-03-01", 100, 1, 10),
                row("Chinaland", "2020-03-02", 150, 2, 20),
                row("Japonia", "2020-03-02", 40, 10, 0),
                // Europe
                row("Francia", "2020-03-01", 10, 0, 0),
                row("Francia", "2020-03-02", 30, 0, 10),
                // unregistered
                row("Atlantis", "2020-03-02", 5, 0, 0),
            ],
            &registry(),
        )
    }

    #[test]
    fn unfilled_country_slice_has_only_reporting_regions() {
        let registry = registry();
        let table = day_slice(&dataset(), &registry, DaySliceQuery::new(DayKey::Report(1))).unwrap();
        let regions: Vec<&str> = table.regions().collect();
        assert_eq!(regions, vec!["Chinaland", "Francia"]);
        assert_eq!(table.date, date("2020-03-01"));
    }

    #[test]
    fn filled_country_slice_has_one_row_per_registered_country() {
        let registry = registry();
        let dataset = dataset();
        for day in 1..=2 {
            let table = day_slice(
                &dataset,
                &registry,
                DaySliceQuery::new(DayKey::Report(day)).filled(true),
            )
            .unwrap();
            let regions: Vec<&str> = table.regions().collect();
            let expected: Vec<&str> = registry.countries().collect();
            assert_eq!(regions, expected);
        }
    }

    #[test]
    fn filled_rows_have_explicit_zero_rates() {
        let registry = registry();
        let table = day_slice(
            &dataset(),
            &registry,
            DaySliceQuery::new(DayKey::Report(1)).filled(true),
        )
        .unwrap();
        // Europia has no population and no rows
        let europia = &table.row("Europia").unwrap().record;
        assert_eq!(europia.counts, CaseCounts::default());
        assert_eq!(europia.metrics.confirmed_per_10k, Some(0.0));
        assert_eq!(europia.metrics.contamination, Some(0.0));
        assert_eq!(europia.continent.as_deref(), Some("Europe"));
    }

    #[test]
    fn continent_death_rate_is_sum_then_rate() {
        let registry = registry();
        let dataset = CaseDataset::build(
            vec![
                row("Chinaland", "2020-03-01", 10, 10, 0),
                row("Japonia", "2020-03-01", 10, 0, 10),
            ],
            &registry,
        );
        let table = day_slice(
            &dataset,
            &registry,
            DaySliceQuery::new(DayKey::Report(1)).grouped_by(RegionKind::Continent),
        )
        .unwrap();
        let asia = &table.row("Asia").unwrap().record;
        assert!((asia.metrics.death_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn continent_per_capita_uses_summed_population() {
        let registry = registry();
        let table = day_slice(
            &dataset(),
            &registry,
            DaySliceQuery::new(DayKey::Report(2)).grouped_by(RegionKind::Continent),
        )
        .unwrap();
        let asia = &table.row("Asia").unwrap().record;
        assert_eq!(asia.counts.confirmed, 190);
        assert_eq!(asia.population, Some(5000));
        assert!((asia.metrics.confirmed_per_10k.unwrap() - 380.0).abs() < 1e-9);
        // Chinaland +50, Japonia +40 (first report)
        assert_eq!(asia.metrics.daily.confirmed, 90);
        assert!(table.row("Atlantis").is_none());
    }

    #[test]
    fn filled_continent_slice_lists_every_continent() {
        let registry = registry();
        let dataset = CaseDataset::build(vec![row("Chinaland", "2020-03-01", 1, 0, 0)], &registry);
        let table = day_slice(
            &dataset,
            &registry,
            DaySliceQuery::new(DayKey::Report(1))
                .grouped_by(RegionKind::Continent)
                .filled(true),
        )
        .unwrap();
        let regions: Vec<&str> = table.regions().collect();
        assert_eq!(regions, vec!["Asia", "Europe"]);
        assert_eq!(table.row("Europe").unwrap().record.counts.confirmed, 0);
    }

    #[test]
    fn world_slice_sums_every_region() {
        let registry = registry();
        let table = day_slice(
            &dataset(),
            &registry,
            DaySliceQuery::new(DayKey::Report(2)).grouped_by(RegionKind::World),
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
        let world = &table.rows[0].record;
        assert_eq!(world.region, WORLD);
        assert_eq!(world.counts.confirmed, 150 + 40 + 30 + 5);
        assert_eq!(world.population, Some(1000 + 4000 + 2000));
    }

    #[test]
    fn geometry_is_attached_for_country_rows_on_request() {
        let registry = registry();
        let query = DaySliceQuery::new(DayKey::Report(2)).filled(true);
        let without = day_slice(&dataset(), &registry, query).unwrap();
        assert!(without.rows.iter().all(|row| row.geometry.is_none()));

        let with = day_slice(&dataset(), &registry, query.with_geometry(true)).unwrap();
        assert!(with.rows.iter().all(|row| row.geometry.is_some()));

        let continents = day_slice(
            &dataset(),
            &registry,
            query.with_geometry(true).grouped_by(RegionKind::Continent),
        )
        .unwrap();
        assert!(continents.rows.iter().all(|row| row.geometry.is_none()));
    }

    #[test]
    fn unknown_day_is_absent() {
        let registry = registry();
        assert!(day_slice(&dataset(), &registry, DaySliceQuery::new(DayKey::Report(9))).is_none());
        assert!(
            day_slice(
                &dataset(),
                &registry,
                DaySliceQuery::new(DayKey::Calendar(date("2019-12-31")))
            )
            .is_none()
        );
    }

    #[test]
    fn country_series_fill_covers_every_dataset_date() {
        let registry = registry();
        let dataset = dataset();

        let sparse = country_series(&dataset, &registry, "Japonia", false);
        assert_eq!(sparse.len(), 1);

        let filled = country_series(&dataset, &registry, "Japonia", true);
        let dates: Vec<NaiveDate> = filled.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date("2020-03-01"), date("2020-03-02")]);
        assert_eq!(filled[0].counts.confirmed, 0);
        assert_eq!(filled[0].day, 1);
        assert_eq!(filled[1].counts.confirmed, 40);
    }

    #[test]
    fn country_series_for_registered_country_without_data_is_all_zero() {
        let registry = registry();
        let filled = country_series(&dataset(), &registry, "Europia", true);
        assert_eq!(filled.len(), 2);
        assert!(filled.iter().all(|r| r.counts == CaseCounts::default()));
    }

    #[test]
    fn unknown_country_series_is_empty() {
        let registry = registry();
        assert!(country_series(&dataset(), &registry, "Narnia", true).is_empty());
        assert!(country_series(&dataset(), &registry, "Narnia", false).is_empty());
    }

    #[test]
    fn continent_series_aggregates_per_date() {
        let registry = registry();
        let series = continent_series(&dataset(), &registry, "Asia", true);
        let confirmed: Vec<u64> = series.iter().map(|r| r.counts.confirmed).collect();
        assert_eq!(confirmed, vec![100, 190]);
        assert!(series.iter().all(|r| r.region == "Asia"));
    }

    #[test]
    fn continent_series_fill_adds_zero_days() {
        let registry = registry();
        let dataset = CaseDataset::build(
            vec![
                row("Chinaland", "2020-03-01", 1, 0, 0),
                row("Francia", "2020-03-02", 1, 0, 0),
            ],
            &registry,
        );
        assert_eq!(continent_series(&dataset, &registry, "Europe", false).len(), 1);
        let filled = continent_series(&dataset, &registry, "Europe", true);
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].counts.confirmed, 0);
        assert!(continent_series(&dataset, &registry, "Atlantis", true).is_empty());
    }

    #[test]
    fn world_series_sums_all_regions() {
        let registry = registry();
        let series = region_series(&dataset(), &registry, RegionKind::World, "", true);
        let confirmed: Vec<u64> = series.iter().map(|r| r.counts.confirmed).collect();
        assert_eq!(confirmed, vec![110, 225]);
    }

    #[test]
    fn comparison_drops_regions_missing_on_either_day() {
        let registry = registry();
        let comparison =
            compare_consecutive_days(&dataset(), &registry, DayKey::Report(2), RegionKind::Country)
                .unwrap();
        let regions: Vec<&str> = comparison.current.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["Chinaland", "Francia"]);
        for (current, previous) in comparison.pairs() {
            assert_eq!(current.region, previous.region);
            assert_eq!(current.day, 2);
            assert_eq!(previous.day, 1);
        }
    }

    #[test]
    fn comparison_on_first_day_is_empty() {
        let registry = registry();
        let comparison =
            compare_consecutive_days(&dataset(), &registry, DayKey::Report(1), RegionKind::Country)
                .unwrap();
        assert!(comparison.current.is_empty());
        assert!(comparison.previous.is_empty());
        assert!(
            compare_consecutive_days(&dataset(), &registry, DayKey::Report(7), RegionKind::Country)
                .is_none()
        );
    }

    #[test]
    fn comparison_ratios() {
        let registry = registry();
        let comparison = compare_consecutive_days(
            &dataset(),
            &registry,
            DayKey::Report(2),
            RegionKind::Continent,
        )
        .unwrap();
        let ratios = comparison.ratios(Metric::Confirmed, Metric::Deaths);
        let asia = ratios.iter().find(|r| r.region == "Asia").unwrap();
        assert!((asia.current.unwrap() - 190.0 / 12.0).abs() < 1e-9);
        assert!((asia.previous.unwrap() - 100.0).abs() < 1e-9);
        // Europe has no deaths
        let europe = ratios.iter().find(|r| r.region == "Europe").unwrap();
        assert!(europe.current.is_none());
    }

    #[test]
    fn rank_orders_by_metric_with_undefined_last() {
        let registry = registry();
        let table = day_slice(&dataset(), &registry, DaySliceQuery::new(DayKey::Report(2))).unwrap();

        let top: Vec<&str> = rank(&table, Metric::Confirmed, 2)
            .into_iter()
            .map(|row| row.record.region.as_str())
            .collect();
        assert_eq!(top, vec!["Chinaland", "Japonia"]);

        let per_capita: Vec<&str> = rank(&table, Metric::ConfirmedPer10k, 10)
            .into_iter()
            .map(|row| row.record.region.as_str())
            .collect();
        assert_eq!(per_capita.last(), Some(&"Atlantis"));
    }

    #[test]
    fn day_row_serializes_flat() {
        let registry = registry();
        let table = day_slice(&dataset(), &registry, DaySliceQuery::new(DayKey::Report(1))).unwrap();
        let json = serde_json::to_value(&table.rows[0]).unwrap();
        assert_eq!(json["region"], "Chinaland");
        assert!(json.get("geometry").is_none());
    }
}
