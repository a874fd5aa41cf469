//! The canonical (region, date) case table and its derived columns.
//!
//! A [`CaseDataset`] is built in one pass from raw snapshot rows and is
//! immutable afterwards. Refreshing the data builds a whole new dataset.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{Days, NaiveDate};
use corona_board_case_models::{CaseCounts, CaseRecord, DailyChange, DayKey, RawCaseRow};
use corona_board_spatial::GeoRegistry;

/// Per-country daily case records with derived metrics.
#[derive(Debug, Clone, Default)]
pub struct CaseDataset {
    /// Sorted by (date, region).
    records: Vec<CaseRecord>,
    /// Deduplicated raw counts, same order as `records`.
    raw: Vec<RawCaseRow>,
    /// Distinct dates, ascending.
    dates: Vec<NaiveDate>,
    /// report day -> contiguous range of `records`
    by_day: BTreeMap<u32, Range<usize>>,
    /// region -> indexes into `records`, ascending by date
    by_region: BTreeMap<String, Vec<usize>>,
}

impl CaseDataset {
    /// Builds a dataset from raw rows.
    ///
    /// Duplicate (region, date) rows are summed, since upstream feeds split
    /// some countries into sub-regions. Report days count from the earliest
    /// date in the input (day 1). Daily changes compare against the same
    /// region's row exactly one day earlier, or zero if there is none.
    /// Regions unknown to the registry are kept with unknown population and
    /// continent.
    #[must_use]
    pub fn build(rows: impl IntoIterator<Item = RawCaseRow>, registry: &GeoRegistry) -> Self {
        let mut totals: BTreeMap<(String, NaiveDate), CaseCounts> = BTreeMap::new();
        let mut input_rows = 0usize;

        for row in rows {
            input_rows += 1;
            let counts = row.counts();
            totals
                .entry((row.region, row.date))
                .or_default()
                .accumulate(&counts);
        }

        let Some(first_date) = totals.keys().map(|(_, date)| *date).min() else {
            log::debug!("Built empty case dataset");
            return Self::default();
        };

        let mut records = Vec::with_capacity(totals.len());
        let mut unregistered: Vec<&str> = Vec::new();

        for ((region, date), counts) in &totals {
            let prior = date
                .checked_sub_days(Days::new(1))
                .and_then(|prior_date| totals.get(&(region.clone(), prior_date)));
            let daily = DailyChange::between(counts, prior);

            let info = registry.country(region);
            if info.is_none() && unregistered.last() != Some(&region.as_str()) {
                unregistered.push(region);
            }

            records.push(CaseRecord::new(
                region.clone(),
                info.map(|info| info.continent.clone()),
                *date,
                report_day(first_date, *date),
                *counts,
                daily,
                info.and_then(|info| info.population),
            ));
        }

        if !unregistered.is_empty() {
            log::warn!(
                "{} regions have no reference geography and no per-capita metrics: {}",
                unregistered.len(),
                unregistered.join(", ")
            );
        }

        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.region.cmp(&b.region)));

        let raw = records
            .iter()
            .map(|record| RawCaseRow {
                region: record.region.clone(),
                date: record.date,
                confirmed: record.counts.confirmed,
                deaths: record.counts.deaths,
                recovered: record.counts.recovered,
            })
            .collect();

        let mut dates = Vec::new();
        let mut by_day: BTreeMap<u32, Range<usize>> = BTreeMap::new();
        let mut by_region: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (idx, record) in records.iter().enumerate() {
            if dates.last() != Some(&record.date) {
                dates.push(record.date);
            }
            by_day
                .entry(record.day)
                .and_modify(|range| range.end = idx + 1)
                .or_insert(idx..idx + 1);
            by_region.entry(record.region.clone()).or_default().push(idx);
        }

        log::info!(
            "Built case dataset: {} records ({} input rows) for {} regions over {} days",
            records.len(),
            input_rows,
            by_region.len(),
            dates.len()
        );

        Self {
            records,
            raw,
            dates,
            by_day,
            by_region,
        }
    }

    /// All records, ascending by date then region.
    #[must_use]
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    /// Deduplicated raw counts, in the same order as [`Self::records`].
    #[must_use]
    pub fn raw_rows(&self) -> &[RawCaseRow] {
        &self.raw
    }

    /// Number of records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct observation dates, ascending.
    #[must_use]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Distinct region names, sorted.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }

    /// Earliest observation date.
    #[must_use]
    pub fn first_day(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Latest observation date.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Highest report day.
    #[must_use]
    pub fn latest_report_day(&self) -> Option<u32> {
        self.by_day.keys().next_back().copied()
    }

    /// Latest day, either as a report day or as a calendar date.
    #[must_use]
    pub fn latest_day(&self, report_relative: bool) -> Option<DayKey> {
        if report_relative {
            self.latest_report_day().map(DayKey::Report)
        } else {
            self.latest_date().map(DayKey::Calendar)
        }
    }

    /// Report day of a calendar date (may fall outside the dataset).
    #[must_use]
    pub fn day_of(&self, date: NaiveDate) -> Option<u32> {
        let first = self.first_day()?;
        (date >= first).then(|| report_day(first, date))
    }

    /// Calendar date of a report day.
    #[must_use]
    pub fn date_of(&self, day: u32) -> Option<NaiveDate> {
        let first = self.first_day()?;
        let offset = day.checked_sub(1)?;
        first.checked_add_days(Days::new(u64::from(offset)))
    }

    /// Resolves a day key to `(date, report day)` if the dataset has records
    /// for that day.
    #[must_use]
    pub fn resolve_day(&self, key: DayKey) -> Option<(NaiveDate, u32)> {
        let day = match key {
            DayKey::Report(day) => day,
            DayKey::Calendar(date) => self.day_of(date)?,
        };
        if !self.by_day.contains_key(&day) {
            return None;
        }
        Some((self.date_of(day)?, day))
    }

    /// Records observed on a report day.
    #[must_use]
    pub fn records_on_day(&self, day: u32) -> &[CaseRecord] {
        match self.by_day.get(&day) {
            Some(range) => &self.records[range.clone()],
            None => &[],
        }
    }

    /// Records of one region, ascending by date.
    pub fn records_for<'a>(&'a self, region: &str) -> impl Iterator<Item = &'a CaseRecord> + use<'a> {
        self.by_region
            .get(region)
            .into_iter()
            .flatten()
            .map(|&idx| &self.records[idx])
    }

    /// Whether the dataset has any record for this region.
    #[must_use]
    pub fn has_region(&self, region: &str) -> bool {
        self.by_region.contains_key(region)
    }
}

/// 1-based offset of `date` from `first`.
fn report_day(first: NaiveDate, date: NaiveDate) -> u32 {
    let offset = (date - first).num_days() + 1;
    u32::try_from(offset).unwrap_or(u32::MAX)
}
