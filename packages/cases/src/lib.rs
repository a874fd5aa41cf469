#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Case dataset construction, persistence and queries.
//!
//! Raw per-country cumulative counts are read from a CSV snapshot, joined
//! against the [`GeoRegistry`], and turned into an immutable
//! [`CaseDataset`]. The [`handle::DatasetHandle`] publishes the current
//! dataset to concurrent readers and swaps it atomically on refresh.

pub mod dataset;
pub mod handle;
pub mod queries;
pub mod snapshot;

use std::path::Path;

use corona_board_spatial::GeoRegistry;

pub use corona_board_spatial::DataLoadError;
pub use dataset::CaseDataset;

/// Reads a snapshot file and builds a dataset from it.
///
/// # Errors
///
/// Returns [`DataLoadError`] if the snapshot cannot be read or parsed.
pub fn load_dataset(path: &Path, registry: &GeoRegistry) -> Result<CaseDataset, DataLoadError> {
    let rows = snapshot::read_snapshot(path)?;
    Ok(CaseDataset::build(rows, registry))
}
