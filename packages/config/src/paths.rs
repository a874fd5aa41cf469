#![allow(clippy::module_name_repetitions)]
//! Canonical file locations.
//!
//! Everything lives under the project root's `data/` directory unless the
//! configuration file says otherwise.

use std::path::{Path, PathBuf};

/// File name of the configuration file at the project root.
pub const CONFIG_FILE_NAME: &str = "corona_board.toml";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`; falls back to the
/// manifest directory itself if it is not nested two levels deep.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the persisted case snapshot path.
#[must_use]
pub fn snapshot_path() -> PathBuf {
    data_dir().join("corona_data.csv")
}

/// Returns the country polygons `GeoJSON` path.
#[must_use]
pub fn countries_path() -> PathBuf {
    data_dir().join("countries.geojson")
}

/// Returns the default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    project_root().join(CONFIG_FILE_NAME)
}
