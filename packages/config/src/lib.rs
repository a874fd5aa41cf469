#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Board configuration.
//!
//! Settings come from an optional `corona_board.toml`. Every field has a
//! default, so an empty or missing file yields a working configuration
//! pointing at the project's `data/` directory and the public upstream.
//!
//! ```toml
//! [data]
//! snapshot = "data/corona_data.csv"
//! countries = "data/countries.geojson"
//! population = "data/API_SP.POP.TOTL.csv"
//!
//! [upstream]
//! request_timeout_secs = 60
//!
//! [refresh]
//! cooldown_minutes = 120
//! ```

pub mod paths;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use corona_board_source::SeriesSet;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CORONA_BOARD_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Input and output files.
    pub data: DataConfig,
    /// Upstream time series.
    pub upstream: UpstreamConfig,
    /// Refresh gating.
    pub refresh: RefreshConfig,
}

/// Input and output files. Relative paths are resolved against the
/// directory of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Persisted case snapshot.
    pub snapshot: PathBuf,
    /// Country polygons (`GeoJSON` feature collection).
    pub countries: PathBuf,
    /// World Bank population export. When unset the `POP_EST` property of
    /// the country polygons is used.
    pub population: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            snapshot: paths::snapshot_path(),
            countries: paths::countries_path(),
            population: None,
        }
    }
}

/// Upstream time series locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Confirmed cases series URL.
    pub confirmed_url: String,
    /// Deaths series URL.
    pub deaths_url: String,
    /// Recoveries series URL.
    pub recovered_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let SeriesSet {
            confirmed,
            deaths,
            recovered,
        } = SeriesSet::jhu_urls();
        Self {
            confirmed_url: confirmed,
            deaths_url: deaths,
            recovered_url: recovered,
            request_timeout_secs: 60,
        }
    }
}

impl UpstreamConfig {
    /// The three series URLs.
    #[must_use]
    pub fn urls(&self) -> SeriesSet<String> {
        SeriesSet {
            confirmed: self.confirmed_url.clone(),
            deaths: self.deaths_url.clone(),
            recovered: self.recovered_url.clone(),
        }
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Refresh gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    /// Minimum minutes between two upstream fetches.
    pub cooldown_minutes: u64,
    /// Upper bound on a whole fetch, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: corona_board_refresh::DEFAULT_COOLDOWN.as_secs() / 60,
            fetch_timeout_secs: corona_board_refresh::DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

impl RefreshConfig {
    /// Minimum time between two upstream fetches.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }

    /// Upper bound on a whole fetch.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    /// File to read.
    pub path: PathBuf,
    /// Whether a missing file is an error. Only the implicit default path
    /// may be absent.
    pub required: bool,
}

/// Picks the configuration file: an explicit path first, then the
/// [`CONFIG_ENV`] value, then [`paths::config_path`].
#[must_use]
pub fn locate(explicit: Option<&Path>, env_value: Option<OsString>) -> ConfigLocation {
    if let Some(path) = explicit {
        return ConfigLocation {
            path: path.to_path_buf(),
            required: true,
        };
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return ConfigLocation {
            path: PathBuf::from(value),
            required: true,
        };
    }
    ConfigLocation {
        path: paths::config_path(),
        required: false,
    }
}

impl BoardConfig {
    /// Parses configuration text. Relative data paths stay relative.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a configuration file and resolves relative data paths against
    /// its directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.data.rebase(base);
        }
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads the configuration chosen by [`locate`], reading [`CONFIG_ENV`]
    /// from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required file is missing or any file is
    /// invalid.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let location = locate(explicit, std::env::var_os(CONFIG_ENV));
        if !location.required && !location.path.exists() {
            log::debug!(
                "No config file at {}, using defaults",
                location.path.display()
            );
            return Ok(Self::default());
        }
        Self::load(&location.path)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if rendering fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

impl DataConfig {
    fn rebase(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        rebase(&mut self.snapshot);
        rebase(&mut self.countries);
        if let Some(population) = &mut self.population {
            rebase(population);
        }
    }
}
