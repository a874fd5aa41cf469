#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upstream case data sources.
//!
//! A [`CaseSource`] produces long-form [`RawCaseRow`]s (one per country and
//! day) already attributed to reference country names. The only upstream
//! today is the Johns Hopkins CSSE global time series, see [`jhu`].

pub mod jhu;
pub mod progress;

use std::future::Future;

use corona_board_case_models::RawCaseRow;
use corona_board_spatial::GeoRegistry;

pub use jhu::{JhuTimeSeriesSource, LocalSeriesSource, SeriesKind, SeriesSet};

/// Errors that can occur while fetching or reshaping upstream data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (local series files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream data parsed but does not have the expected shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// A provider of cumulative per-country case counts.
pub trait CaseSource: Send + Sync {
    /// Human-readable name for log messages.
    fn name(&self) -> &str;

    /// Downloads the full history and returns it in long form.
    ///
    /// Rows are attributed to `registry` country names where possible and
    /// summed per (country, date).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any download fails or the data is
    /// malformed.
    fn fetch(
        &self,
        registry: &GeoRegistry,
    ) -> impl Future<Output = Result<Vec<RawCaseRow>, SourceError>> + Send;
}
