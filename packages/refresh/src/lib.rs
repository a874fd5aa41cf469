#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cool-down gated dataset refresh.
//!
//! The snapshot file's modification time records the last successful
//! update. Within the cool-down window a refresh request is answered with
//! the remaining wait; afterwards the upstream is fetched, the dataset is
//! rebuilt and persisted, and the [`DatasetHandle`] swaps it in.
//!
//! Failures never touch the current dataset or the snapshot file. There is
//! no lock between requests: two refreshes started in the same stale
//! window both fetch, and the later `replace` wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use corona_board_cases::handle::DatasetHandle;
use corona_board_cases::snapshot::{snapshot_modified, write_snapshot};
use corona_board_cases::{CaseDataset, DataLoadError};
use corona_board_source::{CaseSource, SourceError};
use corona_board_spatial::GeoRegistry;

/// Minimum time between two upstream fetches.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2 * 60 * 60);

/// Upper bound on a whole upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Why an update attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The upstream fetch failed.
    #[error("Upstream fetch failed: {0}")]
    Source(#[from] SourceError),

    /// The upstream fetch did not finish in time.
    #[error("Upstream fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream returned no rows.
    #[error("Upstream returned no case rows")]
    EmptyFetch,

    /// The rebuilt dataset could not be written to the snapshot file.
    #[error("Failed to persist snapshot: {0}")]
    Persist(#[from] DataLoadError),
}

/// Whether an update may run now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Updated recently; the next update is allowed after `time_until_next`.
    Fresh {
        /// Remaining cool-down.
        time_until_next: TimeDelta,
    },
    /// The cool-down has passed or there is no snapshot yet.
    Stale,
}

/// Outcome of a refresh request.
#[derive(Debug)]
pub enum RefreshResult {
    /// A new dataset was published.
    Success {
        /// Generation of the new dataset.
        generation: u64,
        /// Records in the new dataset.
        records: usize,
    },
    /// The cool-down has not elapsed; nothing was fetched.
    Skipped {
        /// Remaining cool-down.
        time_until_next: TimeDelta,
    },
    /// The update failed and the previous dataset is still current.
    Failed(UpdateError),
}

impl RefreshResult {
    /// Short status line for display.
    ///
    /// Failure details are logged, not shown.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Success { .. } => "Data updated".to_string(),
            Self::Skipped { time_until_next } => {
                format!("Next update available in {}", format_countdown(*time_until_next))
            }
            Self::Failed(_) => "Unexpected error during update".to_string(),
        }
    }

    /// Whether a new dataset was published.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Formats a remaining duration as `HH:MM`, rounding up to the next whole
/// minute. Negative durations format as `00:00`.
#[must_use]
pub fn format_countdown(remaining: TimeDelta) -> String {
    let seconds = remaining.num_seconds().max(0);
    let minutes = (seconds + 59) / 60;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Runs refreshes of one dataset from one source.
pub struct RefreshController<S> {
    source: S,
    registry: Arc<GeoRegistry>,
    handle: Arc<DatasetHandle>,
    snapshot_path: PathBuf,
    cooldown: TimeDelta,
    fetch_timeout: Duration,
}

impl<S> std::fmt::Debug for RefreshController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("snapshot_path", &self.snapshot_path)
            .field("cooldown", &self.cooldown)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: CaseSource> RefreshController<S> {
    /// Creates a controller with the default cool-down and fetch timeout.
    #[must_use]
    pub fn new(
        source: S,
        registry: Arc<GeoRegistry>,
        handle: Arc<DatasetHandle>,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            source,
            registry,
            handle,
            snapshot_path,
            cooldown: to_time_delta(DEFAULT_COOLDOWN),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Sets the minimum time between fetches.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = to_time_delta(cooldown);
        self
    }

    /// Sets the upper bound on a whole fetch.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// The upstream source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Path of the snapshot file this controller maintains.
    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Refresh state at the current time.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.state_at(Utc::now())
    }

    /// Refresh state at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> RefreshState {
        let Some(modified) = snapshot_modified(&self.snapshot_path) else {
            return RefreshState::Stale;
        };

        let elapsed = now - modified;
        if elapsed < self.cooldown {
            RefreshState::Fresh {
                time_until_next: (self.cooldown - elapsed).min(self.cooldown),
            }
        } else {
            RefreshState::Stale
        }
    }

    /// Refreshes if the cool-down has passed.
    pub async fn request_refresh(&self) -> RefreshResult {
        self.request_refresh_at(Utc::now()).await
    }

    /// Refreshes if the cool-down has passed at `now`.
    pub async fn request_refresh_at(&self, now: DateTime<Utc>) -> RefreshResult {
        if let RefreshState::Fresh { time_until_next } = self.state_at(now) {
            log::info!(
                "Skipping update, next one available in {}",
                format_countdown(time_until_next)
            );
            return RefreshResult::Skipped { time_until_next };
        }

        match self.update().await {
            Ok((generation, records)) => RefreshResult::Success {
                generation,
                records,
            },
            Err(e) => {
                log::error!("Update from {} failed: {e}", self.source.name());
                RefreshResult::Failed(e)
            }
        }
    }

    async fn update(&self) -> Result<(u64, usize), UpdateError> {
        log::info!("Fetching case data from {}", self.source.name());

        let rows = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&self.registry))
            .await
            .map_err(|_| UpdateError::Timeout(self.fetch_timeout))??;

        if rows.is_empty() {
            return Err(UpdateError::EmptyFetch);
        }

        let dataset = CaseDataset::build(rows, &self.registry);
        write_snapshot(&self.snapshot_path, dataset.raw_rows())?;

        let records = dataset.len();
        let generation = self.handle.replace(dataset);
        Ok((generation, records))
    }
}

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
