#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the corona-board data tool.
//!
//! Every query prints an aligned text table, or pretty JSON with `--json`.
//! Log output goes through [`corona_board_cli_utils::init_logger`], so set
//! `RUST_LOG=info` to watch loading and refresh progress.

mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use corona_board_case_models::{DayKey, Metric, RegionKind};
use corona_board_cases::handle::DatasetHandle;
use corona_board_cases::queries::{self, DaySliceQuery};
use corona_board_cases::{CaseDataset, load_dataset};
use corona_board_cli_utils::{IndicatifProgress, MultiProgress};
use corona_board_config::BoardConfig;
use corona_board_refresh::{RefreshController, RefreshResult};
use corona_board_source::{CaseSource, JhuTimeSeriesSource, LocalSeriesSource, SeriesSet};
use corona_board_spatial::GeoRegistry;

#[derive(Parser)]
#[command(name = "corona_board", about = "COVID-19 case data tool")]
struct Cli {
    /// Configuration file (overrides `CORONA_BOARD_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the upstream series and rewrite the snapshot, ignoring the cool-down
    Fetch {
        /// Read the confirmed, deaths and recovered series from local files
        #[arg(long, num_args = 3, value_names = ["CONFIRMED", "DEATHS", "RECOVERED"])]
        from_files: Option<Vec<PathBuf>>,
    },
    /// Refresh the snapshot if the cool-down has passed
    Update,
    /// Print every region on one day
    Day {
        /// Report day number or YYYY-MM-DD (default: latest)
        day: Option<DayKey>,
        /// Row granularity: country, continent or world
        #[arg(long, default_value = "country")]
        grouping: RegionKind,
        /// Add zero rows for regions without data on this day
        #[arg(long)]
        fill: bool,
        /// Include country outlines (JSON output only)
        #[arg(long)]
        geometry: bool,
        /// Order by this metric, largest first (code or description)
        #[arg(long)]
        sort: Option<String>,
        /// Keep only the first N rows
        #[arg(long)]
        top: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the time series of one region
    Series {
        /// Country or continent name (ignored for `--kind world`)
        name: Option<String>,
        /// Region kind: country, continent or world
        #[arg(long, default_value = "country")]
        kind: RegionKind,
        /// Add zero rows for dates without data
        #[arg(long)]
        fill: bool,
        /// Comma-separated metric codes or descriptions to print
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Compare a day with the day before it
    Compare {
        /// Report day number or YYYY-MM-DD (default: latest)
        day: Option<DayKey>,
        /// Row granularity: country, continent or world
        #[arg(long, default_value = "country")]
        grouping: RegionKind,
        /// Numerator metric
        #[arg(long, default_value = "Confirmed")]
        x: String,
        /// Denominator metric
        #[arg(long, default_value = "Deaths")]
        y: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Find the country containing a point
    Lookup {
        /// Longitude in degrees
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// Latitude in degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,
    },
    /// List known countries or continents
    Regions {
        /// Region kind: country or continent
        #[arg(long, default_value = "country")]
        kind: RegionKind,
    },
    /// List metric codes and descriptions
    Metrics,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = corona_board_cli_utils::init_logger();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Metrics) {
        print!("{}", output::metric_rows());
        return Ok(());
    }

    let config = BoardConfig::resolve(cli.config.as_deref())?;
    let registry = Arc::new(GeoRegistry::load(
        &config.data.countries,
        config.data.population.as_deref(),
    )?);

    match cli.command {
        Commands::Metrics => {}
        Commands::Fetch { from_files } => {
            let handle = Arc::new(DatasetHandle::new(initial_dataset(&config, &registry)?));
            let cooldown = Duration::ZERO;
            if let Some(files) = from_files {
                let mut files = files.into_iter();
                let (Some(confirmed), Some(deaths), Some(recovered)) =
                    (files.next(), files.next(), files.next())
                else {
                    return Err("--from-files needs three paths".into());
                };
                let source = LocalSeriesSource::new(SeriesSet {
                    confirmed,
                    deaths,
                    recovered,
                });
                refresh(&config, source, &registry, &handle, cooldown).await?;
            } else {
                let source = http_source(&config, &multi)?;
                refresh(&config, source, &registry, &handle, cooldown).await?;
            }
        }
        Commands::Update => {
            let handle = Arc::new(DatasetHandle::new(initial_dataset(&config, &registry)?));
            let source = http_source(&config, &multi)?;
            refresh(
                &config,
                source,
                &registry,
                &handle,
                config.refresh.cooldown(),
            )
            .await?;
        }
        Commands::Day {
            day,
            grouping,
            fill,
            geometry,
            sort,
            top,
            json,
        } => {
            let dataset = load_dataset(&config.data.snapshot, &registry)?;
            let day = resolve_day(&dataset, day)?;
            let query = DaySliceQuery::new(day)
                .grouped_by(grouping)
                .filled(fill)
                .with_geometry(geometry);

            let table = queries::day_slice(&dataset, &registry, query)
                .ok_or_else(|| format!("No data for day {day}"))?;

            let limit = top.unwrap_or(table.rows.len());
            let rows = match sort {
                Some(metric) => queries::rank(&table, Metric::parse(&metric)?, limit),
                None => table.rows.iter().take(limit).collect(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!(
                    "{} (day {}), {} rows",
                    table.date.format("%Y-%m-%d"),
                    table.day,
                    rows.len()
                );
                print!("{}", output::day_rows(&rows));
            }
        }
        Commands::Series {
            name,
            kind,
            fill,
            metrics,
            json,
        } => {
            let dataset = load_dataset(&config.data.snapshot, &registry)?;
            let name = match (kind, name) {
                (RegionKind::World, _) => corona_board_case_models::WORLD.to_string(),
                (_, Some(name)) => name,
                (_, None) => return Err(format!("a {kind} name is required").into()),
            };

            let series = queries::region_series(&dataset, &registry, kind, &name, fill);
            if series.is_empty() {
                log::warn!("No data for {kind} '{name}'");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                let metrics = if metrics.is_empty() {
                    output::SERIES_COLUMNS.to_vec()
                } else {
                    metrics
                        .iter()
                        .map(|metric| Metric::parse(metric))
                        .collect::<Result<Vec<_>, _>>()?
                };
                println!("{name}");
                print!("{}", output::series_rows(&series, &metrics));
            }
        }
        Commands::Compare {
            day,
            grouping,
            x,
            y,
            json,
        } => {
            let dataset = load_dataset(&config.data.snapshot, &registry)?;
            let day = resolve_day(&dataset, day)?;
            let (x, y) = (Metric::parse(&x)?, Metric::parse(&y)?);

            let comparison = queries::compare_consecutive_days(&dataset, &registry, day, grouping)
                .ok_or_else(|| format!("No data for day {day}"))?;
            let ratios = comparison.ratios(x, y);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "comparison": comparison,
                        "ratios": ratios,
                    }))?
                );
            } else {
                println!(
                    "{} (day {}) vs previous day, {} regions",
                    comparison.date.format("%Y-%m-%d"),
                    comparison.day,
                    ratios.len()
                );
                print!("{}", output::ratio_rows(&ratios, x, y));
            }
        }
        Commands::Lookup { lon, lat } => match registry.lookup_by_point(lon, lat) {
            Some(country) => println!(
                "{} ({}), {}",
                country.name, country.iso_a3, country.continent
            ),
            None => println!("No country contains ({lon}, {lat})"),
        },
        Commands::Regions { kind } => match kind {
            RegionKind::Continent => {
                for continent in registry.continents() {
                    println!(
                        "{continent:<20} {:>4} countries  population {}",
                        registry.countries_in(continent).count(),
                        registry
                            .continent_population(continent)
                            .map_or_else(|| "unknown".to_string(), |p| p.to_string())
                    );
                }
            }
            RegionKind::Country | RegionKind::World => {
                for info in registry.country_infos() {
                    println!(
                        "{:<40} {:<16} {}",
                        info.name,
                        info.continent,
                        info.population
                            .map_or_else(|| "unknown".to_string(), |p| p.to_string())
                    );
                }
            }
        },
    }

    Ok(())
}

/// The current snapshot, or an empty dataset when none has been written
/// yet.
fn initial_dataset(
    config: &BoardConfig,
    registry: &GeoRegistry,
) -> Result<CaseDataset, corona_board_cases::DataLoadError> {
    if config.data.snapshot.exists() {
        load_dataset(&config.data.snapshot, registry)
    } else {
        log::warn!(
            "No snapshot at {}, starting from an empty dataset",
            config.data.snapshot.display()
        );
        Ok(CaseDataset::default())
    }
}

fn http_source(
    config: &BoardConfig,
    multi: &MultiProgress,
) -> Result<JhuTimeSeriesSource, corona_board_source::SourceError> {
    Ok(
        JhuTimeSeriesSource::new(config.upstream.urls(), config.upstream.request_timeout())?
            .with_progress(IndicatifProgress::download_bar(multi, "Connecting to upstream")),
    )
}

async fn refresh<S: CaseSource>(
    config: &BoardConfig,
    source: S,
    registry: &Arc<GeoRegistry>,
    handle: &Arc<DatasetHandle>,
    cooldown: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = RefreshController::new(
        source,
        Arc::clone(registry),
        Arc::clone(handle),
        config.data.snapshot.clone(),
    )
    .with_cooldown(cooldown)
    .with_fetch_timeout(config.refresh.fetch_timeout());

    let result = controller.request_refresh().await;
    println!("{}", result.message());

    match result {
        RefreshResult::Failed(e) => Err(e.into()),
        RefreshResult::Success {
            generation,
            records,
        } => {
            log::info!("Generation {generation} holds {records} records");
            Ok(())
        }
        RefreshResult::Skipped { .. } => Ok(()),
    }
}

fn resolve_day(dataset: &CaseDataset, day: Option<DayKey>) -> Result<DayKey, String> {
    day.or_else(|| dataset.latest_day(true))
        .ok_or_else(|| "The snapshot holds no data".to_string())
}
