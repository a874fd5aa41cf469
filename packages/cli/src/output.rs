//! Plain-text rendering of query results.

use corona_board_case_models::{CaseRecord, Metric};
use corona_board_cases::queries::{DayRatio, DayRow};

/// Columns printed for day tables.
pub const DAY_COLUMNS: &[Metric] = &[
    Metric::Confirmed,
    Metric::Deaths,
    Metric::Recovered,
    Metric::Active,
    Metric::DailyConfirmed,
    Metric::DeathRate,
    Metric::ConfirmedPer10k,
];

/// Columns printed for series when none are requested.
pub const SERIES_COLUMNS: &[Metric] = &[
    Metric::Confirmed,
    Metric::Deaths,
    Metric::Recovered,
    Metric::DailyConfirmed,
];

/// Formats one cell. Undefined values print as `-`; the contaminated
/// share is stored as a fraction and printed as a percentage.
#[must_use]
pub fn format_value(value: Option<f64>, metric: Metric) -> String {
    match value {
        None => "-".to_string(),
        Some(value) if metric == Metric::Contamination => format!("{:.3}%", value * 100.0),
        Some(value) if metric.is_rate() => format!("{value:.4}"),
        Some(value) => format!("{value:.0}"),
    }
}

fn format_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.3}"))
}

/// Renders rows under a header. The first column is left-aligned, the
/// others right-aligned.
#[must_use]
pub fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(String::len).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let render_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(idx, (cell, width))| {
                if idx == 0 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = render_row(header);
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out
}

fn metric_header(metrics: &[Metric]) -> impl Iterator<Item = String> + '_ {
    metrics.iter().map(|metric| metric.code().to_string())
}

/// One line per region of a day table.
#[must_use]
pub fn day_rows(rows: &[&DayRow]) -> String {
    let header: Vec<String> = ["Region".to_string(), "Continent".to_string()]
        .into_iter()
        .chain(metric_header(DAY_COLUMNS))
        .collect();

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let record = &row.record;
            [
                record.region.clone(),
                record.continent.clone().unwrap_or_else(|| "-".to_string()),
            ]
            .into_iter()
            .chain(
                DAY_COLUMNS
                    .iter()
                    .map(|metric| format_value(record.value(*metric), *metric)),
            )
            .collect()
        })
        .collect();

    render_table(&header, &body)
}

/// One line per date of a series.
#[must_use]
pub fn series_rows(records: &[CaseRecord], metrics: &[Metric]) -> String {
    let header: Vec<String> = ["Date".to_string(), "Day".to_string()]
        .into_iter()
        .chain(metric_header(metrics))
        .collect();

    let body: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            [record.date.format("%Y-%m-%d").to_string(), record.day.to_string()]
                .into_iter()
                .chain(
                    metrics
                        .iter()
                        .map(|metric| format_value(record.value(*metric), *metric)),
                )
                .collect()
        })
        .collect();

    render_table(&header, &body)
}

/// One line per region of a day-over-day comparison.
#[must_use]
pub fn ratio_rows(ratios: &[DayRatio], x: Metric, y: Metric) -> String {
    let header = vec![
        "Region".to_string(),
        format!("{x}/{y}"),
        format!("{x}/{y} (prev)"),
    ];
    let body: Vec<Vec<String>> = ratios
        .iter()
        .map(|ratio| {
            vec![
                ratio.region.clone(),
                format_ratio(ratio.current),
                format_ratio(ratio.previous),
            ]
        })
        .collect();

    render_table(&header, &body)
}

/// Every metric code with its description.
#[must_use]
pub fn metric_rows() -> String {
    let header = vec!["Code".to_string(), "Description".to_string()];
    let body: Vec<Vec<String>> = Metric::all()
        .map(|metric| vec![metric.code().to_string(), metric.description().to_string()])
        .collect();
    render_table(&header, &body)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use corona_board_case_models::{CaseCounts, DailyChange};

    use super::*;

    fn record() -> CaseRecord {
        CaseRecord::new(
            "Chinaland".to_string(),
            Some("Asia".to_string()),
            NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            2,
            CaseCounts {
                confirmed: 150,
                deaths: 2,
                recovered: 20,
            },
            DailyChange {
                confirmed: 50,
                deaths: 1,
                recovered: 10,
            },
            Some(1000),
        )
    }

    #[test]
    fn formats_counts_rates_and_missing_values() {
        assert_eq!(format_value(Some(150.0), Metric::Confirmed), "150");
        assert_eq!(format_value(Some(2.0 / 22.0), Metric::DeathRate), "0.0909");
        assert_eq!(format_value(None, Metric::ConfirmedPer10k), "-");
    }

    #[test]
    fn contamination_prints_as_percentage() {
        assert_eq!(format_value(Some(0.172), Metric::Contamination), "17.200%");
        assert_eq!(format_value(Some(0.0), Metric::Contamination), "0.000%");
    }

    #[test]
    fn aligns_columns() {
        let header = vec!["Region".to_string(), "N".to_string()];
        let rows = vec![
            vec!["A".to_string(), "1".to_string()],
            vec!["Longer".to_string(), "100".to_string()],
        ];
        let text = render_table(&header, &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Region    N");
        assert_eq!(lines[1], "-----------");
        assert_eq!(lines[2], "A         1");
        assert_eq!(lines[3], "Longer  100");
    }

    #[test]
    fn day_rows_include_derived_columns() {
        let row = DayRow {
            record: record(),
            geometry: None,
        };
        let text = day_rows(&[&row]);
        assert!(text.starts_with("Region"));
        assert!(text.contains("CODay"));
        let line = text.lines().nth(2).unwrap();
        assert!(line.starts_with("Chinaland"));
        assert!(line.contains("Asia"));
        assert!(line.contains("1500.0000"));
    }

    #[test]
    fn series_rows_list_dates() {
        let text = series_rows(&[record()], SERIES_COLUMNS);
        assert!(text.lines().nth(2).unwrap().starts_with("2020-03-02"));
    }

    #[test]
    fn metric_rows_list_every_code() {
        let text = metric_rows();
        for metric in Metric::all() {
            assert!(text.contains(metric.code()));
            assert!(text.contains(metric.description()));
        }
    }
}
