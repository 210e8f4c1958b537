use crate::comparison::{GroupMean, LinearTrend, Measure};
use crate::config::ChartTheme;
use crate::signal_analysis::{Autocorrelation, SignalAnalysis, Spectrum};
use crate::{ScanWarning, StatisticRow};
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Bar,
    Line,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AxisValues {
    Categories(Vec<String>),
    Numbers(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub mark: Mark,
    pub color: String,
    pub x: AxisValues,
    pub y: Vec<f64>,
}

/// Everything an external renderer needs to draw one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub theme: ChartTheme,
    pub series: Vec<Series>,
}

pub fn group_bar_chart(
    title: &str,
    x_label: &str,
    measure: Measure,
    groups: &[GroupMean],
    theme: &ChartTheme,
) -> ChartPayload {
    ChartPayload {
        title: title.to_string(),
        x_label: x_label.to_string(),
        y_label: measure.label().to_string(),
        theme: theme.clone(),
        series: vec![Series {
            name: measure.label().to_string(),
            mark: Mark::Bar,
            color: theme.bar.clone(),
            x: AxisValues::Categories(groups.iter().map(|g| g.key.clone()).collect()),
            y: groups.iter().map(|g| g.value).collect(),
        }],
    }
}

/// Mean pressure per subject for one posture, in the order given.
pub fn subject_bar_chart(
    posture: &str,
    rows: &[StatisticRow],
    theme: &ChartTheme,
) -> ChartPayload {
    ChartPayload {
        title: format!("Mean pressure per subject - posture: {}", posture),
        x_label: "Subject".to_string(),
        y_label: Measure::Mean.label().to_string(),
        theme: theme.clone(),
        series: vec![Series {
            name: posture.to_string(),
            mark: Mark::Bar,
            color: theme.bar.clone(),
            x: AxisValues::Categories(rows.iter().map(|r| r.subject.clone()).collect()),
            y: rows.iter().map(|r| r.mean).collect(),
        }],
    }
}

fn index_axis(len: usize) -> AxisValues {
    AxisValues::Numbers((0..len).map(|i| i as f64).collect())
}

/// Raw signal with a horizontal line at its mean.
pub fn signal_chart(analysis: &SignalAnalysis, theme: &ChartTheme) -> ChartPayload {
    let len = analysis.series.len();
    let last = len.saturating_sub(1) as f64;
    ChartPayload {
        title: "Raw signal".to_string(),
        x_label: "Time".to_string(),
        y_label: "Amplitude".to_string(),
        theme: theme.clone(),
        series: vec![
            Series {
                name: "Raw signal".to_string(),
                mark: Mark::Line,
                color: theme.signal.clone(),
                x: index_axis(len),
                y: analysis.series.clone(),
            },
            Series {
                name: "Mean".to_string(),
                mark: Mark::Line,
                color: theme.mean_line.clone(),
                x: AxisValues::Numbers(vec![0.0, last]),
                y: vec![analysis.stats.mean; 2],
            },
        ],
    }
}

pub fn autocorrelation_chart(
    title: &str,
    acf: &Autocorrelation,
    theme: &ChartTheme,
) -> ChartPayload {
    ChartPayload {
        title: title.to_string(),
        x_label: "Lag".to_string(),
        y_label: "Correlation".to_string(),
        theme: theme.clone(),
        series: vec![Series {
            name: "Autocorrelation".to_string(),
            mark: Mark::Line,
            color: theme.autocorrelation.clone(),
            x: AxisValues::Numbers(acf.lags.iter().map(|&l| l as f64).collect()),
            y: acf.values.clone(),
        }],
    }
}

pub fn spectrum_chart(spectrum: &Spectrum, theme: &ChartTheme) -> ChartPayload {
    ChartPayload {
        title: "FFT spectrum".to_string(),
        x_label: "Frequency (cycles/sample)".to_string(),
        y_label: "Magnitude".to_string(),
        theme: theme.clone(),
        series: vec![Series {
            name: "FFT spectrum".to_string(),
            mark: Mark::Line,
            color: theme.spectrum.clone(),
            x: AxisValues::Numbers(spectrum.frequencies.clone()),
            y: spectrum.magnitudes.clone(),
        }],
    }
}

pub fn trend_chart(title: &str, trend: &LinearTrend, theme: &ChartTheme) -> ChartPayload {
    let xs: Vec<f64> = trend.points.iter().map(|p| p.x).collect();
    ChartPayload {
        title: title.to_string(),
        x_label: "Position (index)".to_string(),
        y_label: Measure::Mean.label().to_string(),
        theme: theme.clone(),
        series: vec![
            Series {
                name: "Observed".to_string(),
                mark: Mark::Scatter,
                color: theme.trend_points.clone(),
                x: AxisValues::Numbers(xs.clone()),
                y: trend.points.iter().map(|p| p.y).collect(),
            },
            Series {
                name: "Linear fit".to_string(),
                mark: Mark::Line,
                color: theme.trend_line.clone(),
                x: AxisValues::Numbers(xs),
                y: trend.points.iter().map(|p| p.predicted).collect(),
            },
        ],
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_rows_to_csv(path: &Path, rows: &[StatisticRow]) -> Result<()> {
    ensure_parent(path)?;

    println!("Writing {} rows to {}", rows.len(), path.display());
    let file = std::fs::File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "experiment",
        "subject",
        "age",
        "mattress",
        "posture_code",
        "posture",
        "frames",
        "mean",
        "variance",
        "total",
        "source",
    ])?;

    for row in rows {
        writer.write_record(&[
            row.experiment.to_string(),
            row.subject.clone(),
            format_optional(row.age),
            row.mattress.map(|m| m.to_string()).unwrap_or_default(),
            row.posture_code.clone(),
            row.posture.clone(),
            row.frames.to_string(),
            row.mean.to_string(),
            row.variance.to_string(),
            row.total.to_string(),
            row.source.display().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a chart payload to `<dir>/<name>.json`.
pub fn write_chart_json(dir: &Path, name: &str, payload: &ChartPayload) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", name));
    println!("Writing chart to {}", path.display());
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, payload)?;
    Ok(path)
}

/// File-name friendly form of a label, e.g. "Right (30°)" -> "right_30".
pub fn slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "--".to_string()
    } else {
        format!("{:.3}", value)
    }
}

pub fn print_row_table(rows: &[StatisticRow], max_rows: usize) {
    if rows.is_empty() {
        println!("No recordings found");
        return;
    }

    println!(
        "{:<8} {:>5} {:<7} {:<22} {:>6} {:>12} {:>14} {:>16}",
        "Subject", "Age", "Mat", "Posture", "Frames", "Mean", "Variance", "Total"
    );
    println!("{}", "-".repeat(96));

    let limit = if max_rows == 0 { rows.len() } else { max_rows };
    for row in rows.iter().take(limit) {
        println!(
            "{:<8} {:>5} {:<7} {:<22} {:>6} {:>12} {:>14} {:>16}",
            row.subject,
            row.age.map(|a| format!("{:.0}", a)).unwrap_or_else(|| "--".to_string()),
            row.mattress.map(|m| m.to_string()).unwrap_or_else(|| "--".to_string()),
            row.posture,
            row.frames,
            format_value(row.mean),
            format_value(row.variance),
            format_value(row.total),
        );
    }
    if rows.len() > limit {
        println!("... {} more rows", rows.len() - limit);
    }
}

pub fn print_group_means(title: &str, measure: Measure, groups: &[GroupMean]) {
    println!("\n{}", title);
    println!("{}", "-".repeat(title.chars().count()));
    if groups.is_empty() {
        println!("  (no data)");
        return;
    }
    for group in groups {
        println!(
            "  {:<24} {:>14}  (n={})",
            group.key,
            format_value(group.value),
            group.count
        );
    }
    println!("  [{}]", measure.label());
}

pub fn print_warnings(warnings: &[ScanWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} warning(s):", warnings.len());
    for warning in warnings {
        println!("  Warning: {}", warning);
    }
}

pub fn print_signal_summary(analysis: &SignalAnalysis, top: usize) {
    println!("Samples:  {}", analysis.stats.count);
    println!("Mean:     {}", format_value(analysis.stats.mean));
    println!("Variance: {}", format_value(analysis.stats.variance));
    println!("Total:    {}", format_value(analysis.stats.total));

    let acf = &analysis.autocorrelation;
    if let Some(lag0) = acf.at_lag(0) {
        println!(
            "\nAutocorrelation: {} lags, value at lag 0 = {}",
            acf.values.len(),
            format_value(lag0)
        );
        for lag in [1, 2, 5, 10] {
            if let Some(value) = acf.at_lag(lag) {
                println!("  lag {:>3}: {}", lag, format_value(value));
            }
        }
    }

    let spectrum = &analysis.spectrum;
    if spectrum.is_empty() {
        println!("\nSpectrum: signal too short");
        return;
    }
    let mut bins: Vec<(f64, f64)> = spectrum
        .frequencies
        .iter()
        .copied()
        .zip(spectrum.magnitudes.iter().copied())
        .skip(1)
        .collect();
    bins.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!(
        "\nSpectrum: {} bins, DC magnitude = {}",
        spectrum.len(),
        format_value(spectrum.magnitudes[0])
    );
    for (freq, magnitude) in bins.iter().take(top) {
        println!("  f = {:.5}  |X| = {}", freq, format_value(*magnitude));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::LabelEncoding;
    use crate::experiment::{ExperimentKind, Mattress};
    use crate::signal_analysis::{analyze_signal, SignalStats};
    use tempfile::tempdir;

    fn sample_row() -> StatisticRow {
        let stats = SignalStats {
            count: 2048,
            mean: 1.5,
            variance: 0.25,
            total: 3072.0,
        };
        StatisticRow::new(
            ExperimentKind::II,
            "S4",
            "B1",
            PathBuf::from("S4/Air_Mat/Matrix_Air_B1.txt"),
            1,
            stats,
        )
        .with_mattress(Mattress::Air)
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Right (30°)"), "right_30");
        assert_eq!(slug("Supine (45° incline)"), "supine_45_incline");
        assert_eq!(slug("B1"), "b1");
    }

    #[test]
    fn test_write_rows_to_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/rows.csv");
        write_rows_to_csv(&path, &[sample_row()]).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[1], "subject");
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][0], "experiment-ii");
        assert_eq!(&records[0][2], "");
        assert_eq!(&records[0][3], "Air");
        assert_eq!(&records[0][7], "1.5");
    }

    #[test]
    fn test_write_chart_json() {
        let dir = tempdir().unwrap();
        let analysis = analyze_signal(&[1.0, 2.0, 3.0]);
        let payload = autocorrelation_chart("acf", &analysis.autocorrelation, &ChartTheme::default());
        let path = write_chart_json(dir.path(), "acf", &payload).unwrap();

        let json: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(path).unwrap()).unwrap();
        assert_eq!(json["title"], "acf");
        assert_eq!(json["series"][0]["mark"], "line");
        assert_eq!(json["series"][0]["x"][0], -2.0);
        assert_eq!(json["theme"]["background"], "#0e1117");
    }

    #[test]
    fn test_signal_chart_has_mean_line() {
        let analysis = analyze_signal(&[2.0, 4.0, 6.0]);
        let chart = signal_chart(&analysis, &ChartTheme::default());
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[1].y, vec![4.0, 4.0]);
        assert_eq!(chart.series[1].x, AxisValues::Numbers(vec![0.0, 2.0]));
    }

    #[test]
    fn test_trend_chart_pairs_points_and_fit() {
        let mut second = sample_row();
        second.posture_code = "B2".to_string();
        second.mean = 2.5;
        let encoding = LabelEncoding::fit(&["B1", "B2"]);
        let trend =
            crate::comparison::fit_linear_trend(&[sample_row(), second], &encoding).unwrap();
        let chart = trend_chart("trend", &trend, &ChartTheme::default());
        assert_eq!(chart.series[0].mark, Mark::Scatter);
        assert_eq!(chart.series[1].y, vec![1.5, 2.5]);
    }
}
