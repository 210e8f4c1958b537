use std::collections::BTreeSet;
use std::fmt;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::experiment::{is_supine, Mattress};
use crate::StatisticRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Posture,
    Mattress,
    Subject,
}

impl GroupBy {
    fn key(&self, row: &StatisticRow) -> Option<String> {
        match self {
            GroupBy::Posture => Some(row.posture.clone()),
            GroupBy::Mattress => row.mattress.map(|m| m.name().to_string()),
            GroupBy::Subject => Some(row.subject.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Mean,
    Variance,
    Total,
}

impl Measure {
    pub fn value(&self, row: &StatisticRow) -> f64 {
        match self {
            Measure::Mean => row.mean,
            Measure::Variance => row.variance,
            Measure::Total => row.total,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Measure::Mean => "Mean pressure",
            Measure::Variance => "Variance",
            Measure::Total => "Total pressure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub key: String,
    pub value: f64,
    pub count: usize,
}

/// Arithmetic mean of `measure` per group, sorted by group key. Rows
/// without the key (e.g. no mattress in experiment I) are left out.
pub fn group_means(
    rows: &[StatisticRow],
    group_by: GroupBy,
    measure: Measure,
) -> Result<Vec<GroupMean>> {
    let (keys, values): (Vec<String>, Vec<f64>) = rows
        .iter()
        .filter_map(|row| Some((group_by.key(row)?, measure.value(row))))
        .unzip();

    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let df = df!(
        "key" => keys,
        "value" => values,
    )?;

    let grouped = df
        .lazy()
        .group_by_stable([col("key")])
        .agg([
            col("value").mean().alias("mean"),
            col("value").count().cast(DataType::Int64).alias("count"),
        ])
        .collect()?;

    let keys = grouped.column("key")?.as_materialized_series().str()?;
    let means = grouped.column("mean")?.as_materialized_series().f64()?;
    let counts = grouped.column("count")?.as_materialized_series().i64()?;

    let mut result: Vec<GroupMean> = keys
        .into_iter()
        .zip(means.into_iter())
        .zip(counts.into_iter())
        .filter_map(|((key, mean), count)| {
            Some(GroupMean {
                key: key?.to_string(),
                value: mean.unwrap_or(f64::NAN),
                count: count.unwrap_or(0) as usize,
            })
        })
        .collect();

    result.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(result)
}

pub fn filter_by_posture(rows: &[StatisticRow], posture: &str) -> Vec<StatisticRow> {
    rows.iter().filter(|r| r.posture == posture).cloned().collect()
}

pub fn filter_by_mattress(rows: &[StatisticRow], mattress: Mattress) -> Vec<StatisticRow> {
    rows.iter()
        .filter(|r| r.mattress == Some(mattress))
        .cloned()
        .collect()
}

/// Youngest first; subjects without an age go last.
pub fn sorted_by_age(mut rows: Vec<StatisticRow>) -> Vec<StatisticRow> {
    rows.sort_by(|a, b| {
        let a = a.age.unwrap_or(f64::INFINITY);
        let b = b.age.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });
    rows
}

pub fn distinct_postures(rows: &[StatisticRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.posture.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn distinct_mattresses(rows: &[StatisticRow]) -> Vec<Mattress> {
    rows.iter()
        .filter_map(|r| r.mattress)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Dense integer codes for categorical labels, assigned in sorted label
/// order so the same label set always encodes the same way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelEncoding {
    pub classes: Vec<String>,
}

impl LabelEncoding {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self { classes }
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub subject: String,
    pub position: String,
    pub x: f64,
    pub y: f64,
    pub predicted: f64,
}

/// Ordinary least squares fit of mean pressure against encoded position.
/// Descriptive only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub points: Vec<TrendPoint>,
}

impl LinearTrend {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Least squares line through `(xs, ys)`. A degenerate x (no spread)
/// gives a flat line through the mean of `ys`.
pub fn ols(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return None;
    }
    let x_mean = xs[..n].iter().sum::<f64>() / n as f64;
    let y_mean = ys[..n].iter().sum::<f64>() / n as f64;

    let (sxx, sxy) = xs[..n]
        .iter()
        .zip(&ys[..n])
        .fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
            let dx = x - x_mean;
            (sxx + dx * dx, sxy + dx * (y - y_mean))
        });

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    Some((slope, y_mean - slope * x_mean))
}

pub fn fit_linear_trend(rows: &[StatisticRow], encoding: &LabelEncoding) -> Option<LinearTrend> {
    let encoded: Vec<(&StatisticRow, f64)> = rows
        .iter()
        .filter_map(|r| Some((r, encoding.index_of(&r.posture_code)? as f64)))
        .collect();

    let xs: Vec<f64> = encoded.iter().map(|(_, x)| *x).collect();
    let ys: Vec<f64> = encoded.iter().map(|(r, _)| r.mean).collect();
    let (slope, intercept) = ols(&xs, &ys)?;

    let y_mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let points = encoded
        .iter()
        .map(|(row, x)| {
            let predicted = intercept + slope * x;
            ss_res += (row.mean - predicted).powi(2);
            ss_tot += (row.mean - y_mean).powi(2);
            TrendPoint {
                subject: row.subject.clone(),
                position: row.posture_code.clone(),
                x: *x,
                y: row.mean,
                predicted,
            }
        })
        .collect();

    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Some(LinearTrend {
        slope,
        intercept,
        r_squared,
        points,
    })
}

/// One supine recording a user can pick for the autocorrelation view.
/// Carries the posture code, since several codes share the "Supine" label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupineSelection {
    pub subject: String,
    pub posture_code: String,
    pub posture: String,
}

impl fmt::Display for SupineSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} (#{})",
            self.subject, self.posture, self.posture_code
        )
    }
}

pub fn supine_selections(rows: &[StatisticRow]) -> Vec<SupineSelection> {
    let mut seen = BTreeSet::new();
    rows.iter()
        .filter(|r| is_supine(&r.posture))
        .filter(|r| seen.insert((r.subject.clone(), r.posture_code.clone())))
        .map(|r| SupineSelection {
            subject: r.subject.clone(),
            posture_code: r.posture_code.clone(),
            posture: r.posture.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentKind;
    use crate::signal_analysis::SignalStats;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn row(subject: &str, code: &str, mean: f64) -> StatisticRow {
        let stats = SignalStats {
            count: 1,
            mean,
            variance: mean / 2.0,
            total: mean * 10.0,
        };
        StatisticRow::new(
            ExperimentKind::I,
            subject,
            code,
            PathBuf::from(format!("{}/{}.txt", subject, code)),
            1,
            stats,
        )
    }

    fn exp2_row(subject: &str, mattress: Mattress, code: &str, mean: f64) -> StatisticRow {
        let mut r = row(subject, code, mean).with_mattress(mattress);
        r.experiment = ExperimentKind::II;
        r.posture = code.to_string();
        r
    }

    #[test]
    fn test_group_means_fixture() {
        let rows = vec![
            exp2_row("S1", Mattress::Air, "A", 10.0),
            exp2_row("S2", Mattress::Air, "A", 20.0),
            exp2_row("S1", Mattress::Air, "B", 5.0),
        ];
        let means = group_means(&rows, GroupBy::Posture, Measure::Mean).unwrap();
        assert_eq!(means.len(), 2);
        assert_eq!(means[0].key, "A");
        assert_relative_eq!(means[0].value, 15.0);
        assert_eq!(means[0].count, 2);
        assert_eq!(means[1].key, "B");
        assert_relative_eq!(means[1].value, 5.0);
    }

    #[test]
    fn test_group_means_merges_shared_labels() {
        // codes 8 and 9 are both "Supine"
        let rows = vec![row("S1", "8", 2.0), row("S1", "9", 4.0), row("S1", "2", 1.0)];
        let means = group_means(&rows, GroupBy::Posture, Measure::Variance).unwrap();
        let supine = means.iter().find(|g| g.key == "Supine").unwrap();
        assert_relative_eq!(supine.value, 1.5);
        assert_eq!(supine.count, 2);
    }

    #[test]
    fn test_group_means_skips_rows_without_key() {
        let rows = vec![row("S1", "1", 3.0)];
        assert!(group_means(&rows, GroupBy::Mattress, Measure::Mean)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sorted_by_age_puts_unknown_last() {
        let rows = vec![
            row("S1", "1", 1.0).with_age(None),
            row("S2", "1", 1.0).with_age(Some(40.0)),
            row("S3", "1", 1.0).with_age(Some(22.0)),
        ];
        let subjects: Vec<String> = sorted_by_age(rows).into_iter().map(|r| r.subject).collect();
        assert_eq!(subjects, vec!["S3", "S2", "S1"]);
    }

    #[test]
    fn test_label_encoding_is_sorted() {
        let encoding = LabelEncoding::fit(&["C2", "B1", "C2", "A3"]);
        assert_eq!(encoding.classes, vec!["A3", "B1", "C2"]);
        assert_eq!(encoding.index_of("C2"), Some(2));
        assert_eq!(encoding.index_of("A3"), Some(0));
        assert_eq!(encoding.index_of("Z9"), None);
    }

    #[test]
    fn test_ols_recovers_exact_line() {
        let (slope, intercept) = ols(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert_relative_eq!(slope, 2.0);
        assert_relative_eq!(intercept, 1.0);
        assert!(ols(&[], &[]).is_none());
    }

    #[test]
    fn test_ols_flat_for_single_position() {
        let (slope, intercept) = ols(&[1.0, 1.0], &[2.0, 4.0]).unwrap();
        assert_eq!(slope, 0.0);
        assert_relative_eq!(intercept, 3.0);
    }

    #[test]
    fn test_fit_linear_trend_on_positions() {
        let rows = vec![
            exp2_row("S1", Mattress::Air, "B1", 10.0),
            exp2_row("S1", Mattress::Air, "B2", 12.0),
            exp2_row("S1", Mattress::Air, "B3", 14.0),
        ];
        let encoding = LabelEncoding::fit(&["B1", "B2", "B3", "C1"]);
        let trend = fit_linear_trend(&rows, &encoding).unwrap();
        assert_relative_eq!(trend.slope, 2.0);
        assert_relative_eq!(trend.intercept, 10.0);
        assert_relative_eq!(trend.r_squared, 1.0);
        assert_relative_eq!(trend.predict(3.0), 16.0);
        assert_eq!(trend.points.len(), 3);
        assert_eq!(trend.points[2].position, "B3");
    }

    #[test]
    fn test_supine_selections_keep_codes_apart() {
        let rows = vec![
            row("S1", "1", 1.0),
            row("S1", "2", 1.0),
            row("S1", "8", 1.0),
            row("S1", "11", 1.0),
            row("S1", "11", 1.0),
        ];
        let selections = supine_selections(&rows);
        let codes: Vec<&str> = selections.iter().map(|s| s.posture_code.as_str()).collect();
        assert_eq!(codes, vec!["1", "8", "11"]);
        assert_eq!(selections[2].to_string(), "S1 - Supine (#11)");
    }

    #[test]
    fn test_distinct_values_are_sorted() {
        let rows = vec![
            exp2_row("S1", Mattress::Sponge, "C1", 1.0),
            exp2_row("S1", Mattress::Air, "B1", 1.0),
        ];
        assert_eq!(distinct_postures(&rows), vec!["B1", "C1"]);
        assert_eq!(distinct_mattresses(&rows), vec![Mattress::Air, Mattress::Sponge]);
    }
}
