pub mod comparison;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod experiment;
pub mod indexing;
pub mod output;
pub mod signal_analysis;

use std::fmt;
use std::path::PathBuf;

use experiment::{ExperimentKind, Mattress};
use serde::Serialize;
use signal_analysis::SignalStats;

/// Summary statistics of one recording, the unit of every comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticRow {
    pub experiment: ExperimentKind,
    pub subject: String,
    pub age: Option<f64>,
    pub mattress: Option<Mattress>,
    /// File-level posture code: `1`..`17` for experiment I, `B1`, `C2`, ... for II.
    pub posture_code: String,
    pub posture: String,
    pub source: PathBuf,
    pub frames: usize,
    pub mean: f64,
    pub variance: f64,
    pub total: f64,
}

impl StatisticRow {
    pub fn new(
        experiment: ExperimentKind,
        subject: &str,
        posture_code: &str,
        source: PathBuf,
        frames: usize,
        stats: SignalStats,
    ) -> Self {
        Self {
            experiment,
            subject: subject.to_string(),
            age: None,
            mattress: None,
            posture_code: posture_code.to_string(),
            posture: experiment
                .label_for(posture_code)
                .unwrap_or_else(|| posture_code.to_string()),
            source,
            frames,
            mean: stats.mean,
            variance: stats.variance,
            total: stats.total,
        }
    }

    pub fn with_age(mut self, age: Option<f64>) -> Self {
        self.age = age;
        self
    }

    pub fn with_mattress(mut self, mattress: Mattress) -> Self {
        self.mattress = Some(mattress);
        self
    }
}

/// A file or subject that was skipped during a scan, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub rows: Vec<StatisticRow>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    pub fn warn(&mut self, path: impl Into<PathBuf>, message: impl Into<String>) {
        let warning = ScanWarning {
            path: path.into(),
            message: message.into(),
        };
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
