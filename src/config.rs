use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::experiment::{ExperimentKind, Mattress};

/// Explore pressure-mat recordings from sleep-posture studies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Dataset root containing experiment-i/ and experiment-ii/
    #[arg(long, env = "SLEEP_POSTURE_DATASET", default_value = "Dataset")]
    pub dataset: PathBuf,

    /// Subject metadata workbook with an Age column (.xlsx, or .csv), defaults to <dataset>/experiment-i/Date.xlsx
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Write the row table produced by the command to this CSV file
    #[arg(long, global = true)]
    pub csv_output: Option<PathBuf>,

    /// Write chart payloads (JSON) into this directory
    #[arg(long, global = true)]
    pub json_output: Option<PathBuf>,

    /// Maximum number of table rows to print (0 prints everything)
    #[arg(long, default_value = "0")]
    pub max_rows: usize,

    /// Use the light chart theme instead of the dark one
    #[arg(long)]
    pub light_theme: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Experiment I statistics table with mean and variance per posture
    Postures,

    /// Mean pressure per subject for one posture, ordered by age
    Posture {
        /// Posture label, e.g. "Right (30°)"
        #[arg(long)]
        label: String,
    },

    /// Autocorrelation of total pressure over time for a supine recording.
    /// Without --subject and --code, lists the available selections.
    Autocorr {
        #[arg(long)]
        subject: Option<String>,

        /// Posture file code (1..17)
        #[arg(long)]
        code: Option<String>,
    },

    /// Experiment II: mean and variance per position on each mattress
    Mattress {
        /// Restrict the per-position means to one mattress (Air or Sponge)
        #[arg(long)]
        mattress: Option<Mattress>,
    },

    /// Linear trend of mean pressure against encoded position (experiment II)
    Regression {
        #[arg(long, default_value = "Air")]
        mattress: Mattress,
    },

    /// List recording files under an experiment directory
    Files {
        /// Experiment directory name under the dataset root; lists experiments when omitted
        #[arg(long)]
        experiment: Option<String>,
    },

    /// Statistics, autocorrelation and spectrum of one file read as a flat signal
    Signal {
        path: PathBuf,

        /// Number of strongest spectrum bins to print
        #[arg(long, default_value = "5")]
        top: usize,
    },
}

impl Args {
    pub fn experiment_root(&self, kind: ExperimentKind) -> PathBuf {
        kind.root(&self.dataset)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata
            .clone()
            .unwrap_or_else(|| self.experiment_root(ExperimentKind::I).join("Date.xlsx"))
    }

    pub fn theme(&self) -> ChartTheme {
        if self.light_theme {
            ChartTheme::light()
        } else {
            ChartTheme::default()
        }
    }
}

/// Colours handed to whatever renders the chart payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartTheme {
    pub background: String,
    pub foreground: String,
    pub grid: String,
    pub grid_alpha: f32,
    pub bar: String,
    pub signal: String,
    pub mean_line: String,
    pub autocorrelation: String,
    pub spectrum: String,
    pub trend_points: String,
    pub trend_line: String,
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self {
            background: "#0e1117".to_string(),
            foreground: "white".to_string(),
            grid: "grey".to_string(),
            grid_alpha: 0.8,
            bar: "deepskyblue".to_string(),
            signal: "cyan".to_string(),
            mean_line: "red".to_string(),
            autocorrelation: "magenta".to_string(),
            spectrum: "lime".to_string(),
            trend_points: "cyan".to_string(),
            trend_line: "red".to_string(),
        }
    }
}

impl ChartTheme {
    pub fn light() -> Self {
        Self {
            background: "white".to_string(),
            foreground: "black".to_string(),
            grid: "lightgrey".to_string(),
            grid_alpha: 0.5,
            ..Self::default()
        }
    }
}
