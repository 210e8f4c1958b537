use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

/// Height and width of a single pressure frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameDims {
    pub height: usize,
    pub width: usize,
}

impl FrameDims {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn area(&self) -> usize {
        self.height * self.width
    }
}

impl fmt::Display for FrameDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

pub const NUM_POSTURES: u8 = 17;

/// Posture names for experiment I, indexed by file number 1..=17.
/// Several codes share the plain "Supine" label.
const EXPERIMENT_ONE_POSTURES: [&str; NUM_POSTURES as usize] = [
    "Supine (0°)",
    "Right (0°)",
    "Left (0°)",
    "Right (30°)",
    "Right (60°)",
    "Left (30°)",
    "Left (60°)",
    "Supine",
    "Supine",
    "Supine",
    "Supine",
    "Supine",
    "Right Fetus",
    "Left Fetus",
    "Supine (30° incline)",
    "Supine (45° incline)",
    "Supine (60° incline)",
];

pub const SUPINE_LABELS: [&str; 5] = [
    "Supine (0°)",
    "Supine",
    "Supine (30° incline)",
    "Supine (45° incline)",
    "Supine (60° incline)",
];

pub fn is_supine(label: &str) -> bool {
    SUPINE_LABELS.contains(&label)
}

/// Label for an experiment I posture code, `None` outside 1..=17.
pub fn posture_label(code: u8) -> Option<&'static str> {
    if code == 0 {
        return None;
    }
    EXPERIMENT_ONE_POSTURES.get(code as usize - 1).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Mattress {
    Air,
    Sponge,
}

impl Mattress {
    pub const ALL: [Mattress; 2] = [Mattress::Air, Mattress::Sponge];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Mattress::Air => "Air_Mat",
            Mattress::Sponge => "Sponge_Mat",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mattress::Air => "Air",
            Mattress::Sponge => "Sponge",
        }
    }
}

impl fmt::Display for Mattress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mattress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "air" | "air_mat" => Ok(Mattress::Air),
            "sponge" | "sponge_mat" => Ok(Mattress::Sponge),
            _ => Err(format!("Invalid mattress type: {}. Use Air or Sponge", s)),
        }
    }
}

/// The two recording campaigns in the dataset. Each carries its own frame
/// geometry, directory layout and posture naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExperimentKind {
    /// `experiment-i/S<N>/<code>.txt`, posture codes 1..=17.
    I,
    /// `experiment-ii/<subject>/<Mattress>_Mat/*Matrix*_<Code>.txt`.
    II,
}

impl ExperimentKind {
    pub fn frame_dims(&self) -> FrameDims {
        match self {
            ExperimentKind::I => FrameDims::new(32, 64),
            ExperimentKind::II => FrameDims::new(27, 64),
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            ExperimentKind::I => "experiment-i",
            ExperimentKind::II => "experiment-ii",
        }
    }

    pub fn root(&self, dataset: &Path) -> PathBuf {
        dataset.join(self.dir_name())
    }

    /// Display label for a posture code within this experiment.
    pub fn label_for(&self, code: &str) -> Option<String> {
        match self {
            ExperimentKind::I => code
                .parse::<u8>()
                .ok()
                .and_then(posture_label)
                .map(str::to_string),
            ExperimentKind::II => {
                if code.is_empty() {
                    None
                } else {
                    Some(code.to_string())
                }
            }
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Experiment II posture code: the token after the final underscore of the
/// file stem, e.g. `Matrix_Air_B1.txt` -> `B1`. A stem without underscores
/// is its own code.
pub fn posture_code_from_filename(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);
    let code = stem.rsplit('_').next().unwrap_or(stem);
    (!code.is_empty()).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posture_labels_cover_all_codes() {
        assert_eq!(posture_label(1), Some("Supine (0°)"));
        assert_eq!(posture_label(4), Some("Right (30°)"));
        assert_eq!(posture_label(17), Some("Supine (60° incline)"));
        assert_eq!(posture_label(0), None);
        assert_eq!(posture_label(18), None);
    }

    #[test]
    fn test_supine_label_is_shared() {
        let supine: Vec<u8> = (1..=NUM_POSTURES)
            .filter(|&code| posture_label(code) == Some("Supine"))
            .collect();
        assert_eq!(supine, vec![8, 9, 10, 11, 12]);
        assert_eq!(posture_label(14), Some("Left Fetus"));
    }

    #[test]
    fn test_experiment_geometry() {
        assert_eq!(ExperimentKind::I.frame_dims(), FrameDims::new(32, 64));
        assert_eq!(ExperimentKind::II.frame_dims().area(), 27 * 64);
        assert_eq!(
            ExperimentKind::II.root(Path::new("Dataset")),
            PathBuf::from("Dataset/experiment-ii")
        );
    }

    #[test]
    fn test_label_for() {
        assert_eq!(ExperimentKind::I.label_for("13").as_deref(), Some("Right Fetus"));
        assert_eq!(ExperimentKind::I.label_for("B1"), None);
        assert_eq!(ExperimentKind::II.label_for("B1").as_deref(), Some("B1"));
    }

    #[test]
    fn test_posture_code_from_filename() {
        assert_eq!(posture_code_from_filename("Matrix_Air_B1.txt"), Some("B1"));
        assert_eq!(posture_code_from_filename("Matrix_Sponge_C2.txt"), Some("C2"));
        assert_eq!(posture_code_from_filename("Matrix.txt"), Some("Matrix"));
        assert_eq!(posture_code_from_filename("Matrix_.txt"), None);
    }

    #[test]
    fn test_mattress_from_str() {
        assert_eq!("air".parse::<Mattress>(), Ok(Mattress::Air));
        assert_eq!("Sponge_Mat".parse::<Mattress>(), Ok(Mattress::Sponge));
        assert!("foam".parse::<Mattress>().is_err());
    }
}
