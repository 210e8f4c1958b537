use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::data_loading::{load_frames, read_subject_metadata, SubjectInfo};
use crate::error::{AnalysisError, Result};
use crate::experiment::{
    posture_code_from_filename, posture_label, ExperimentKind, FrameDims, Mattress,
    NUM_POSTURES,
};
use crate::signal_analysis::{analyze_frames, SignalAnalysis, SignalStats};
use crate::{ScanReport, StatisticRow};

/// A user selection that should map to exactly one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub subject: String,
    pub mattress: Option<Mattress>,
    pub posture_code: String,
}

fn walk_entries(dir: &Path, max_depth: usize) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    walk_entries(dir, 1)
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}

fn is_text_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("txt")
}

/// Sub-directories of the dataset root, one per experiment.
pub fn list_experiments(dataset: &Path) -> Vec<PathBuf> {
    subdirectories(dataset)
}

/// Every `.txt` file below `dir`, sorted by path.
pub fn list_data_files(dir: &Path) -> Vec<PathBuf> {
    walk_entries(dir, usize::MAX)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_text_file(p))
        .collect()
}

/// Experiment II pressure matrices in one mattress directory.
fn matrix_files(dir: &Path) -> Vec<PathBuf> {
    walk_entries(dir, 1)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_text_file(p) && file_name(p).contains("Matrix"))
        .collect()
}

fn summarize_recording(path: &Path, dims: FrameDims) -> Result<(usize, SignalStats)> {
    let frames = load_frames(path, dims)?;
    debug!("Loaded {} ({} frames of {})", path.display(), frames.len(), dims);
    Ok((frames.len(), SignalStats::from_frames(&frames)))
}

fn is_subject_dir_name(name: &str) -> bool {
    name.strip_prefix('S')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Subject ids come from metadata row order while data lives in `S<N>`
/// directories. Report both directions of drift instead of dropping data
/// silently.
fn check_subject_dirs(root: &Path, subjects: &[SubjectInfo], report: &mut ScanReport) {
    let known: HashSet<&str> = subjects.iter().map(|s| s.id.as_str()).collect();

    for subject in subjects {
        let dir = root.join(&subject.id);
        if !dir.is_dir() {
            report.warn(
                dir,
                format!("no recordings directory for metadata subject {}", subject.id),
            );
        }
    }

    for dir in subdirectories(root) {
        let name = file_name(&dir);
        if is_subject_dir_name(name) && !known.contains(name) {
            let message = format!("{} has no metadata row; its recordings are excluded", name);
            report.warn(dir, message);
        }
    }
}

/// Experiment I: every subject in the metadata table against posture codes
/// 1..=17. Missing files are skipped; files that fail to load or reshape
/// become warnings. Only an unreadable metadata table is an error.
pub fn scan_experiment_one(root: &Path, metadata: &Path) -> Result<ScanReport> {
    let kind = ExperimentKind::I;
    let subjects = read_subject_metadata(metadata)?;
    let dims = kind.frame_dims();
    let mut report = ScanReport::default();

    check_subject_dirs(root, &subjects, &mut report);

    for subject in &subjects {
        let subject_dir = root.join(&subject.id);
        if !subject_dir.is_dir() {
            continue;
        }

        for code in 1..=NUM_POSTURES {
            let path = subject_dir.join(format!("{}.txt", code));
            if !path.is_file() {
                continue;
            }
            match summarize_recording(&path, dims) {
                Ok((frames, stats)) => report.rows.push(
                    StatisticRow::new(kind, &subject.id, &code.to_string(), path, frames, stats)
                        .with_age(subject.age),
                ),
                Err(e) => report.warn(path, e.to_string()),
            }
        }
    }

    info!(
        "{}: {} recordings from {} subjects, {} warnings",
        kind,
        report.rows.len(),
        subjects.len(),
        report.warnings.len()
    );
    Ok(report)
}

/// Experiment II: `<subject>/<Mattress>_Mat/*Matrix*_<Code>.txt`.
pub fn scan_experiment_two(root: &Path) -> ScanReport {
    let kind = ExperimentKind::II;
    let dims = kind.frame_dims();
    let mut report = ScanReport::default();

    if !root.is_dir() {
        report.warn(root, "experiment directory not found");
        return report;
    }

    for subject_dir in subdirectories(root) {
        let subject = file_name(&subject_dir).to_string();

        for mattress in Mattress::ALL {
            let mat_dir = subject_dir.join(mattress.dir_name());
            if !mat_dir.is_dir() {
                continue;
            }

            for path in matrix_files(&mat_dir) {
                let Some(code) = posture_code_from_filename(file_name(&path)).map(str::to_string)
                else {
                    report.warn(path, "empty posture code in file name");
                    continue;
                };
                match summarize_recording(&path, dims) {
                    Ok((frames, stats)) => report.rows.push(
                        StatisticRow::new(kind, &subject, &code, path, frames, stats)
                            .with_mattress(mattress),
                    ),
                    Err(e) => report.warn(path, e.to_string()),
                }
            }
        }
    }

    info!(
        "{}: {} recordings, {} warnings",
        kind,
        report.rows.len(),
        report.warnings.len()
    );
    report
}

/// Map a selection to its recording on disk.
pub fn resolve_recording(
    kind: ExperimentKind,
    root: &Path,
    selection: &Selection,
) -> Result<PathBuf> {
    let subject_dir = root.join(&selection.subject);

    let path = match kind {
        ExperimentKind::I => {
            let code = selection
                .posture_code
                .parse::<u8>()
                .ok()
                .filter(|&c| posture_label(c).is_some())
                .ok_or_else(|| {
                    AnalysisError::Lookup(format!(
                        "unknown posture code '{}'",
                        selection.posture_code
                    ))
                })?;
            subject_dir.join(format!("{}.txt", code))
        }
        ExperimentKind::II => {
            let mattress = selection.mattress.ok_or_else(|| {
                AnalysisError::Lookup("experiment II selections need a mattress type".to_string())
            })?;
            matrix_files(&subject_dir.join(mattress.dir_name()))
                .into_iter()
                .find(|p| {
                    posture_code_from_filename(file_name(p))
                        == Some(selection.posture_code.as_str())
                })
                .ok_or_else(|| {
                    AnalysisError::Lookup(format!(
                        "no {} recording for {} posture {}",
                        mattress, selection.subject, selection.posture_code
                    ))
                })?
        }
    };

    if !path.is_file() {
        return Err(AnalysisError::Lookup(format!(
            "no recording at {}",
            path.display()
        )));
    }
    Ok(path)
}

/// Pressure-over-time analysis of one selected recording.
pub fn analyze_selection(
    kind: ExperimentKind,
    root: &Path,
    selection: &Selection,
) -> Result<SignalAnalysis> {
    let path = resolve_recording(kind, root, selection)?;
    let frames = load_frames(&path, kind.frame_dims())?;
    Ok(analyze_frames(&frames))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_dir_names() {
        assert!(is_subject_dir_name("S1"));
        assert!(is_subject_dir_name("S13"));
        assert!(!is_subject_dir_name("S"));
        assert!(!is_subject_dir_name("Sx"));
        assert!(!is_subject_dir_name("subject1"));
    }

    #[test]
    fn test_resolve_rejects_unknown_code() {
        let selection = Selection {
            subject: "S1".to_string(),
            mattress: None,
            posture_code: "18".to_string(),
        };
        let err = resolve_recording(ExperimentKind::I, Path::new("nowhere"), &selection)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Lookup(_)));
    }

    #[test]
    fn test_resolve_experiment_two_needs_mattress() {
        let selection = Selection {
            subject: "S1".to_string(),
            mattress: None,
            posture_code: "B1".to_string(),
        };
        assert!(matches!(
            resolve_recording(ExperimentKind::II, Path::new("nowhere"), &selection),
            Err(AnalysisError::Lookup(_))
        ));
    }
}
