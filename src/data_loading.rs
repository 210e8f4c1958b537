use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use log::{trace, warn};
use ndarray::{Array3, ArrayView2, Axis};
use serde::Serialize;

use crate::error::{AnalysisError, Result};
use crate::experiment::FrameDims;

/// A numeric text matrix flattened in row-major order.
#[derive(Debug, Clone)]
pub struct Matrix {
    pub values: Vec<f64>,
    pub rows: usize,
    pub columns: usize,
}

/// A time series of pressure frames, `frames x height x width`.
#[derive(Debug, Clone)]
pub struct FrameStack {
    data: Array3<f64>,
}

impl FrameStack {
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> FrameDims {
        let (_, height, width) = self.data.dim();
        FrameDims::new(height, width)
    }

    pub fn frame(&self, idx: usize) -> Option<ArrayView2<'_, f64>> {
        (idx < self.len()).then(|| self.data.index_axis(Axis(0), idx))
    }

    pub fn frames(&self) -> impl Iterator<Item = ArrayView2<'_, f64>> {
        self.data.outer_iter()
    }

    pub fn array(&self) -> &Array3<f64> {
        &self.data
    }
}

/// Parse a whitespace-delimited numeric matrix. `#` starts a comment and
/// blank lines are ignored; every remaining row must have the same width.
pub fn parse_matrix<R: BufRead>(reader: R, origin: &Path) -> Result<Matrix> {
    let mut values = Vec::new();
    let mut rows = 0;
    let mut columns: Option<usize> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| match e.kind() {
            ErrorKind::InvalidData => AnalysisError::parse(origin, line_no, "not valid UTF-8 text"),
            _ => AnalysisError::io(origin, e),
        })?;
        let content = line.split('#').next().unwrap_or("");

        let before = values.len();
        for token in content.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                AnalysisError::parse(origin, line_no, format!("not a number: '{}'", token))
            })?;
            values.push(value);
        }

        let width = values.len() - before;
        if width == 0 {
            continue;
        }
        match columns {
            None => columns = Some(width),
            Some(expected) if expected != width => {
                return Err(AnalysisError::parse(
                    origin,
                    line_no,
                    format!("expected {} columns, found {}", expected, width),
                ));
            }
            Some(_) => {}
        }
        rows += 1;
    }

    if values.is_empty() {
        return Err(AnalysisError::parse(origin, 0, "file contains no samples"));
    }

    Ok(Matrix {
        values,
        rows,
        columns: columns.unwrap_or(0),
    })
}

pub fn read_matrix(path: impl AsRef<Path>) -> Result<Matrix> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let matrix = parse_matrix(BufReader::new(file), path)?;
    trace!(
        "Read {} ({} rows x {} columns)",
        path.display(),
        matrix.rows,
        matrix.columns
    );
    Ok(matrix)
}

/// Load a recording as a flat signal.
pub fn load_signal(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    Ok(read_matrix(path)?.values)
}

/// Reshape a flat signal into `len / (height * width)` frames.
pub fn reshape_frames(signal: Vec<f64>, height: usize, width: usize) -> Result<FrameStack> {
    let len = signal.len();
    let area = height * width;
    if area == 0 || len % area != 0 {
        return Err(AnalysisError::Shape { len, height, width });
    }

    let data = Array3::from_shape_vec((len / area, height, width), signal)
        .map_err(|_| AnalysisError::Shape { len, height, width })?;
    Ok(FrameStack { data })
}

pub fn load_frames(path: impl AsRef<Path>, dims: FrameDims) -> Result<FrameStack> {
    let signal = load_signal(path)?;
    reshape_frames(signal, dims.height, dims.width)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectInfo {
    pub id: String,
    pub age: Option<f64>,
}

/// Read the per-subject metadata table: the first sheet of the study
/// workbook, or a CSV export when the path ends in `.csv`. Subject ids are
/// positional: the first data row is `S1`, the second `S2`, and so on.
pub fn read_subject_metadata(path: impl AsRef<Path>) -> Result<Vec<SubjectInfo>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let ages = if is_csv {
        read_csv_ages(path)?
    } else {
        read_workbook_ages(path)?
    };
    trace!("Read {} subjects from {}", ages.len(), path.display());

    Ok(ages
        .into_iter()
        .enumerate()
        .map(|(row, age)| SubjectInfo {
            id: subject_id(row),
            age,
        })
        .collect())
}

fn subject_id(row: usize) -> String {
    format!("S{}", row + 1)
}

fn missing_age_column(path: &Path) -> AnalysisError {
    AnalysisError::Metadata(format!("{} has no 'Age' column", path.display()))
}

fn parse_age(path: &Path, row: usize, cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(age) => Some(age),
        Err(_) => {
            warn!(
                "{}: unreadable age '{}' for {}",
                path.display(),
                cell,
                subject_id(row)
            );
            None
        }
    }
}

fn read_csv_ages(path: &Path) -> Result<Vec<Option<f64>>> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let age_idx = rdr
        .headers()?
        .iter()
        .position(|h| h == "Age")
        .ok_or_else(|| missing_age_column(path))?;

    let mut ages = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        ages.push(record.get(age_idx).and_then(|cell| parse_age(path, row, cell)));
    }
    Ok(ages)
}

fn workbook_error(path: &Path, err: calamine::Error) -> AnalysisError {
    match err {
        calamine::Error::Io(source) => AnalysisError::io(path, source),
        other => AnalysisError::Metadata(format!("{}: {}", path.display(), other)),
    }
}

fn read_workbook_ages(path: &Path) -> Result<Vec<Option<f64>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::Metadata(format!("{} has no sheets", path.display())))?
        .map_err(|e| workbook_error(path, e))?;

    let mut rows = range.rows();
    let age_idx = rows
        .next()
        .and_then(|header| {
            header
                .iter()
                .position(|cell| matches!(cell, Data::String(h) if h.trim() == "Age"))
        })
        .ok_or_else(|| missing_age_column(path))?;

    let ages = rows
        .filter(|cells| cells.iter().any(|cell| !matches!(cell, Data::Empty)))
        .enumerate()
        .map(|(row, cells)| match cells.get(age_idx) {
            Some(Data::Float(age)) => Some(*age),
            Some(Data::Int(age)) => Some(*age as f64),
            Some(Data::String(cell)) => parse_age(path, row, cell),
            Some(Data::Empty) | None => None,
            Some(other) => {
                warn!(
                    "{}: unreadable age {:?} for {}",
                    path.display(),
                    other,
                    subject_id(row)
                );
                None
            }
        })
        .collect();
    Ok(ages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn parse(text: &str) -> Result<Matrix> {
        parse_matrix(Cursor::new(text), Path::new("fixture.txt"))
    }

    #[test]
    fn test_parse_matrix_flattens_rows() {
        let m = parse("1 2 3\n4 5 6\n").unwrap();
        assert_eq!(m.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!((m.rows, m.columns), (2, 3));
    }

    #[test]
    fn test_parse_matrix_skips_comments_and_blank_lines() {
        let m = parse("# header\n1.5\t2\n\n3 4e1 # trailing\n").unwrap();
        assert_eq!(m.values, vec![1.5, 2.0, 3.0, 40.0]);
        assert_eq!(m.rows, 2);
    }

    #[test]
    fn test_parse_matrix_rejects_non_numeric() {
        let err = parse("1 2\n3 x\n").unwrap_err();
        match err {
            AnalysisError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("'x'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_matrix_rejects_invalid_utf8() {
        let bytes = vec![b'1', b' ', b'2', b'\n', 0xff, 0xfe, b'\n'];
        let err = parse_matrix(Cursor::new(bytes), Path::new("fixture.txt")).unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_matrix_rejects_ragged_rows() {
        assert!(matches!(
            parse("1 2 3\n4 5\n"),
            Err(AnalysisError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_parse_matrix_rejects_empty_input() {
        assert!(matches!(parse("\n# nothing\n"), Err(AnalysisError::Parse { .. })));
    }

    #[test]
    fn test_load_signal_missing_file_is_io_error() {
        let err = load_signal("definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    #[test]
    fn test_reshape_frames_counts_frames() {
        let signal: Vec<f64> = (0..2 * 3 * 4).map(|v| v as f64).collect();
        let frames = reshape_frames(signal, 2, 3).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.dims(), FrameDims::new(2, 3));
        let second = frames.frame(1).unwrap();
        assert_eq!(second[[0, 0]], 6.0);
        assert_eq!(second[[1, 2]], 11.0);
        assert!(frames.frame(4).is_none());
    }

    #[test]
    fn test_reshape_frames_rejects_partial_frame() {
        let err = reshape_frames(vec![0.0; 7], 2, 3).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Shape {
                len: 7,
                height: 2,
                width: 3
            }
        ));
    }

    #[test]
    fn test_reshape_frames_rejects_zero_area() {
        assert!(reshape_frames(vec![1.0; 4], 0, 4).is_err());
    }

    #[test]
    fn test_read_subject_metadata_trims_headers() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, " Gender , Age ,Weight").unwrap();
        writeln!(file, "M,25,70").unwrap();
        writeln!(file, "F, 31 ,60").unwrap();
        writeln!(file, "M,,80").unwrap();

        let subjects = read_subject_metadata(file.path()).unwrap();
        assert_eq!(subjects.len(), 3);
        assert_eq!(subjects[0].id, "S1");
        assert_eq!(subjects[0].age, Some(25.0));
        assert_eq!(subjects[1].age, Some(31.0));
        assert_eq!(subjects[2].id, "S3");
        assert_eq!(subjects[2].age, None);
    }

    #[test]
    fn test_read_subject_metadata_from_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Date.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Gender").unwrap();
        sheet.write_string(0, 1, " Age ").unwrap();
        sheet.write_string(1, 0, "M").unwrap();
        sheet.write_number(1, 1, 25.0).unwrap();
        sheet.write_string(2, 0, "F").unwrap();
        sheet.write_string(2, 1, " 31 ").unwrap();
        sheet.write_string(3, 0, "M").unwrap();
        workbook.save(&path).unwrap();

        let subjects = read_subject_metadata(&path).unwrap();
        assert_eq!(subjects.len(), 3);
        assert_eq!(subjects[0].id, "S1");
        assert_eq!(subjects[0].age, Some(25.0));
        assert_eq!(subjects[1].age, Some(31.0));
        assert_eq!(subjects[2].id, "S3");
        assert_eq!(subjects[2].age, None);
    }

    #[test]
    fn test_read_subject_metadata_missing_workbook_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_subject_metadata(dir.path().join("Date.xlsx")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    #[test]
    fn test_read_subject_metadata_requires_age() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gender,Weight").unwrap();
        writeln!(file, "M,70").unwrap();

        let err = read_subject_metadata(file.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::Metadata(_)));
    }
}
