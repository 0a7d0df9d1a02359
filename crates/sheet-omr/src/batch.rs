//! Grading many pages with one grader.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::GradeError;
use crate::metadata::MetadataDecoder;
use crate::pipeline::{PageGrading, SheetGrader};

/// Outcome for one input path. A failed page never aborts the batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub outcome: Result<PageGrading, GradeError>,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

fn grade_one(
    grader: &SheetGrader,
    path: &Path,
    decoder: Option<&dyn MetadataDecoder>,
) -> BatchEntry {
    let outcome = match decoder {
        Some(d) => grader.grade_file_with_decoder(path, d),
        None => grader.grade_file(path),
    };
    if let Err(err) = &outcome {
        warn!("{}: {err}", path.display());
    }
    BatchEntry {
        path: path.to_path_buf(),
        outcome,
    }
}

#[cfg(feature = "rayon")]
fn grade_all(
    grader: &SheetGrader,
    paths: &[PathBuf],
    decoder: Option<&dyn MetadataDecoder>,
) -> Vec<BatchEntry> {
    use rayon::prelude::*;

    paths
        .par_iter()
        .map(|p| grade_one(grader, p, decoder))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn grade_all(
    grader: &SheetGrader,
    paths: &[PathBuf],
    decoder: Option<&dyn MetadataDecoder>,
) -> Vec<BatchEntry> {
    paths.iter().map(|p| grade_one(grader, p, decoder)).collect()
}

/// Grade every path, preserving input order in the output.
///
/// Runs on the rayon pool when the `rayon` feature is enabled.
pub fn grade_files<P: AsRef<Path>>(grader: &SheetGrader, paths: &[P]) -> Vec<BatchEntry> {
    grade_files_inner(grader, paths, None)
}

pub fn grade_files_with_decoder<P: AsRef<Path>>(
    grader: &SheetGrader,
    paths: &[P],
    decoder: &dyn MetadataDecoder,
) -> Vec<BatchEntry> {
    grade_files_inner(grader, paths, Some(decoder))
}

fn grade_files_inner<P: AsRef<Path>>(
    grader: &SheetGrader,
    paths: &[P],
    decoder: Option<&dyn MetadataDecoder>,
) -> Vec<BatchEntry> {
    let owned: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let entries = grade_all(grader, &owned, decoder);
    let failed = entries.iter().filter(|e| !e.is_ok()).count();
    info!("graded {} page(s), {} failed", entries.len(), failed);
    entries
}
