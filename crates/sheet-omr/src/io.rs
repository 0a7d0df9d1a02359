//! JSON configuration and report helpers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::batch::BatchEntry;
use crate::decode::Answer;
use crate::params::SheetOmrParams;
use crate::pipeline::PageGrading;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// On-disk configuration for batch grading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeConfig {
    #[serde(default)]
    pub params: SheetOmrParams,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub annotate_dir: Option<String>,
    /// Payload used for every page when no code reader is wired in.
    #[serde(default)]
    pub metadata_payload: Option<String>,
}

impl GradeConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("sheet_omr_report.json"))
    }
}

/// One graded question in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: u32,
    pub answer: Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageGrading>,
    /// Answers by question number, when the page metadata was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<QuestionAnswer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn from_batch(entry: &BatchEntry) -> Self {
        let path = entry.path.display().to_string();
        match &entry.outcome {
            Ok(page) => Self {
                path,
                questions: page.question_answers().ok().map(|qa| {
                    qa.into_iter()
                        .map(|(question, answer)| QuestionAnswer { question, answer })
                        .collect()
                }),
                page: Some(page.clone()),
                error: None,
            },
            Err(err) => Self {
                path,
                page: None,
                questions: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Batch grading report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeReport {
    pub params: SheetOmrParams,
    pub pages: Vec<ReportEntry>,
}

impl GradeReport {
    pub fn from_batch(params: &SheetOmrParams, entries: &[BatchEntry]) -> Self {
        Self {
            params: params.clone(),
            pages: entries.iter().map(ReportEntry::from_batch).collect(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.pages.iter().filter(|p| p.error.is_some()).count()
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
