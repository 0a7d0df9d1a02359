//! Page metadata payloads and the decoder seam.
//!
//! Each printed page embeds a machine-readable code with the payload
//! `"{code},{first_question},{last_question};"`. Decoding the symbol itself is
//! delegated to a [`MetadataDecoder`]; this module parses its output and maps
//! graded rows onto question numbers.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::decode::Answer;

/// Largest question range one page may declare. Also bounds the padding done
/// by [`PageMetadata::assign`].
pub const MAX_QUESTIONS_PER_PAGE: usize = 1000;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataError {
    #[error("malformed metadata payload `{payload}`: {reason}")]
    Malformed {
        payload: String,
        reason: String,
    },

    #[error("invalid question range {first}..={last}")]
    InvalidRange { first: u32, last: u32 },

    #[error("metadata decoder failed: {message}")]
    Decode { message: String },

    #[error("no metadata found on page")]
    Missing,

    #[error("page declares {count} questions, at most {max} are supported")]
    TooManyQuestions { count: usize, max: usize },

    #[error("page covers {expected} question(s) but {found} row(s) were graded")]
    RowCountMismatch { expected: usize, found: usize },
}

/// Parsed page payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Candidate or exam code.
    pub code: String,
    pub first_question: u32,
    pub last_question: u32,
}

impl PageMetadata {
    /// Parse `"{code},{first},{last};"`.
    ///
    /// Surrounding whitespace and a missing `;` terminator are tolerated.
    pub fn parse(payload: &str) -> Result<Self, MetadataError> {
        let malformed = |reason: &str| MetadataError::Malformed {
            payload: payload.to_string(),
            reason: reason.to_string(),
        };

        let body = payload.trim();
        let body = body.strip_suffix(';').unwrap_or(body);
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let [code, first, last] = parts.as_slice() else {
            return Err(malformed("expected three comma-separated fields"));
        };

        if code.is_empty() {
            return Err(malformed("empty code"));
        }
        let first: u32 = first
            .parse()
            .map_err(|_| malformed("first question is not a number"))?;
        let last: u32 = last
            .parse()
            .map_err(|_| malformed("last question is not a number"))?;
        if first == 0 || first > last {
            return Err(MetadataError::InvalidRange { first, last });
        }

        let meta = Self {
            code: code.to_string(),
            first_question: first,
            last_question: last,
        };
        meta.check_size()?;
        Ok(meta)
    }

    /// Number of questions in `first_question..=last_question`; zero for an
    /// inverted range.
    pub fn question_count(&self) -> usize {
        self.last_question
            .checked_sub(self.first_question)
            .map_or(0, |d| d as usize + 1)
    }

    fn check_size(&self) -> Result<(), MetadataError> {
        let count = self.question_count();
        if count > MAX_QUESTIONS_PER_PAGE {
            return Err(MetadataError::TooManyQuestions {
                count,
                max: MAX_QUESTIONS_PER_PAGE,
            });
        }
        Ok(())
    }

    /// Pair answers (in reading order) with question numbers
    /// `first_question..=last_question`.
    ///
    /// Missing trailing rows are reported undetermined; extra rows are an error.
    pub fn assign(
        &self,
        answers: impl IntoIterator<Item = Answer>,
    ) -> Result<Vec<(u32, Answer)>, MetadataError> {
        self.check_size()?;
        let answers: Vec<Answer> = answers.into_iter().collect();
        let expected = self.question_count();
        if answers.len() > expected {
            return Err(MetadataError::RowCountMismatch {
                expected,
                found: answers.len(),
            });
        }
        Ok((self.first_question..=self.last_question)
            .zip(answers.into_iter().chain(std::iter::repeat(Answer::Undetermined)))
            .collect())
    }
}

impl FromStr for PageMetadata {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{};",
            self.code, self.first_question, self.last_question
        )
    }
}

/// Reads the raw payload from the page's metadata region.
///
/// Implementations wrap a barcode or QR reader. Return
/// [`MetadataError::Missing`] when no symbol is present.
pub trait MetadataDecoder: Send + Sync {
    fn decode(&self, region: &RgbImage) -> Result<String, MetadataError>;
}

/// Returns the same payload for every page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticMetadataDecoder {
    payload: String,
}

impl StaticMetadataDecoder {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl MetadataDecoder for StaticMetadataDecoder {
    fn decode(&self, _region: &RgbImage) -> Result<String, MetadataError> {
        Ok(self.payload.clone())
    }
}

impl<F> MetadataDecoder for F
where
    F: Fn(&RgbImage) -> Result<String, MetadataError> + Send + Sync,
{
    fn decode(&self, region: &RgbImage) -> Result<String, MetadataError> {
        self(region)
    }
}
