//! Optical mark recognition for photographed multiple-choice answer sheets.
//!
//! A page goes through six stages, each a plain function over `image` buffers:
//! - [`preprocess`]: grayscale, blur, dilation, Canny edges
//! - [`locate_document`]: largest four-vertex contour, or the full frame
//! - [`rectify`]: perspective warp to an upright sheet, inverted binarization
//! - [`split_regions`]: margin crop, optional two-column split, metadata strip
//! - [`locate_bubbles`]: contour bounding boxes filtered by size and aspect
//! - [`decode_answers`]: row clustering, fill ratios, option selection
//!
//! [`SheetGrader`] runs them in order with one validated [`SheetOmrParams`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use sheet_omr::{SheetGrader, SheetOmrParams, StaticMetadataDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let grader = SheetGrader::new(SheetOmrParams::default())?;
//! let decoder = StaticMetadataDecoder::new("EXAM-7,1,20;");
//! let page = grader.grade_file_with_decoder("scan.jpg", &decoder)?;
//! for (question, answer) in page.question_answers()? {
//!     println!("{question}: {answer}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//! - `cli` (default): the `sheet-omr` binary.
//! - `rayon`: parallel [`grade_files`].
//! - `tracing`: spans around every stage and `init_tracing` in the core crate.

pub use sheet_omr_core as core;

mod batch;
mod bubbles;
mod decode;
mod error;
mod io;
mod locate;
mod metadata;
mod params;
mod pipeline;
mod preprocess;
mod raster;
mod rectify;
mod split;

#[cfg(test)]
mod test_utils;

pub use batch::{grade_files, grade_files_with_decoder, BatchEntry};
pub use bubbles::{locate_bubbles, passes_filter, BubbleCandidate};
pub use decode::{
    annotate_answers, cluster_rows, decode_answers, fill_ratio, option_letter, select_option,
    Answer, GradingResult, QuestionRow, RowResult,
};
pub use error::{GradeError, ParamsError};
pub use io::{ConfigIoError, GradeConfig, GradeReport, QuestionAnswer, ReportEntry};
pub use locate::{draw_boundary, locate_document, BoundarySource, DocumentBoundary};
pub use metadata::{
    MetadataDecoder, MetadataError, PageMetadata, StaticMetadataDecoder, MAX_QUESTIONS_PER_PAGE,
};
pub use params::{
    Binarization, BoundaryParams, BubbleParams, ContourRetrieval, DecodeParams, PreprocessParams,
    RectifyParams, SelectionPolicy, SheetOmrParams, SplitParams,
};
pub use pipeline::{PageGrading, PageOverlays, RegionGrading, SheetGrader};
pub use preprocess::{preprocess, preprocess_gray, Preprocessed};
pub use raster::{gray_view, rgb_view};
pub use rectify::{
    adaptive_gaussian_inverted, binarize, otsu_level, rectify, rectifying_homography,
    threshold_inverted, Rectified,
};
pub use split::{layout_regions, split_regions, PixelRect, RegionRole, SheetRegion, SplitRegions};
