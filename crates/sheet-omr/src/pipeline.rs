//! Page-level orchestration of the six stages.

use std::path::Path;

use image::{DynamicImage, RgbImage};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bubbles::locate_bubbles;
use crate::decode::{annotate_answers, decode_answers, Answer, GradingResult};
use crate::error::{GradeError, ParamsError};
use crate::locate::{draw_boundary, locate_document, DocumentBoundary};
use crate::metadata::{MetadataDecoder, MetadataError, PageMetadata};
use crate::params::SheetOmrParams;
use crate::preprocess::preprocess;
use crate::rectify::{rectify, Rectified};
use crate::split::{split_regions, PixelRect, RegionRole};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Answers graded in one region of the rectified sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionGrading {
    pub role: RegionRole,
    pub rect: PixelRect,
    pub bubble_count: usize,
    pub result: GradingResult,
}

/// Audit renderings, present when `annotate` is set.
#[derive(Clone, Debug)]
pub struct PageOverlays {
    /// Input frame with the sheet boundary drawn.
    pub boundary: RgbImage,
    /// Rectified sheet with selected bubbles circled.
    pub answers: RgbImage,
}

/// Result for one page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageGrading {
    pub boundary: DocumentBoundary,
    /// `(width, height)` of the rectified sheet.
    pub rectified_size: (u32, u32),
    /// Answer regions in reading order.
    pub regions: Vec<RegionGrading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_error: Option<MetadataError>,
    #[serde(skip)]
    pub overlays: Option<PageOverlays>,
}

impl PageGrading {
    fn empty(boundary: DocumentBoundary) -> Self {
        Self {
            boundary,
            rectified_size: (0, 0),
            regions: Vec::new(),
            metadata: None,
            metadata_error: None,
            overlays: None,
        }
    }

    /// Every row answer, left column before right.
    pub fn answers(&self) -> Vec<Answer> {
        self.regions
            .iter()
            .flat_map(|r| r.result.rows.iter().map(|row| row.answer))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.regions.iter().map(|r| r.result.len()).sum()
    }

    pub fn undetermined_count(&self) -> usize {
        self.regions.iter().map(|r| r.result.undetermined_count()).sum()
    }

    /// Answers keyed by question number from the decoded metadata.
    pub fn question_answers(&self) -> Result<Vec<(u32, Answer)>, MetadataError> {
        match (&self.metadata, &self.metadata_error) {
            (Some(meta), _) => meta.assign(self.answers()),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(MetadataError::Missing),
        }
    }
}

/// Grades answer-sheet photographs with a fixed, validated configuration.
#[derive(Clone, Debug)]
pub struct SheetGrader {
    params: SheetOmrParams,
}

impl SheetGrader {
    pub fn new(params: SheetOmrParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SheetOmrParams {
        &self.params
    }

    pub fn grade_image(&self, img: &DynamicImage) -> PageGrading {
        self.run(img, None)
    }

    pub fn grade_image_with_decoder(
        &self,
        img: &DynamicImage,
        decoder: &dyn MetadataDecoder,
    ) -> PageGrading {
        self.run(img, Some(decoder))
    }

    /// Decode an encoded image (PNG, JPEG, ...) and grade it.
    pub fn grade_bytes(&self, bytes: &[u8]) -> Result<PageGrading, GradeError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.run(&img, None))
    }

    pub fn grade_bytes_with_decoder(
        &self,
        bytes: &[u8],
        decoder: &dyn MetadataDecoder,
    ) -> Result<PageGrading, GradeError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.run(&img, Some(decoder)))
    }

    pub fn grade_file(&self, path: impl AsRef<Path>) -> Result<PageGrading, GradeError> {
        let img = load_image(path.as_ref())?;
        Ok(self.run(&img, None))
    }

    pub fn grade_file_with_decoder(
        &self,
        path: impl AsRef<Path>,
        decoder: &dyn MetadataDecoder,
    ) -> Result<PageGrading, GradeError> {
        let img = load_image(path.as_ref())?;
        Ok(self.run(&img, Some(decoder)))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = img.width(), height = img.height()))
    )]
    fn run(&self, img: &DynamicImage, decoder: Option<&dyn MetadataDecoder>) -> PageGrading {
        let p = &self.params;
        let color = img.to_rgb8();
        let pre = preprocess(img, &p.preprocess);

        let mut boundary = locate_document(&pre.edges, &p.boundary);
        let rectified = match rectify(&boundary.quad, &pre.gray, &color, &p.rectify) {
            Some(r) => Some(r),
            None if boundary.is_detected() => {
                warn!("detected boundary is degenerate; retrying with the full frame");
                boundary = DocumentBoundary::full_frame(img.width(), img.height());
                rectify(&boundary.quad, &pre.gray, &color, &p.rectify)
            }
            None => None,
        };
        let Some(rectified) = rectified else {
            warn!(
                "image {}x{} is too small to rectify",
                img.width(),
                img.height()
            );
            return PageGrading::empty(boundary);
        };

        let graded = self.grade_rectified(&rectified, decoder);
        let overlays = graded.answers_overlay.map(|answers| PageOverlays {
            boundary: draw_boundary(&color, &boundary),
            answers,
        });
        let page = PageGrading {
            boundary,
            rectified_size: rectified.color.dimensions(),
            regions: graded.regions,
            metadata: graded.metadata,
            metadata_error: graded.metadata_error,
            overlays,
        };
        debug!(
            "page: {} region(s), {} row(s), {} undetermined",
            page.regions.len(),
            page.row_count(),
            page.undetermined_count()
        );
        page
    }

    /// Stages four to six on an already rectified sheet.
    fn grade_rectified(
        &self,
        rectified: &Rectified,
        decoder: Option<&dyn MetadataDecoder>,
    ) -> RectifiedGrading {
        let p = &self.params;
        let split = split_regions(&rectified.binary, &rectified.color, &p.split);

        let mut answers_overlay = p.annotate.then(|| rectified.color.clone());
        let mut regions = Vec::with_capacity(split.answers.len());
        for region in &split.answers {
            let bubbles = locate_bubbles(&region.binary, &p.bubbles);
            let result = decode_answers(&region.binary, &bubbles, &p.decode);
            if let Some(canvas) = answers_overlay.as_mut() {
                let marked = annotate_answers(&region.color, &result);
                image::imageops::replace(canvas, &marked, region.rect.x as i64, region.rect.y as i64);
            }
            regions.push(RegionGrading {
                role: region.role,
                rect: region.rect,
                bubble_count: bubbles.len(),
                result,
            });
        }

        let (metadata, metadata_error) = match decoder {
            None => (None, None),
            Some(decoder) => {
                let strip = split
                    .metadata
                    .as_ref()
                    .map(|r| &r.color)
                    .unwrap_or(&rectified.color);
                match decoder.decode(strip).and_then(|raw| PageMetadata::parse(&raw)) {
                    Ok(meta) => (Some(meta), None),
                    Err(err) => {
                        warn!("page metadata unavailable: {err}");
                        (None, Some(err))
                    }
                }
            }
        };

        RectifiedGrading {
            regions,
            metadata,
            metadata_error,
            answers_overlay,
        }
    }
}

struct RectifiedGrading {
    regions: Vec<RegionGrading>,
    metadata: Option<PageMetadata>,
    metadata_error: Option<MetadataError>,
    answers_overlay: Option<RgbImage>,
}

fn load_image(path: &Path) -> Result<DynamicImage, GradeError> {
    let bytes = std::fs::read(path).map_err(|source| GradeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image::load_from_memory(&bytes)?)
}
