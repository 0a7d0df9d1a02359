//! Tunable parameters for every pipeline stage.
//!
//! All values vary by printer, scanner and lighting, so none of them are
//! hard-coded in the stages. A [`SheetOmrParams`] value is immutable once
//! handed to [`crate::SheetGrader`]; each stage receives only its own section.

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

/// Grayscale cleanup and edge detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Gaussian kernel size in pixels (odd). Sigma follows OpenCV's rule for
    /// `sigma = 0`.
    pub blur_kernel: u32,
    /// Square dilation kernel size (odd).
    pub dilate_kernel: u32,
    pub dilate_iterations: u32,
    /// Canny hysteresis thresholds on the gradient magnitude.
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            dilate_kernel: 3,
            dilate_iterations: 1,
            canny_low: 75.0,
            canny_high: 200.0,
        }
    }
}

impl PreprocessParams {
    /// Gaussian sigma OpenCV derives for `ksize` when none is given.
    pub fn blur_sigma(&self) -> f32 {
        0.3 * ((self.blur_kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }

    /// Chebyshev radius equivalent to `dilate_iterations` passes of the kernel.
    pub fn dilate_radius(&self) -> u8 {
        let r = (self.dilate_kernel / 2).saturating_mul(self.dilate_iterations);
        r.min(u8::MAX as u32) as u8
    }
}

/// Sheet boundary search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryParams {
    /// Douglas-Peucker tolerance relative to the contour perimeter.
    pub approx_epsilon_frac: f64,
    /// Contours enclosing less than this fraction of the frame are ignored.
    pub min_area_fraction: f32,
}

impl Default for BoundaryParams {
    fn default() -> Self {
        Self {
            approx_epsilon_frac: 0.02,
            min_area_fraction: 0.0,
        }
    }
}

/// How the rectified grayscale sheet is turned into a mark mask.
///
/// Both modes produce dark marks as foreground (255).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Binarization {
    /// Global Otsu level, inverted output.
    Otsu,
    /// Pixel is foreground when it is darker than its Gaussian-weighted
    /// `block_size × block_size` neighbourhood mean minus `c`.
    AdaptiveGaussian { block_size: u32, c: f32 },
}

impl Default for Binarization {
    fn default() -> Self {
        Self::Otsu
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyParams {
    pub binarization: Binarization,
}

/// Registration margins and column layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub top_fraction: f64,
    pub bottom_fraction: f64,
    pub left_fraction: f64,
    pub right_fraction: f64,
    /// Band removed from the top of the cropped area before bisecting.
    pub header_fraction: f64,
    /// Bisect the cropped area into two answer columns.
    pub dual_column: bool,
    /// Bottom share of the right column holding the metadata code.
    pub metadata_fraction: f64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            top_fraction: 0.12,
            bottom_fraction: 0.04,
            left_fraction: 0.05,
            right_fraction: 0.05,
            header_fraction: 0.0,
            dual_column: false,
            metadata_fraction: 0.13,
        }
    }
}

/// Which contour borders are considered when looking for bubbles.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourRetrieval {
    /// Outer borders without a parent.
    External,
    /// Every border, holes included.
    #[default]
    Tree,
}

/// Geometric bubble filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleParams {
    /// Accepted bounding-box side length, inclusive.
    pub min_size: u32,
    pub max_size: u32,
    /// Accepted `w / h`, inclusive.
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub retrieval: ContourRetrieval,
    /// Drop a candidate centred inside an already accepted one (ring holes).
    pub suppress_nested: bool,
}

impl Default for BubbleParams {
    fn default() -> Self {
        Self {
            min_size: 20,
            max_size: 70,
            min_aspect: 0.7,
            max_aspect: 1.2,
            retrieval: ContourRetrieval::Tree,
            suppress_nested: true,
        }
    }
}

/// Which bubble in a row counts as the marked option.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Leftmost bubble whose fill ratio exceeds the threshold.
    #[default]
    FirstAboveThreshold,
    /// Highest fill ratio among bubbles above the threshold; leftmost on ties.
    MaxAboveThreshold,
}

/// Row clustering and answer selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// A bubble joins a row when `|dy| <= row_tolerance * radius`.
    pub row_tolerance: f32,
    /// A bubble is marked when its fill ratio is strictly greater.
    pub fill_threshold: f32,
    pub selection: SelectionPolicy,
    /// Rows with more bubbles than this are reported undetermined.
    pub max_options: Option<usize>,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            row_tolerance: 2.0,
            fill_threshold: 0.35,
            selection: SelectionPolicy::FirstAboveThreshold,
            max_options: None,
        }
    }
}

/// Full pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetOmrParams {
    pub preprocess: PreprocessParams,
    pub boundary: BoundaryParams,
    pub rectify: RectifyParams,
    pub split: SplitParams,
    pub bubbles: BubbleParams,
    pub decode: DecodeParams,
    /// Render audit overlays (sheet boundary, selected bubbles).
    pub annotate: bool,
}

fn check(ok: bool, field: &'static str, reason: impl Into<String>) -> Result<(), ParamsError> {
    if ok {
        Ok(())
    } else {
        Err(ParamsError::Invalid {
            field,
            reason: reason.into(),
        })
    }
}

fn check_fraction(value: f64, field: &'static str) -> Result<(), ParamsError> {
    check(
        value.is_finite() && (0.0..1.0).contains(&value),
        field,
        format!("expected a fraction in [0, 1), got {value}"),
    )
}

impl SheetOmrParams {
    /// Reject values the stages cannot work with.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let p = &self.preprocess;
        check(
            p.blur_kernel % 2 == 1,
            "preprocess.blur_kernel",
            format!("must be odd, got {}", p.blur_kernel),
        )?;
        check(
            p.dilate_kernel % 2 == 1,
            "preprocess.dilate_kernel",
            format!("must be odd, got {}", p.dilate_kernel),
        )?;
        check(
            p.canny_low.is_finite() && p.canny_low >= 0.0 && p.canny_low <= p.canny_high,
            "preprocess.canny_low",
            format!(
                "must satisfy 0 <= low <= high, got {} / {}",
                p.canny_low, p.canny_high
            ),
        )?;

        let b = &self.boundary;
        check(
            b.approx_epsilon_frac.is_finite() && b.approx_epsilon_frac > 0.0,
            "boundary.approx_epsilon_frac",
            format!("must be positive, got {}", b.approx_epsilon_frac),
        )?;
        check_fraction(b.min_area_fraction as f64, "boundary.min_area_fraction")?;

        if let Binarization::AdaptiveGaussian { block_size, c } = self.rectify.binarization {
            check(
                block_size >= 3 && block_size % 2 == 1,
                "rectify.binarization.block_size",
                format!("must be odd and >= 3, got {block_size}"),
            )?;
            check(
                c.is_finite(),
                "rectify.binarization.c",
                "must be finite",
            )?;
        }

        let s = &self.split;
        check_fraction(s.top_fraction, "split.top_fraction")?;
        check_fraction(s.bottom_fraction, "split.bottom_fraction")?;
        check_fraction(s.left_fraction, "split.left_fraction")?;
        check_fraction(s.right_fraction, "split.right_fraction")?;
        check_fraction(s.header_fraction, "split.header_fraction")?;
        check_fraction(s.metadata_fraction, "split.metadata_fraction")?;
        check(
            s.top_fraction + s.bottom_fraction < 1.0,
            "split.bottom_fraction",
            "top and bottom margins overlap",
        )?;
        check(
            s.left_fraction + s.right_fraction < 1.0,
            "split.right_fraction",
            "left and right margins overlap",
        )?;

        let bb = &self.bubbles;
        check(
            bb.min_size <= bb.max_size,
            "bubbles.min_size",
            format!("{} exceeds max_size {}", bb.min_size, bb.max_size),
        )?;
        check(
            bb.min_aspect.is_finite() && bb.min_aspect > 0.0 && bb.min_aspect <= bb.max_aspect,
            "bubbles.min_aspect",
            format!(
                "must satisfy 0 < min <= max, got {} / {}",
                bb.min_aspect, bb.max_aspect
            ),
        )?;

        let d = &self.decode;
        check(
            d.row_tolerance.is_finite() && d.row_tolerance >= 0.0,
            "decode.row_tolerance",
            format!("must be non-negative, got {}", d.row_tolerance),
        )?;
        check(
            d.fill_threshold.is_finite() && (0.0..=1.0).contains(&d.fill_threshold),
            "decode.fill_threshold",
            format!("expected a value in [0, 1], got {}", d.fill_threshold),
        )?;
        check(
            d.max_options != Some(0),
            "decode.max_options",
            "must allow at least one option",
        )?;

        Ok(())
    }
}
