//! Perspective correction and binarization.

use image::{GrayImage, Luma, RgbImage};
use log::{debug, warn};
use sheet_omr_core::{
    homography_from_4pt, warp_perspective_gray, warp_perspective_rgb, Homography, Quadrilateral,
};

use crate::params::{Binarization, RectifyParams};
use crate::raster::{blur_gray_f32, gray_from_core, gray_view, rgb_from_core, rgb_view};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Top-down view of the sheet.
#[derive(Clone, Debug)]
pub struct Rectified {
    /// Warped grayscale.
    pub gray: GrayImage,
    /// Mark mask: 255 for dark marks, 0 for paper.
    pub binary: GrayImage,
    pub color: RgbImage,
    /// Maps rectified pixel coordinates back into the input frame.
    pub h_img_from_rect: Homography,
    /// The corners actually used, in TL, TR, BR, BL order.
    pub corners: [nalgebra::Point2<f32>; 4],
}

/// Homography from rectified coordinates to the quadrilateral, plus the output size.
///
/// `None` when the corners are degenerate (collinear or coincident).
pub fn rectifying_homography(quad: &Quadrilateral) -> Option<(Homography, usize, usize)> {
    let (w, h) = quad.rectified_size();
    if w < 2 || h < 2 {
        return None;
    }
    let h_img_from_rect = homography_from_4pt(&quad.rectified_corners(), &quad.ordered())?;
    Some((h_img_from_rect, w, h))
}

/// Warp `quad` to an upright rectangle and binarize it.
///
/// Returns `None` when no homography exists for `quad`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(gray, color, params), fields(width = gray.width(), height = gray.height()))
)]
pub fn rectify(
    quad: &Quadrilateral,
    gray: &GrayImage,
    color: &RgbImage,
    params: &RectifyParams,
) -> Option<Rectified> {
    let Some((h_img_from_rect, w, h)) = rectifying_homography(quad) else {
        warn!("degenerate quadrilateral {:?}", quad.corners);
        return None;
    };
    debug!("rectify: output {w}x{h}");

    let warped_gray = gray_from_core(warp_perspective_gray(&gray_view(gray), h_img_from_rect, w, h));
    let warped_color = rgb_from_core(warp_perspective_rgb(&rgb_view(color), h_img_from_rect, w, h));
    let binary = binarize(&warped_gray, params.binarization);

    Some(Rectified {
        gray: warped_gray,
        binary,
        color: warped_color,
        h_img_from_rect,
        corners: quad.ordered(),
    })
}

/// Produce the inverted mark mask (dark = 255).
pub fn binarize(gray: &GrayImage, mode: Binarization) -> GrayImage {
    match mode {
        Binarization::Otsu => match otsu_level(gray) {
            Some(level) => {
                debug!("binarize: otsu level {level}");
                threshold_inverted(gray, level)
            }
            None => {
                debug!("binarize: uniform image, no foreground");
                GrayImage::new(gray.width(), gray.height())
            }
        },
        Binarization::AdaptiveGaussian { block_size, c } => {
            adaptive_gaussian_inverted(gray, block_size, c)
        }
    }
}

/// Pixels at or below `level` become 255.
pub fn threshold_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        *dst = Luma([if src.0[0] <= level { 255 } else { 0 }]);
    }
    out
}

/// Otsu level over the whole image: the last intensity of the dark class.
///
/// `None` for a uniform image, where there is nothing to separate.
pub fn otsu_level(gray: &GrayImage) -> Option<u8> {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    otsu_level_from_histogram(&hist)
}

fn otsu_level_from_histogram(hist: &[u64; 256]) -> Option<u8> {
    let min_v = hist.iter().position(|&h| h > 0)?;
    let max_v = hist.iter().rposition(|&h| h > 0)?;
    if min_v == max_v {
        return None;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return Some(((min_v + max_v) / 2) as u8);
    }

    let total: f64 = hist.iter().sum::<u64>() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = min_v as u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    Some(best_t)
}

/// Foreground where `src <= gaussian_mean(block) - c`.
///
/// The Gaussian sigma is derived from `block_size` the way OpenCV does for
/// its adaptive threshold.
pub fn adaptive_gaussian_inverted(gray: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = blur_gray_f32(gray, sigma);
    GrayImage::from_fn(w, h, |x, y| {
        let src = gray.get_pixel(x, y).0[0] as f32;
        let t = mean.get_pixel(x, y).0[0] - c;
        Luma([if src <= t { 255 } else { 0 }])
    })
}
