use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;
use imageproc::morphology::{grayscale_dilate, Mask};
use log::debug;

use crate::params::PreprocessParams;
use crate::raster::blur_gray;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Output of the first stage.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Unfiltered grayscale, the input to rectification.
    pub gray: GrayImage,
    /// Blurred grayscale that fed the edge detector.
    pub denoised: GrayImage,
    /// Binary Canny edge map (edges are 255).
    pub edges: GrayImage,
}

/// Grayscale conversion, blur, dilation and Canny edges.
///
/// Never fails; a blank input produces an empty edge map.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, params), fields(width = img.width(), height = img.height()))
)]
pub fn preprocess(img: &DynamicImage, params: &PreprocessParams) -> Preprocessed {
    let gray = match img {
        DynamicImage::ImageLuma8(g) => g.clone(),
        other => other.to_luma8(),
    };
    preprocess_gray(gray, params)
}

/// [`preprocess`] for an input that is already single-channel.
pub fn preprocess_gray(gray: GrayImage, params: &PreprocessParams) -> Preprocessed {
    if gray.width() == 0 || gray.height() == 0 {
        let edges = GrayImage::new(gray.width(), gray.height());
        return Preprocessed {
            denoised: gray.clone(),
            gray,
            edges,
        };
    }

    let blurred = if params.blur_kernel > 1 {
        blur_gray(&gray, params.blur_sigma())
    } else {
        gray.clone()
    };

    let radius = params.dilate_radius();
    // Gray-level max filter over a square window, so bright paper grows into
    // the darker background without flattening the image.
    let dilated = if radius > 0 {
        grayscale_dilate(&blurred, &Mask::square(radius))
    } else {
        blurred.clone()
    };

    let edges = canny(&dilated, params.canny_low, params.canny_high);
    debug!(
        "preprocess: {}x{} sigma={:.2} dilate_radius={} edge_pixels={}",
        blurred.width(),
        blurred.height(),
        params.blur_sigma(),
        radius,
        edges.pixels().filter(|p| p.0[0] > 0).count()
    );

    Preprocessed {
        gray,
        denoised: blurred,
        edges,
    }
}
