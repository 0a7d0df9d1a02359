//! Core types and utilities for answer-sheet grading.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any image codec: rasters are plain row-major byte buffers, and
//! the `sheet-omr` crate adapts `image::ImageBuffer`s onto the view types.

mod homography;
mod image;
mod logger;
mod quad;

pub use homography::{
    homography_from_4pt, warp_perspective_gray, warp_perspective_rgb, Homography,
};
pub use image::{
    sample_bilinear, sample_bilinear_rgb, sample_bilinear_u8, GrayImage, GrayImageView, RgbImage,
    RgbImageView,
};
pub use quad::{polygon_area, Quadrilateral};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV_VAR};
