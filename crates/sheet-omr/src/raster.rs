//! Adapters between `image` buffers and the `sheet-omr-core` raster types.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use sheet_omr_core as core;

pub(crate) type GrayImageF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Borrow an `image::GrayImage` as a `sheet-omr-core` view.
pub fn gray_view(img: &GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as a `sheet-omr-core` view.
pub fn rgb_view(img: &RgbImage) -> core::RgbImageView<'_> {
    core::RgbImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

pub(crate) fn gray_from_core(img: core::GrayImage) -> GrayImage {
    let (w, h) = (img.width as u32, img.height as u32);
    // Length is `width * height` by construction.
    GrayImage::from_raw(w, h, img.data).unwrap_or_else(|| GrayImage::new(w, h))
}

pub(crate) fn rgb_from_core(img: core::RgbImage) -> RgbImage {
    let (w, h) = (img.width as u32, img.height as u32);
    RgbImage::from_raw(w, h, img.data).unwrap_or_else(|| RgbImage::new(w, h))
}

/// Gaussian blur carried out in `f32`, intensities kept in `0..=255`.
pub(crate) fn blur_gray_f32(img: &GrayImage, sigma: f32) -> GrayImageF32 {
    let (w, h) = img.dimensions();
    let f = GrayImageF32::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y)[0] as f32]));
    imageproc::filter::gaussian_blur_f32(&f, sigma)
}

/// Gaussian blur with rounding, so flat areas stay exactly flat.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let blurred = blur_gray_f32(img, sigma);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = blurred.get_pixel(x, y)[0].clamp(0.0, 255.0);
        Luma([v.round() as u8])
    })
}

/// Copy out the `width × height` block at `(x, y)`.
pub(crate) fn crop_gray(img: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}

pub(crate) fn crop_rgb(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}
