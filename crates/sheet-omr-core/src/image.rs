//! Lightweight row-major raster buffers and bilinear sampling.
//!
//! These types carry no codec or color-management logic. Adapters to and from
//! `image::ImageBuffer` live in the `sheet-omr` crate.

/// Borrowed single-channel raster.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned single-channel raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Borrowed interleaved RGB raster.
#[derive(Clone, Copy, Debug)]
pub struct RgbImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h*3
}

/// Owned interleaved RGB raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub fn view(&self) -> RgbImageView<'_> {
        RgbImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
fn get_rgb(src: &RgbImageView<'_>, x: i32, y: i32) -> [u8; 3] {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return [0; 3];
    }
    let i = (y as usize * src.width + x as usize) * 3;
    [src.data[i], src.data[i + 1], src.data[i + 2]]
}

#[inline]
fn lerp2(p00: f32, p10: f32, p01: f32, p11: f32, fx: f32, fy: f32) -> f32 {
    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Bilinear intensity at a sub-pixel location. Samples outside the raster read as 0.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    lerp2(
        get_gray(src, x0, y0) as f32,
        get_gray(src, x0 + 1, y0) as f32,
        get_gray(src, x0, y0 + 1) as f32,
        get_gray(src, x0 + 1, y0 + 1) as f32,
        fx,
        fy,
    )
}

/// Rounded variant of [`sample_bilinear`]; integer locations return the stored pixel.
#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

/// Per-channel bilinear sample of an RGB raster, rounded to `u8`.
#[inline]
pub fn sample_bilinear_rgb(src: &RgbImageView<'_>, x: f32, y: f32) -> [u8; 3] {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_rgb(src, x0, y0);
    let p10 = get_rgb(src, x0 + 1, y0);
    let p01 = get_rgb(src, x0, y0 + 1);
    let p11 = get_rgb(src, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = lerp2(
            p00[c] as f32,
            p10[c] as f32,
            p01[c] as f32,
            p11[c] as f32,
            fx,
            fy,
        );
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> GrayImage {
        let data = (0..width * height).map(|i| (i % width * 10) as u8).collect();
        GrayImage {
            width,
            height,
            data,
        }
    }

    #[test]
    fn integer_locations_return_stored_pixels() {
        let img = ramp(8, 4);
        let view = img.view();
        for y in 0..4 {
            for x in 0..8 {
                assert_eq!(
                    sample_bilinear_u8(&view, x as f32, y as f32),
                    img.data[y * 8 + x]
                );
            }
        }
    }

    #[test]
    fn half_pixel_interpolates_horizontally() {
        let img = ramp(8, 4);
        let v = sample_bilinear(&img.view(), 2.5, 1.0);
        assert!((v - 25.0).abs() < 1e-4, "got {v}");
    }

    #[test]
    fn outside_samples_read_as_zero() {
        let img = GrayImage {
            width: 2,
            height: 2,
            data: vec![200; 4],
        };
        assert_eq!(sample_bilinear_u8(&img.view(), -5.0, 0.0), 0);
        assert_eq!(sample_bilinear_u8(&img.view(), 0.0, 9.0), 0);
    }

    #[test]
    fn rgb_sampling_keeps_channels_apart() {
        let img = RgbImage {
            width: 2,
            height: 1,
            data: vec![10, 20, 30, 110, 120, 130],
        };
        assert_eq!(sample_bilinear_rgb(&img.view(), 0.0, 0.0), [10, 20, 30]);
        assert_eq!(sample_bilinear_rgb(&img.view(), 0.5, 0.0), [60, 70, 80]);
    }
}
