//! Synthetic rasters for unit tests.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;

/// Set every pixel with `(x - cx)² + (y - cy)² <= r²` to `value`.
pub(crate) fn draw_disc(img: &mut GrayImage, cx: f32, cy: f32, r: f32, value: u8) {
    draw_annulus(img, cx, cy, 0.0, r, value);
}

/// Set every pixel with `r_in <= dist <= r_out` to `value`.
pub(crate) fn draw_ring(img: &mut GrayImage, cx: f32, cy: f32, r_in: f32, r_out: f32, value: u8) {
    draw_annulus(img, cx, cy, r_in, r_out, value);
}

fn draw_annulus(img: &mut GrayImage, cx: f32, cy: f32, r_in: f32, r_out: f32, value: u8) {
    let (w, h) = img.dimensions();
    let x0 = (cx - r_out).floor().max(0.0) as u32;
    let y0 = (cy - r_out).floor().max(0.0) as u32;
    let x1 = ((cx + r_out).ceil().max(0.0) as u32).min(w.saturating_sub(1));
    let y1 = ((cy + r_out).ceil().max(0.0) as u32).min(h.saturating_sub(1));
    if w == 0 || h == 0 {
        return;
    }
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let d2 = dx * dx + dy * dy;
            if d2 >= r_in * r_in && d2 <= r_out * r_out {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

/// Closed 1-pixel outline through four corners.
pub(crate) fn draw_quad_outline(img: &mut GrayImage, corners: [(f32, f32); 4]) {
    for i in 0..4 {
        draw_line_segment_mut(img, corners[i], corners[(i + 1) % 4], Luma([255u8]));
    }
}
