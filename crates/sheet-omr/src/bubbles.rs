//! Bubble candidates from contour geometry.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::params::{BubbleParams, ContourRetrieval};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A shape that looks like a printed answer bubble.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubbleCandidate {
    /// Bounding-box centre in region pixels.
    pub center: Point2<f32>,
    /// Half the shorter bounding-box side.
    pub radius: f32,
    pub width: u32,
    pub height: u32,
}

impl BubbleCandidate {
    /// Candidate spanning the inclusive pixel box `[x0, x1] × [y0, y1]`.
    pub fn from_bounds(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let width = (x1 - x0 + 1).max(0) as u32;
        let height = (y1 - y0 + 1).max(0) as u32;
        Self {
            center: Point2::new(
                x0 as f32 + width as f32 / 2.0,
                y0 as f32 + height as f32 / 2.0,
            ),
            radius: width.min(height) as f32 / 2.0,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return f32::INFINITY;
        }
        self.width as f32 / self.height as f32
    }

    fn contains(&self, p: Point2<f32>) -> bool {
        (p - self.center).norm() < self.radius
    }
}

fn bounds(points: &[Point<i32>]) -> Option<(i32, i32, i32, i32)> {
    let first = points.first()?;
    let init = (first.x, first.y, first.x, first.y);
    Some(points.iter().fold(init, |(x0, y0, x1, y1), p| {
        (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
    }))
}

fn keep_border(c: &Contour<i32>, retrieval: ContourRetrieval) -> bool {
    match retrieval {
        ContourRetrieval::Tree => true,
        ContourRetrieval::External => c.border_type == BorderType::Outer && c.parent.is_none(),
    }
}

/// Whether a candidate passes the size window and aspect tolerance.
pub fn passes_filter(c: &BubbleCandidate, params: &BubbleParams) -> bool {
    let size_ok = |v: u32| v >= params.min_size && v <= params.max_size;
    let ar = c.aspect();
    size_ok(c.width) && size_ok(c.height) && ar >= params.min_aspect && ar <= params.max_aspect
}

/// Candidates in contour discovery order (raster order of border starts).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(binary, params), fields(width = binary.width(), height = binary.height()))
)]
pub fn locate_bubbles(binary: &GrayImage, params: &BubbleParams) -> Vec<BubbleCandidate> {
    if binary.width() == 0 || binary.height() == 0 {
        return Vec::new();
    }

    let contours: Vec<Contour<i32>> = find_contours(binary);
    let mut out: Vec<BubbleCandidate> = Vec::new();
    let mut rejected = 0usize;
    let mut nested = 0usize;

    for contour in contours.iter().filter(|c| keep_border(c, params.retrieval)) {
        let Some((x0, y0, x1, y1)) = bounds(&contour.points) else {
            continue;
        };
        let cand = BubbleCandidate::from_bounds(x0, y0, x1, y1);
        if !passes_filter(&cand, params) {
            rejected += 1;
            continue;
        }
        if params.suppress_nested && out.iter().any(|b| b.contains(cand.center)) {
            nested += 1;
            continue;
        }
        out.push(cand);
    }

    debug!(
        "bubbles: {} contours, {} accepted, {} rejected by shape, {} nested",
        contours.len(),
        out.len(),
        rejected,
        nested
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_disc, draw_ring};
    use approx::assert_relative_eq;

    #[test]
    fn empty_region_has_no_bubbles() {
        let binary = GrayImage::new(200, 100);
        assert!(locate_bubbles(&binary, &BubbleParams::default()).is_empty());
        assert!(locate_bubbles(&GrayImage::new(0, 0), &BubbleParams::default()).is_empty());
    }

    #[test]
    fn filled_disc_yields_centred_candidate() {
        let mut binary = GrayImage::new(120, 100);
        draw_disc(&mut binary, 50.0, 40.0, 14.5, 255);
        let found = locate_bubbles(&binary, &BubbleParams::default());
        assert_eq!(found.len(), 1);
        let b = found[0];
        assert_eq!((b.width, b.height), (29, 29));
        assert_relative_eq!(b.center.x, 50.5, epsilon = 1e-6);
        assert_relative_eq!(b.center.y, 40.5, epsilon = 1e-6);
        assert_relative_eq!(b.radius, 14.5, epsilon = 1e-6);
    }

    #[test]
    fn ring_is_reported_once_with_suppression() {
        let mut binary = GrayImage::new(120, 100);
        draw_ring(&mut binary, 60.0, 50.0, 13.0, 14.5, 255);

        let found = locate_bubbles(&binary, &BubbleParams::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].width, 29);

        let params = BubbleParams {
            suppress_nested: false,
            ..BubbleParams::default()
        };
        let found = locate_bubbles(&binary, &params);
        assert_eq!(found.len(), 2, "outer and hole borders");

        let params = BubbleParams {
            suppress_nested: false,
            retrieval: ContourRetrieval::External,
            ..BubbleParams::default()
        };
        let found = locate_bubbles(&binary, &params);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn shapes_outside_size_or_aspect_are_rejected() {
        let mut binary = GrayImage::new(400, 200);
        // Too small.
        draw_disc(&mut binary, 30.0, 30.0, 5.0, 255);
        // Too large.
        draw_disc(&mut binary, 120.0, 100.0, 45.0, 255);
        // Too wide: 60 x 24 bar.
        for y in 150..174 {
            for x in 200..260 {
                binary.put_pixel(x, y, image::Luma([255]));
            }
        }
        // Accepted.
        draw_disc(&mut binary, 320.0, 60.0, 12.0, 255);

        let params = BubbleParams::default();
        let found = locate_bubbles(&binary, &params);
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|b| passes_filter(b, &params)));
        assert_relative_eq!(found[0].center.x, 320.5, epsilon = 1e-6);
    }

    #[test]
    fn discovery_order_is_raster_order() {
        let mut binary = GrayImage::new(300, 200);
        draw_disc(&mut binary, 200.0, 40.0, 12.0, 255);
        draw_disc(&mut binary, 60.0, 45.0, 12.0, 255);
        draw_disc(&mut binary, 100.0, 140.0, 12.0, 255);
        let found = locate_bubbles(&binary, &BubbleParams::default());
        let xs: Vec<f32> = found.iter().map(|b| b.center.x).collect();
        assert_eq!(xs, vec![200.5, 60.5, 100.5]);
    }

    #[test]
    fn aspect_of_degenerate_box_is_infinite() {
        let c = BubbleCandidate::from_bounds(0, 0, 4, -1);
        assert_eq!(c.height, 0);
        assert!(c.aspect().is_infinite());
    }
}
