//! Sheet boundary search on the edge map.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheet_omr_core::{polygon_area, Quadrilateral};

use crate::params::BoundaryParams;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Where a boundary came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    /// A contour that approximated to four vertices.
    Detected,
    /// Synthesized from the frame corners.
    FullFrame,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentBoundary {
    pub quad: Quadrilateral,
    pub source: BoundarySource,
}

impl DocumentBoundary {
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            quad: Quadrilateral::full_frame(width, height),
            source: BoundarySource::FullFrame,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.source == BoundarySource::Detected
    }
}

/// Find the sheet outline in a binary edge map.
///
/// Outer borders without a parent are ranked by enclosed area, largest first,
/// and the first one whose Douglas-Peucker approximation has exactly four
/// vertices wins. Falls back to the full frame when nothing qualifies.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(edges, params), fields(width = edges.width(), height = edges.height()))
)]
pub fn locate_document(edges: &GrayImage, params: &BoundaryParams) -> DocumentBoundary {
    let (w, h) = edges.dimensions();
    if w == 0 || h == 0 {
        return DocumentBoundary::full_frame(w, h);
    }

    let contours: Vec<Contour<i32>> = find_contours(edges);
    let min_area = params.min_area_fraction * (w as f32) * (h as f32);

    let mut external: Vec<(f32, &[Point<i32>])> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| (contour_area(&c.points), c.points.as_slice()))
        .filter(|(area, _)| *area >= min_area)
        .collect();

    if external.is_empty() {
        warn!("no external contours in edge map; using full frame {w}x{h}");
        return DocumentBoundary::full_frame(w, h);
    }

    external.sort_by(|a, b| b.0.total_cmp(&a.0));
    debug!(
        "locate: {} external contours (of {}), largest area {:.0}",
        external.len(),
        contours.len(),
        external[0].0
    );

    for (rank, (area, points)) in external.iter().enumerate() {
        let perimeter = arc_length(points, true);
        if perimeter <= 0.0 {
            continue;
        }
        let epsilon = params.approx_epsilon_frac * perimeter;
        let Some(poly) = approximate_closed(points, epsilon) else {
            continue;
        };
        if poly.len() == 4 {
            let corners = [0, 1, 2, 3].map(|i| Point2::new(poly[i].x as f32, poly[i].y as f32));
            debug!(
                "locate: accepted contour #{rank} area={area:.0} perimeter={perimeter:.1} corners={:?}",
                corners.map(|p| (p.x, p.y))
            );
            return DocumentBoundary {
                quad: Quadrilateral::new(corners),
                source: BoundarySource::Detected,
            };
        }
    }

    warn!("no contour approximates to a quadrilateral; using full frame {w}x{h}");
    DocumentBoundary::full_frame(w, h)
}

fn contour_area(points: &[Point<i32>]) -> f32 {
    let pts: Vec<Point2<f32>> = points
        .iter()
        .map(|p| Point2::new(p.x as f32, p.y as f32))
        .collect();
    polygon_area(&pts)
}

/// Douglas-Peucker on a closed curve, without a repeated closing vertex.
///
/// The curve is cut at its start and at the point farthest from it, and each
/// half is simplified as an open polyline, so the two anchors are always kept.
fn approximate_closed(points: &[Point<i32>], epsilon: f64) -> Option<Vec<Point<i32>>> {
    if points.len() < 3 || epsilon <= 0.0 {
        return None;
    }
    let start = points[0];
    let (far, far_d2) = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let dx = (p.x - start.x) as i64;
            let dy = (p.y - start.y) as i64;
            (i, dx * dx + dy * dy)
        })
        .max_by_key(|&(i, d2)| (d2, std::cmp::Reverse(i)))?;
    if far_d2 == 0 {
        return None;
    }

    let mut first = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut back: Vec<Point<i32>> = points[far..].to_vec();
    back.push(start);
    let mut second = approximate_polygon_dp(&back, epsilon, false);

    first.pop();
    second.pop();
    first.append(&mut second);
    Some(first)
}

/// Copy of `color` with the boundary outlined for audit.
pub fn draw_boundary(color: &RgbImage, boundary: &DocumentBoundary) -> RgbImage {
    let mut out = color.clone();
    let stroke = match boundary.source {
        BoundarySource::Detected => Rgb([0, 200, 0]),
        BoundarySource::FullFrame => Rgb([230, 120, 0]),
    };
    let c = boundary.quad.corners;
    for i in 0..4 {
        let a = c[i];
        let b = c[(i + 1) % 4];
        for off in [-1.0f32, 0.0, 1.0] {
            draw_line_segment_mut(&mut out, (a.x + off, a.y), (b.x + off, b.y), stroke);
            draw_line_segment_mut(&mut out, (a.x, a.y + off), (b.x, b.y + off), stroke);
        }
    }
    out
}
