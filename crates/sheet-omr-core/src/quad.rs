use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Four planar points bounding a document.
///
/// Input corners may come in any winding order. Use [`Quadrilateral::ordered`]
/// before building a homography.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub corners: [Point2<f32>; 4],
}

impl Quadrilateral {
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        Self { corners }
    }

    /// The frame's own corners `(0,0)`, `(w-1,0)`, `(w-1,h-1)`, `(0,h-1)`.
    pub fn full_frame(width: u32, height: u32) -> Self {
        let r = width.saturating_sub(1) as f32;
        let b = height.saturating_sub(1) as f32;
        Self::new([
            Point2::new(0.0, 0.0),
            Point2::new(r, 0.0),
            Point2::new(r, b),
            Point2::new(0.0, b),
        ])
    }

    /// Corners reordered as TL, TR, BR, BL.
    ///
    /// Smallest `x + y` is top-left, largest is bottom-right; smallest `y - x`
    /// is top-right, largest is bottom-left. First occurrence wins on ties.
    pub fn ordered(&self) -> [Point2<f32>; 4] {
        let sum = |p: &Point2<f32>| p.x + p.y;
        let diff = |p: &Point2<f32>| p.y - p.x;

        let pick = |key: &dyn Fn(&Point2<f32>) -> f32, want_max: bool| -> Point2<f32> {
            let mut best = self.corners[0];
            for p in &self.corners[1..] {
                let better = if want_max {
                    key(p) > key(&best)
                } else {
                    key(p) < key(&best)
                };
                if better {
                    best = *p;
                }
            }
            best
        };

        [
            pick(&sum, false),
            pick(&diff, false),
            pick(&sum, true),
            pick(&diff, true),
        ]
    }

    /// Output raster size `(width, height)` for rectifying this quadrilateral.
    ///
    /// Width is the longer of the top and bottom edges, height the longer of the
    /// left and right edges, rounded. Corners sit on pixel centres, so one pixel
    /// is added to cover the inclusive span.
    pub fn rectified_size(&self) -> (usize, usize) {
        let [tl, tr, br, bl] = self.ordered();
        let width = (br - bl).norm().max((tr - tl).norm());
        let height = (tr - br).norm().max((tl - bl).norm());
        (width.round() as usize + 1, height.round() as usize + 1)
    }

    /// Destination corners (TL, TR, BR, BL) for [`Quadrilateral::rectified_size`].
    pub fn rectified_corners(&self) -> [Point2<f32>; 4] {
        let (w, h) = self.rectified_size();
        let r = (w - 1) as f32;
        let b = (h - 1) as f32;
        [
            Point2::new(0.0, 0.0),
            Point2::new(r, 0.0),
            Point2::new(r, b),
            Point2::new(0.0, b),
        ]
    }

    /// Unsigned shoelace area in the stored corner order.
    pub fn area(&self) -> f32 {
        polygon_area(&self.corners)
    }
}

/// Unsigned shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point2<f32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (acc.abs() * 0.5) as f32
}
