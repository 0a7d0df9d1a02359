use crate::{
    sample_bilinear_rgb, sample_bilinear_u8, GrayImage, GrayImageView, RgbImage, RgbImageView,
};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};

/// Plane-to-plane projective map, normalized so that `h[(2, 2)] == 1` when built
/// from correspondences.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity that moves the centroid of `pts` to the origin and scales their
/// mean distance from it to sqrt(2).
fn conditioning_transform(pts: &[Point2<f32>; 4]) -> Matrix3<f64> {
    let centroid = pts
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + Vector2::new(p.x as f64, p.y as f64))
        / 4.0;
    let spread = pts
        .iter()
        .map(|p| (Vector2::new(p.x as f64, p.y as f64) - centroid).norm())
        .sum::<f64>()
        / 4.0;
    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    Matrix3::new(
        s, 0.0, -s * centroid.x, //
        0.0, s, -s * centroid.y, //
        0.0, 0.0, 1.0,
    )
}

fn conditioned(t: &Matrix3<f64>, p: Point2<f32>) -> (f64, f64) {
    let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
    (v.x, v.y)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None` when
/// the configuration is degenerate (three collinear points, repeated corners).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let t_src = conditioning_transform(src);
    let t_dst = conditioning_transform(dst);

    // Eight unknowns with h33 fixed to 1; each correspondence gives two rows.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (&ps, &pd)) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y) = conditioned(&t_src, ps);
        let (u, v) = conditioned(&t_dst, pd);
        for (row, target, offset) in [(2 * k, u, 0), (2 * k + 1, v, 3)] {
            a[(row, offset)] = x;
            a[(row, offset + 1)] = y;
            a[(row, offset + 2)] = 1.0;
            a[(row, 6)] = -target * x;
            a[(row, 7)] = -target * y;
            b[row] = target;
        }
    }

    let sol = a.lu().solve(&b)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let conditioned_h = Matrix3::new(
        sol[0], sol[1], sol[2], //
        sol[3], sol[4], sol[5], //
        sol[6], sol[7], 1.0,
    );

    let h = t_dst.try_inverse()? * conditioned_h * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / scale))
}

/// Warp into an `out_w × out_h` raster: every output pixel `(x, y)` is mapped to
/// the source through `h_src_from_dst` and sampled bilinearly.
///
/// Pixel `(x, y)` is treated as the point `(x, y)`, so corner correspondences
/// expressed in pixel indices map exactly.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(src, h_src_from_dst))
)]
pub fn warp_perspective_gray(
    src: &GrayImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];

    for y in 0..out_h {
        for x in 0..out_w {
            let ps = h_src_from_dst.apply(Point2::new(x as f32, y as f32));
            out[y * out_w + x] = sample_bilinear_u8(src, ps.x, ps.y);
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

/// Color counterpart of [`warp_perspective_gray`].
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(src, h_src_from_dst))
)]
pub fn warp_perspective_rgb(
    src: &RgbImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> RgbImage {
    let mut out = vec![0u8; out_w * out_h * 3];

    for y in 0..out_h {
        for x in 0..out_w {
            let ps = h_src_from_dst.apply(Point2::new(x as f32, y as f32));
            let i = (y * out_w + x) * 3;
            out[i..i + 3].copy_from_slice(&sample_bilinear_rgb(src, ps.x, ps.y));
        }
    }

    RgbImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}
