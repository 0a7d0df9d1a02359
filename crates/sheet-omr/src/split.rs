//! Margin cropping and column layout on the rectified sheet.

use image::{GrayImage, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::params::SplitParams;
use crate::raster::{crop_gray, crop_rgb};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    /// The whole cropped answer area (single-column layout).
    Full,
    LeftColumn,
    RightColumn,
    /// Strip carrying the page's metadata code.
    Metadata,
}

/// Axis-aligned pixel rectangle in the rectified frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A binary/color sub-image pair cut from the rectified sheet.
#[derive(Clone, Debug)]
pub struct SheetRegion {
    pub role: RegionRole,
    pub rect: PixelRect,
    pub binary: GrayImage,
    pub color: RgbImage,
}

#[derive(Clone, Debug, Default)]
pub struct SplitRegions {
    /// Answer regions in reading order (left column before right).
    pub answers: Vec<SheetRegion>,
    /// Excised metadata strip, present only in dual-column layout.
    pub metadata: Option<SheetRegion>,
}

fn frac_floor(len: u32, frac: f64) -> u32 {
    (len as f64 * frac).floor().max(0.0) as u32
}

/// Compute the region rectangles for a rectified sheet of `width × height`.
///
/// Empty rectangles are dropped.
pub fn layout_regions(width: u32, height: u32, params: &SplitParams) -> Vec<(RegionRole, PixelRect)> {
    let top = frac_floor(height, params.top_fraction);
    let bottom = frac_floor(height, 1.0 - params.bottom_fraction);
    let left = frac_floor(width, params.left_fraction);
    let right = frac_floor(width, 1.0 - params.right_fraction);

    let crop_w = right.saturating_sub(left);
    let crop_h = bottom.saturating_sub(top);
    if crop_w == 0 || crop_h == 0 {
        return Vec::new();
    }

    let header = frac_floor(crop_h, params.header_fraction);
    let body = PixelRect {
        x: left,
        y: top + header,
        width: crop_w,
        height: crop_h - header,
    };

    let mut out = Vec::with_capacity(3);
    if !params.dual_column {
        out.push((RegionRole::Full, body));
    } else {
        let mid = body.width / 2;
        let keep = frac_floor(body.height, 1.0 - params.metadata_fraction);
        out.push((
            RegionRole::LeftColumn,
            PixelRect {
                width: mid,
                ..body
            },
        ));
        out.push((
            RegionRole::RightColumn,
            PixelRect {
                x: body.x + mid,
                width: body.width - mid,
                height: keep,
                ..body
            },
        ));
        out.push((
            RegionRole::Metadata,
            PixelRect {
                x: body.x + mid,
                y: body.y + keep,
                width: body.width - mid,
                height: body.height - keep,
            },
        ));
    }
    out.retain(|(_, r)| !r.is_empty());
    out
}

/// Cut the rectified sheet into answer regions and the metadata strip.
pub fn split_regions(binary: &GrayImage, color: &RgbImage, params: &SplitParams) -> SplitRegions {
    let (w, h) = binary.dimensions();
    let mut regions = SplitRegions::default();
    for (role, rect) in layout_regions(w, h, params) {
        let region = SheetRegion {
            role,
            rect,
            binary: crop_gray(binary, rect.x, rect.y, rect.width, rect.height),
            color: crop_rgb(color, rect.x, rect.y, rect.width, rect.height),
        };
        if role == RegionRole::Metadata {
            regions.metadata = Some(region);
        } else {
            regions.answers.push(region);
        }
    }
    debug!(
        "split: {}x{} -> {} answer region(s), metadata strip: {}",
        w,
        h,
        regions.answers.len(),
        regions.metadata.is_some()
    );
    regions
}
