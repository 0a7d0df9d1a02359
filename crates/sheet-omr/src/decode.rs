//! Row clustering, fill scoring and option selection.

use std::fmt;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bubbles::BubbleCandidate;
use crate::params::{DecodeParams, SelectionPolicy};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Bubbles believed to belong to one question, left to right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionRow {
    /// `y` of the bubble that opened the row.
    pub key_y: f32,
    pub bubbles: Vec<BubbleCandidate>,
}

/// Group bubbles into rows by vertical proximity.
///
/// Single greedy pass in input order: a bubble joins the first open row whose
/// key is within `row_tolerance * radius` of its `y`, otherwise it opens a new
/// row. Rows are returned sorted by key, bubbles within a row by `x`.
pub fn cluster_rows(bubbles: &[BubbleCandidate], row_tolerance: f32) -> Vec<QuestionRow> {
    let mut rows: Vec<QuestionRow> = Vec::new();
    for b in bubbles {
        let limit = row_tolerance * b.radius;
        match rows
            .iter_mut()
            .find(|r| (b.center.y - r.key_y).abs() <= limit)
        {
            Some(row) => row.bubbles.push(*b),
            None => rows.push(QuestionRow {
                key_y: b.center.y,
                bubbles: vec![*b],
            }),
        }
    }

    rows.sort_by(|a, b| a.key_y.total_cmp(&b.key_y));
    for row in &mut rows {
        row.bubbles.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));
    }
    rows
}

/// Fraction of the bubble's circular mask that is foreground, in `[0, 1]`.
///
/// Pixel `(x, y)` is inside the mask when its centre `(x + 0.5, y + 0.5)` lies
/// within `radius` of the bubble centre. The count is normalized by the ideal
/// disc area `π r²`.
pub fn fill_ratio(binary: &GrayImage, bubble: &BubbleCandidate) -> f32 {
    let r = bubble.radius;
    if r <= 0.0 || binary.width() == 0 || binary.height() == 0 {
        return 0.0;
    }
    let (cx, cy) = (bubble.center.x, bubble.center.y);
    let r2 = r * r;

    let x0 = (cx - r).floor().max(0.0) as u32;
    let y0 = (cy - r).floor().max(0.0) as u32;
    let x1 = ((cx + r).ceil().max(0.0) as u32).min(binary.width());
    let y1 = ((cy + r).ceil().max(0.0) as u32).min(binary.height());

    let mut filled = 0u32;
    for y in y0..y1 {
        let dy = y as f32 + 0.5 - cy;
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            if dx * dx + dy * dy <= r2 && binary.get_pixel(x, y).0[0] > 0 {
                filled += 1;
            }
        }
    }

    (filled as f32 / (std::f32::consts::PI * r2)).clamp(0.0, 1.0)
}

/// Index of the marked option, if any clears `threshold`.
pub fn select_option(scores: &[f32], threshold: f32, policy: SelectionPolicy) -> Option<usize> {
    let mut above = scores
        .iter()
        .enumerate()
        .filter(|(_, &s)| s > threshold);
    match policy {
        SelectionPolicy::FirstAboveThreshold => above.next().map(|(i, _)| i),
        SelectionPolicy::MaxAboveThreshold => above
            .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((i, s)),
            })
            .map(|(i, _)| i),
    }
}

/// Letter for the `index`-th option (`0 -> 'A'`).
pub fn option_letter(index: usize) -> Option<char> {
    if index < 26 {
        Some((b'A' + index as u8) as char)
    } else {
        None
    }
}

/// Outcome for one question.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Answer {
    Selected(char),
    /// No bubble cleared the threshold (or the row was rejected).
    Undetermined,
}

impl Answer {
    pub fn letter(&self) -> Option<char> {
        match self {
            Answer::Selected(c) => Some(*c),
            Answer::Undetermined => None,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, Answer::Undetermined)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Selected(c) => write!(f, "{c}"),
            Answer::Undetermined => f.write_str("?"),
        }
    }
}

const UNDETERMINED: &str = "undetermined";

impl From<Answer> for String {
    fn from(a: Answer) -> Self {
        match a {
            Answer::Selected(c) => c.to_string(),
            Answer::Undetermined => UNDETERMINED.to_string(),
        }
    }
}

impl TryFrom<String> for Answer {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == UNDETERMINED {
            return Ok(Answer::Undetermined);
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => Ok(Answer::Selected(c)),
            _ => Err(format!("expected an option letter or `{UNDETERMINED}`, got `{s}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub key_y: f32,
    pub answer: Answer,
    /// Fill ratio per bubble, left to right.
    pub scores: Vec<f32>,
    pub bubbles: Vec<BubbleCandidate>,
}

impl RowResult {
    pub fn selected_bubble(&self) -> Option<&BubbleCandidate> {
        let letter = self.answer.letter()?;
        let index = (letter as u8).checked_sub(b'A')?;
        self.bubbles.get(index as usize)
    }
}

/// Per-region answers, rows sorted top to bottom.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub rows: Vec<RowResult>,
}

impl GradingResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn answers(&self) -> Vec<Answer> {
        self.rows.iter().map(|r| r.answer).collect()
    }

    /// Answer of the first row whose key is within `tolerance` of `key_y`.
    pub fn answer_at(&self, key_y: f32, tolerance: f32) -> Option<Answer> {
        self.rows
            .iter()
            .find(|r| (r.key_y - key_y).abs() <= tolerance)
            .map(|r| r.answer)
    }

    pub fn undetermined_count(&self) -> usize {
        self.rows.iter().filter(|r| r.answer.is_undetermined()).count()
    }
}

fn decode_row(binary: &GrayImage, row: QuestionRow, params: &DecodeParams) -> RowResult {
    let scores: Vec<f32> = row.bubbles.iter().map(|b| fill_ratio(binary, b)).collect();

    let answer = match params.max_options {
        Some(max) if row.bubbles.len() > max => {
            warn!(
                "row at y={:.1} has {} bubbles (max {max}); marking undetermined",
                row.key_y,
                row.bubbles.len()
            );
            Answer::Undetermined
        }
        _ => select_option(&scores, params.fill_threshold, params.selection)
            .map(|i| match option_letter(i) {
                Some(c) => Answer::Selected(c),
                None => {
                    warn!("row at y={:.1}: option {i} has no letter", row.key_y);
                    Answer::Undetermined
                }
            })
            .unwrap_or(Answer::Undetermined),
    };

    RowResult {
        key_y: row.key_y,
        answer,
        scores,
        bubbles: row.bubbles,
    }
}

/// Cluster, score and select.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(binary, bubbles, params), fields(bubbles = bubbles.len()))
)]
pub fn decode_answers(
    binary: &GrayImage,
    bubbles: &[BubbleCandidate],
    params: &DecodeParams,
) -> GradingResult {
    let rows = cluster_rows(bubbles, params.row_tolerance);
    let result = GradingResult {
        rows: rows
            .into_iter()
            .map(|row| decode_row(binary, row, params))
            .collect(),
    };
    debug!(
        "decode: {} bubbles -> {} rows, {} undetermined",
        bubbles.len(),
        result.len(),
        result.undetermined_count()
    );
    result
}

/// Copy of `color` with selected bubbles circled in green and the bubbles of
/// undetermined rows in red.
pub fn annotate_answers(color: &RgbImage, result: &GradingResult) -> RgbImage {
    let mut out = color.clone();
    let green = Rgb([0, 190, 0]);
    let red = Rgb([220, 30, 30]);
    for row in &result.rows {
        let (targets, stroke): (Vec<&BubbleCandidate>, _) = match row.selected_bubble() {
            Some(b) => (vec![b], green),
            None => (row.bubbles.iter().collect(), red),
        };
        for b in targets {
            let c = (b.center.x.round() as i32, b.center.y.round() as i32);
            let r = b.radius.round() as i32;
            for dr in 0..2 {
                draw_hollow_circle_mut(&mut out, c, r + dr, stroke);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_disc, draw_ring};
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn bubble(x: f32, y: f32, r: f32) -> BubbleCandidate {
        let d = (2.0 * r) as u32;
        BubbleCandidate {
            center: Point2::new(x, y),
            radius: r,
            width: d,
            height: d,
        }
    }

    fn xs(row: &QuestionRow) -> Vec<f32> {
        row.bubbles.iter().map(|b| b.center.x).collect()
    }

    #[test]
    fn clusters_rows_and_orders_options() {
        let bubbles = vec![
            bubble(130.0, 101.0, 10.0),
            bubble(30.0, 100.0, 10.0),
            bubble(80.0, 160.0, 10.0),
            bubble(80.0, 99.0, 10.0),
            bubble(30.0, 162.0, 10.0),
        ];
        let rows = cluster_rows(&bubbles, 2.0);
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].key_y, 101.0);
        assert_eq!(xs(&rows[0]), vec![30.0, 80.0, 130.0]);
        assert_relative_eq!(rows[1].key_y, 160.0);
        assert_eq!(xs(&rows[1]), vec![30.0, 80.0]);
    }

    #[test]
    fn rows_are_sorted_by_key() {
        let bubbles = vec![
            bubble(10.0, 300.0, 10.0),
            bubble(10.0, 100.0, 10.0),
            bubble(10.0, 200.0, 10.0),
        ];
        let keys: Vec<f32> = cluster_rows(&bubbles, 2.0).iter().map(|r| r.key_y).collect();
        assert_eq!(keys, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn membership_is_stable_under_permutation() {
        let base = vec![
            bubble(20.0, 50.0, 10.0),
            bubble(60.0, 52.0, 10.0),
            bubble(100.0, 49.0, 10.0),
            bubble(20.0, 120.0, 10.0),
            bubble(60.0, 118.0, 10.0),
            bubble(100.0, 121.0, 10.0),
        ];
        let expected: Vec<Vec<f32>> = cluster_rows(&base, 2.0).iter().map(xs).collect();
        let perms: [[usize; 6]; 4] = [
            [2, 1, 0, 5, 4, 3],
            [3, 0, 4, 1, 5, 2],
            [5, 3, 1, 4, 2, 0],
            [1, 4, 2, 0, 3, 5],
        ];
        for perm in perms {
            let shuffled: Vec<BubbleCandidate> = perm.iter().map(|&i| base[i]).collect();
            let got: Vec<Vec<f32>> = cluster_rows(&shuffled, 2.0).iter().map(xs).collect();
            assert_eq!(got, expected, "perm {perm:?}");
        }
    }

    #[test]
    fn tolerance_is_relative_to_radius() {
        let bubbles = vec![bubble(10.0, 100.0, 5.0), bubble(40.0, 111.0, 5.0)];
        assert_eq!(cluster_rows(&bubbles, 2.0).len(), 2);
        assert_eq!(cluster_rows(&bubbles, 2.3).len(), 1);
    }

    #[test]
    fn fill_ratio_of_solid_disc_and_ring() {
        let mut binary = GrayImage::new(100, 100);
        draw_disc(&mut binary, 30.0, 30.0, 14.5, 255);
        draw_ring(&mut binary, 70.0, 70.0, 13.0, 14.5, 255);

        let solid = fill_ratio(&binary, &bubble(30.5, 30.5, 14.5));
        assert!(solid > 0.95, "solid {solid}");
        let ring = fill_ratio(&binary, &bubble(70.5, 70.5, 14.5));
        assert!(ring > 0.1 && ring < 0.3, "ring {ring}");
        let empty = fill_ratio(&GrayImage::new(100, 100), &bubble(30.5, 30.5, 14.5));
        assert_relative_eq!(empty, 0.0);
    }

    #[test]
    fn fill_ratio_clips_at_image_border() {
        let binary = GrayImage::from_pixel(20, 20, image::Luma([255]));
        let r = fill_ratio(&binary, &bubble(0.0, 0.0, 8.0));
        // Only one quadrant of the disc lies inside the image.
        assert!(r > 0.2 && r < 0.3, "ratio {r}");
        assert_relative_eq!(fill_ratio(&binary, &bubble(10.0, 10.0, 0.0)), 0.0);
    }

    #[test]
    fn first_above_threshold_is_greedy() {
        let p = SelectionPolicy::FirstAboveThreshold;
        assert_eq!(select_option(&[0.1, 0.05, 0.9, 0.1], 0.35, p), Some(2));
        assert_eq!(select_option(&[0.1, 0.5, 0.9, 0.1], 0.35, p), Some(1));
        assert_eq!(select_option(&[0.1, 0.2, 0.3], 0.35, p), None);
        assert_eq!(select_option(&[0.35], 0.35, p), None);
        assert_eq!(select_option(&[], 0.35, p), None);
    }

    #[test]
    fn max_above_threshold_prefers_darkest_then_leftmost() {
        let p = SelectionPolicy::MaxAboveThreshold;
        assert_eq!(select_option(&[0.1, 0.5, 0.9, 0.1], 0.35, p), Some(2));
        assert_eq!(select_option(&[0.8, 0.5, 0.8], 0.35, p), Some(0));
        assert_eq!(select_option(&[0.1, 0.2], 0.35, p), None);
    }

    #[test]
    fn raising_threshold_never_resolves_more_rows() {
        let rows = [
            vec![0.1, 0.9, 0.2],
            vec![0.4, 0.5, 0.1],
            vec![0.3, 0.2, 0.36],
            vec![0.0, 0.0, 0.0],
            vec![0.6, 0.7, 0.95],
        ];
        for policy in [
            SelectionPolicy::FirstAboveThreshold,
            SelectionPolicy::MaxAboveThreshold,
        ] {
            let mut prev = 0usize;
            for step in 0..=20 {
                let t = step as f32 * 0.05;
                let undetermined = rows
                    .iter()
                    .filter(|s| select_option(s, t, policy).is_none())
                    .count();
                assert!(undetermined >= prev, "{policy:?} at {t}");
                prev = undetermined;
            }
            assert_eq!(prev, rows.len());
        }
    }

    #[test]
    fn answer_display_and_serde() {
        assert_eq!(Answer::Selected('C').to_string(), "C");
        assert_eq!(Answer::Undetermined.to_string(), "?");
        assert_eq!(serde_json::to_string(&Answer::Selected('B')).unwrap(), "\"B\"");
        assert_eq!(
            serde_json::to_string(&Answer::Undetermined).unwrap(),
            "\"undetermined\""
        );
        let back: Answer = serde_json::from_str("\"undetermined\"").unwrap();
        assert_eq!(back, Answer::Undetermined);
        assert!(serde_json::from_str::<Answer>("\"?\"").is_err());
    }

    fn row_of_bubbles(binary: &mut GrayImage, y: f32, fills: &[bool]) -> Vec<BubbleCandidate> {
        fills
            .iter()
            .enumerate()
            .map(|(i, &filled)| {
                let x = 40.0 + 45.0 * i as f32;
                if filled {
                    draw_disc(binary, x, y, 14.5, 255);
                } else {
                    draw_ring(binary, x, y, 13.0, 14.5, 255);
                }
                bubble(x + 0.5, y + 0.5, 14.5)
            })
            .collect()
    }

    #[test]
    fn decodes_marked_option_per_row() {
        let mut binary = GrayImage::new(260, 200);
        let mut bubbles = row_of_bubbles(&mut binary, 40.0, &[false, false, true, false]);
        bubbles.extend(row_of_bubbles(&mut binary, 100.0, &[false, false, false, false]));
        bubbles.extend(row_of_bubbles(&mut binary, 160.0, &[true, false, false, false]));

        let result = decode_answers(&binary, &bubbles, &DecodeParams::default());
        assert_eq!(
            result.answers(),
            vec![
                Answer::Selected('C'),
                Answer::Undetermined,
                Answer::Selected('A')
            ]
        );
        assert_eq!(result.undetermined_count(), 1);
        assert_eq!(result.answer_at(100.0, 2.0), Some(Answer::Undetermined));
        assert_eq!(result.answer_at(70.0, 2.0), None);
        assert!(result.rows[0].scores[2] > 0.9);
        assert!(result.rows[0].scores.iter().enumerate().all(|(i, &s)| i == 2 || s <= 0.3));
    }

    #[test]
    fn five_options_with_one_dark_mark_select_c() {
        let mut binary = GrayImage::new(260, 80);
        let bubbles: Vec<BubbleCandidate> = (0..5)
            .map(|i| {
                let x = 40.0 + 45.0 * i as f32;
                // Light specks everywhere, a nearly full mark on C.
                let r = if i == 2 { 13.8 } else { 4.0 };
                draw_disc(&mut binary, x, 40.0, r, 255);
                bubble(x + 0.5, 40.5, 14.5)
            })
            .collect();

        let result = decode_answers(&binary, &bubbles, &DecodeParams::default());
        let s = &result.rows[0].scores;
        assert_eq!(s.len(), 5);
        assert!(s[2] > 0.85 && s[2] < 0.95, "C {}", s[2]);
        assert!(
            s.iter().enumerate().all(|(i, &v)| i == 2 || v <= 0.1),
            "{s:?}"
        );
        assert_eq!(result.answers(), vec![Answer::Selected('C')]);
    }

    #[test]
    fn half_filled_earlier_bubble_wins_under_first_policy() {
        let mut binary = GrayImage::new(260, 80);
        let bubbles = row_of_bubbles(&mut binary, 40.0, &[false, false, true, false]);
        // Fill the left half of B.
        let bx = bubbles[1].center.x;
        for y in 0..80u32 {
            for x in 0..260u32 {
                let dx = x as f32 + 0.5 - bx;
                let dy = y as f32 + 0.5 - 40.5;
                if dx <= 0.0 && dx * dx + dy * dy <= 14.5 * 14.5 {
                    binary.put_pixel(x, y, image::Luma([255]));
                }
            }
        }
        let result = decode_answers(&binary, &bubbles, &DecodeParams::default());
        let s = &result.rows[0].scores;
        assert!(s[1] > 0.5 && s[1] < 0.75, "B {}", s[1]);
        assert_eq!(result.answers(), vec![Answer::Selected('B')]);

        let params = DecodeParams {
            selection: SelectionPolicy::MaxAboveThreshold,
            ..DecodeParams::default()
        };
        let result = decode_answers(&binary, &bubbles, &params);
        assert_eq!(result.answers(), vec![Answer::Selected('C')]);
    }

    #[test]
    fn rows_over_max_options_are_undetermined() {
        let mut binary = GrayImage::new(300, 80);
        let bubbles = row_of_bubbles(&mut binary, 40.0, &[true, false, false, false, false, false]);
        let params = DecodeParams {
            max_options: Some(5),
            ..DecodeParams::default()
        };
        let result = decode_answers(&binary, &bubbles, &params);
        assert_eq!(result.answers(), vec![Answer::Undetermined]);
        assert_eq!(result.rows[0].scores.len(), 6);
    }

    #[test]
    fn zero_bubbles_give_empty_result() {
        let result = decode_answers(&GrayImage::new(50, 50), &[], &DecodeParams::default());
        assert!(result.is_empty());
        assert_eq!(result.undetermined_count(), 0);
    }

    #[test]
    fn annotation_circles_selected_bubble_only() {
        let mut binary = GrayImage::new(260, 80);
        let bubbles = row_of_bubbles(&mut binary, 40.0, &[false, true, false]);
        let result = decode_answers(&binary, &bubbles, &DecodeParams::default());
        let color = RgbImage::from_pixel(260, 80, Rgb([255, 255, 255]));
        let out = annotate_answers(&color, &result);

        let b = bubbles[1];
        let top = (b.center.x.round() as u32, (b.center.y.round() - b.radius.round()) as u32);
        assert_eq!(out.get_pixel(top.0, top.1), &Rgb([0, 190, 0]));
        let a = bubbles[0];
        let top_a = (a.center.x.round() as u32, (a.center.y.round() - a.radius.round()) as u32);
        assert_eq!(out.get_pixel(top_a.0, top_a.1), &Rgb([255, 255, 255]));
    }
}
