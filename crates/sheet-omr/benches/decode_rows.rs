use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use sheet_omr::{
    cluster_rows, decode_answers, locate_bubbles, BubbleParams, DecodeParams, SheetGrader,
    SheetOmrParams,
};

const ROWS: usize = 25;
const OPTIONS: usize = 5;

fn bubble_xy(row: usize, col: usize) -> (f32, f32) {
    (80.0 + col as f32 * 70.0, 40.0 + row as f32 * 32.0)
}

/// Inverted binary answer column: rings everywhere, one disc per row.
fn make_answer_region() -> GrayImage {
    GrayImage::from_fn(440, 840, |x, y| {
        let (px, py) = (x as f32, y as f32);
        for row in 0..ROWS {
            for col in 0..OPTIONS {
                let (cx, cy) = bubble_xy(row, col);
                let d2 = (px - cx).powi(2) + (py - cy).powi(2);
                let r_in = if col == row % OPTIONS { 0.0 } else { 12.5f32 };
                if d2 >= r_in * r_in && d2 <= 14.5 * 14.5 {
                    return Luma([255]);
                }
            }
        }
        Luma([0])
    })
}

fn make_page(region: &GrayImage) -> DynamicImage {
    let (w, h) = (640, 1160);
    DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
        let on_sheet = x >= 40 && y >= 40 && x < w - 40 && y < h - 40;
        let (rx, ry) = (x.wrapping_sub(100), y.wrapping_sub(200));
        let ink = rx < region.width() && ry < region.height() && region.get_pixel(rx, ry).0[0] > 0;
        let v = match (on_sheet, ink) {
            (false, _) => 70,
            (true, true) => 20,
            (true, false) => 245,
        };
        Luma([v])
    }))
}

fn bench_locate(c: &mut Criterion) {
    let region = make_answer_region();
    let params = BubbleParams::default();
    c.bench_function("locate_bubbles_25x5", |b| {
        b.iter(|| black_box(locate_bubbles(black_box(&region), black_box(&params)).len()))
    });
}

fn bench_decode(c: &mut Criterion) {
    let region = make_answer_region();
    let bubbles = locate_bubbles(&region, &BubbleParams::default());
    let params = DecodeParams::default();

    c.bench_function("cluster_rows_25x5", |b| {
        b.iter(|| black_box(cluster_rows(black_box(&bubbles), params.row_tolerance).len()))
    });
    c.bench_function("decode_answers_25x5", |b| {
        b.iter(|| {
            let result = decode_answers(black_box(&region), black_box(&bubbles), &params);
            black_box(result.undetermined_count())
        })
    });
}

fn bench_page(c: &mut Criterion) {
    let page = make_page(&make_answer_region());
    let grader = SheetGrader::new(SheetOmrParams::default()).expect("default params are valid");
    c.bench_function("grade_image_640x1160", |b| {
        b.iter(|| black_box(grader.grade_image(black_box(&page)).row_count()))
    });
}

criterion_group!(decode_rows, bench_locate, bench_decode, bench_page);
criterion_main!(decode_rows);
