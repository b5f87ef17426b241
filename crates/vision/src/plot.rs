//! Four-panel landmark chart written by the visualization sink.
//!
//! Panels, left to right and top to bottom: 2D scatter of `(x, y)`, an oblique
//! projection of `(x, y, z)`, overlaid X/Y histograms and the XYZ correlation
//! heatmap.

use image::{Rgb, RgbImage};
use ml_core::{LandmarkArray, LandmarkCategory};

use crate::{
    draw::{draw_line, fill_circle, fill_rect, put_pixel},
    font::draw_text,
};

pub const PANEL_WIDTH: u32 = 400;
pub const PANEL_HEIGHT: u32 = 300;
pub const HISTOGRAM_BINS: usize = 20;

const MARGIN_LEFT: i32 = 16;
const MARGIN_RIGHT: i32 = 12;
const MARGIN_TOP: i32 = 24;
const MARGIN_BOTTOM: i32 = 16;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const AXIS: Rgb<u8> = Rgb([96, 96, 96]);
const SCATTER_2D: Rgb<u8> = Rgb([220, 30, 30]);
const SCATTER_3D: Rgb<u8> = Rgb([30, 60, 220]);
const HIST_X: Rgb<u8> = Rgb([31, 119, 180]);
const HIST_Y: Rgb<u8> = Rgb([255, 127, 14]);
const NO_CORRELATION: Rgb<u8> = Rgb([160, 160, 160]);

/// Plot area inside one panel, in image pixels.
#[derive(Clone, Copy)]
struct Area {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Area {
    fn panel(column: u32, row: u32) -> (i32, i32, Self) {
        let x0 = (column * PANEL_WIDTH) as i32;
        let y0 = (row * PANEL_HEIGHT) as i32;
        let area = Self {
            left: x0 + MARGIN_LEFT,
            top: y0 + MARGIN_TOP,
            right: x0 + PANEL_WIDTH as i32 - MARGIN_RIGHT,
            bottom: y0 + PANEL_HEIGHT as i32 - MARGIN_BOTTOM,
        };
        (x0, y0, area)
    }

    fn width(&self) -> f32 {
        (self.right - self.left) as f32
    }

    fn height(&self) -> f32 {
        (self.bottom - self.top) as f32
    }

    /// Map data coordinates into pixels; `y` is drawn image-down to match
    /// the frame coordinate system.
    fn project(&self, (x, y): (f32, f32), xr: Range, yr: Range) -> (i32, i32) {
        (
            self.left + (xr.unit(x) * self.width()).round() as i32,
            self.top + (yr.unit(y) * self.height()).round() as i32,
        )
    }

    fn frame(&self, image: &mut RgbImage) {
        let corners = [
            (self.left, self.top),
            (self.right, self.top),
            (self.right, self.bottom),
            (self.left, self.bottom),
        ];
        for i in 0..4 {
            draw_line(image, corners[i], corners[(i + 1) % 4], AXIS, 1);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Range {
    min: f32,
    max: f32,
}

impl Range {
    fn of(values: impl Iterator<Item = f32>) -> Self {
        let (min, max) = values
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !min.is_finite() {
            return Self { min: 0.0, max: 1.0 };
        }
        if max - min < f32::EPSILON {
            return Self {
                min: min - 0.5,
                max: max + 0.5,
            };
        }
        let pad = (max - min) * 0.05;
        Self {
            min: min - pad,
            max: max + pad,
        }
    }

    fn unit(&self, value: f32) -> f32 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Render the chart for one persisted batch.
pub fn render_landmark_chart(array: &LandmarkArray, category: LandmarkCategory) -> RgbImage {
    let mut image = RgbImage::from_pixel(PANEL_WIDTH * 2, PANEL_HEIGHT * 2, WHITE);
    let rows: Vec<[f32; 3]> = array.iter().flatten().copied().collect();
    let name = category.label();

    scatter_2d(&mut image, &rows, &format!("2D {name} landmarks"));
    scatter_3d(&mut image, &rows, &format!("3D {name} landmarks"));
    histogram(&mut image, &rows, "Landmark X & Y distribution");
    heatmap(&mut image, &rows, "Landmark correlation heatmap");
    image
}

fn title(image: &mut RgbImage, x0: i32, y0: i32, text: &str) {
    draw_text(image, x0 + MARGIN_LEFT, y0 + 8, text, BLACK, 1);
}

fn scatter_2d(image: &mut RgbImage, rows: &[[f32; 3]], text: &str) {
    let (x0, y0, area) = Area::panel(0, 0);
    title(image, x0, y0, text);
    area.frame(image);
    let xr = Range::of(rows.iter().map(|r| r[0]));
    let yr = Range::of(rows.iter().map(|r| r[1]));
    for row in rows {
        let (px, py) = area.project((row[0], row[1]), xr, yr);
        fill_circle(image, px, py, 2, SCATTER_2D);
    }
}

/// Oblique cabinet projection: depth shifts points up and to the right.
fn oblique(row: &[f32; 3]) -> (f32, f32) {
    const DEPTH: f32 = 0.5 * std::f32::consts::FRAC_1_SQRT_2;
    (row[0] + row[2] * DEPTH, row[1] - row[2] * DEPTH)
}

fn scatter_3d(image: &mut RgbImage, rows: &[[f32; 3]], text: &str) {
    let (x0, y0, area) = Area::panel(1, 0);
    title(image, x0, y0, text);
    area.frame(image);
    let projected: Vec<(f32, f32)> = rows.iter().map(oblique).collect();
    let xr = Range::of(projected.iter().map(|p| p.0));
    let yr = Range::of(projected.iter().map(|p| p.1));
    for point in projected {
        let (px, py) = area.project(point, xr, yr);
        fill_circle(image, px, py, 2, SCATTER_3D);
    }
}

fn bin_counts(values: impl Iterator<Item = f32>, range: Range) -> [u32; HISTOGRAM_BINS] {
    let mut counts = [0u32; HISTOGRAM_BINS];
    for value in values.filter(|v| v.is_finite()) {
        let bin = (range.unit(value) * HISTOGRAM_BINS as f32) as usize;
        counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }
    counts
}

fn blend(under: Rgb<u8>, over: Rgb<u8>) -> Rgb<u8> {
    let mix = |a: u8, b: u8| ((a as u16 + b as u16) / 2) as u8;
    Rgb([
        mix(under[0], over[0]),
        mix(under[1], over[1]),
        mix(under[2], over[2]),
    ])
}

fn histogram(image: &mut RgbImage, rows: &[[f32; 3]], text: &str) {
    let (x0, y0, area) = Area::panel(0, 1);
    title(image, x0, y0, text);
    area.frame(image);

    let range = Range::of(rows.iter().flat_map(|r| [r[0], r[1]]));
    let xs = bin_counts(rows.iter().map(|r| r[0]), range);
    let ys = bin_counts(rows.iter().map(|r| r[1]), range);
    let peak = xs.iter().chain(ys.iter()).copied().max().unwrap_or(0).max(1) as f32;
    let bin_width = area.width() / HISTOGRAM_BINS as f32;

    for (counts, color) in [(xs, HIST_X), (ys, HIST_Y)] {
        for (bin, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let left = area.left + (bin as f32 * bin_width).round() as i32;
            let right = area.left + ((bin + 1) as f32 * bin_width).round() as i32 - 1;
            let top = area.bottom - (count as f32 / peak * area.height()).round() as i32;
            for y in top..area.bottom {
                for x in left..=right {
                    if x >= 0 && y >= 0 {
                        let under = *image.get_pixel(x as u32, y as u32);
                        put_pixel(image, x, y, blend(under, color));
                    }
                }
            }
        }
    }

    fill_rect(image, area.right - 40, area.top + 4, area.right - 34, area.top + 10, HIST_X);
    draw_text(image, area.right - 30, area.top + 4, "X", BLACK, 1);
    fill_rect(image, area.right - 40, area.top + 14, area.right - 34, area.top + 20, HIST_Y);
    draw_text(image, area.right - 30, area.top + 14, "Y", BLACK, 1);
}

/// Pearson correlation of columns `a` and `b`; `None` when either is constant.
fn correlation(rows: &[[f32; 3]], a: usize, b: usize) -> Option<f32> {
    if rows.len() < 2 {
        return None;
    }
    let n = rows.len() as f64;
    let mean = |c: usize| rows.iter().map(|r| r[c] as f64).sum::<f64>() / n;
    let (ma, mb) = (mean(a), mean(b));
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for row in rows {
        let da = row[a] as f64 - ma;
        let db = row[b] as f64 - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    if va <= f64::EPSILON || vb <= f64::EPSILON {
        return None;
    }
    Some((cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0) as f32)
}

/// Diverging blue-white-red map for `r` in `-1..=1`.
fn coolwarm(r: f32) -> Rgb<u8> {
    const COLD: [f32; 3] = [59.0, 76.0, 192.0];
    const MID: [f32; 3] = [221.0, 221.0, 221.0];
    const WARM: [f32; 3] = [180.0, 4.0, 38.0];
    let t = r.clamp(-1.0, 1.0);
    let (from, to, f) = if t < 0.0 {
        (MID, COLD, -t)
    } else {
        (MID, WARM, t)
    };
    let lerp = |i: usize| (from[i] + (to[i] - from[i]) * f).round() as u8;
    Rgb([lerp(0), lerp(1), lerp(2)])
}

fn heatmap(image: &mut RgbImage, rows: &[[f32; 3]], text: &str) {
    let (x0, y0, area) = Area::panel(1, 1);
    title(image, x0, y0, text);

    let side = area.width().min(area.height()) as i32;
    let cell = side / 3;
    let labels = ["X", "Y", "Z"];
    for a in 0..3 {
        for b in 0..3 {
            let color = correlation(rows, a, b).map_or(NO_CORRELATION, coolwarm);
            let left = area.left + b as i32 * cell;
            let top = area.top + a as i32 * cell;
            fill_rect(image, left, top, left + cell - 1, top + cell - 1, color);
        }
        let offset = a as i32 * cell + cell / 2;
        draw_text(image, area.left - 10, area.top + offset, labels[a], BLACK, 1);
        draw_text(image, area.left + offset, area.top + 3 * cell + 4, labels[a], BLACK, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal(n: usize) -> LandmarkArray {
        vec![(0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                [t, t, -t]
            })
            .collect()]
    }

    #[test]
    fn chart_has_four_panels_worth_of_pixels() {
        let image = render_landmark_chart(&diagonal(33), LandmarkCategory::Body);
        assert_eq!(image.dimensions(), (PANEL_WIDTH * 2, PANEL_HEIGHT * 2));
        assert!(image.pixels().any(|p| *p == SCATTER_2D));
        assert!(image.pixels().any(|p| *p == SCATTER_3D));
    }

    #[test]
    fn correlated_columns_are_warm_and_anticorrelated_are_cold() {
        let rows: Vec<[f32; 3]> = diagonal(10).remove(0);
        assert!((correlation(&rows, 0, 1).unwrap() - 1.0).abs() < 1e-5);
        assert!((correlation(&rows, 0, 2).unwrap() + 1.0).abs() < 1e-5);
        assert_eq!(coolwarm(1.0), Rgb([180, 4, 38]));
        assert_eq!(coolwarm(-1.0), Rgb([59, 76, 192]));
    }

    #[test]
    fn constant_column_has_no_correlation() {
        let rows = vec![[0.5, 0.1, 0.0], [0.5, 0.2, 0.0], [0.5, 0.3, 0.0]];
        assert_eq!(correlation(&rows, 0, 1), None);
    }

    #[test]
    fn histogram_bins_cover_the_whole_range() {
        let range = Range { min: 0.0, max: 1.0 };
        let counts = bin_counts([0.0, 0.5, 1.0, f32::NAN].into_iter(), range);
        assert_eq!(counts.iter().sum::<u32>(), 3);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[HISTOGRAM_BINS - 1], 1);
    }

    #[test]
    fn empty_batch_renders_without_panicking() {
        let image = render_landmark_chart(&Vec::new(), LandmarkCategory::Face);
        assert_eq!(image.dimensions(), (PANEL_WIDTH * 2, PANEL_HEIGHT * 2));
    }
}
