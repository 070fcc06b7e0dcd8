//! Exhaustive sliding-window template matching.
//!
//! Every top-left offset where the template fits is visited in row-major
//! order and the first offset whose score reaches the threshold wins. The
//! score is the fraction of template pixels whose RGB distance to the screen
//! pixel is below [`COLOR_TOLERANCE`]; template pixels with zero alpha always
//! count as matched.

use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;

use super::template::Threshold;
use crate::Point;

/// Euclidean RGB distance below which two pixels are considered equal.
pub const COLOR_TOLERANCE: u32 = 30;

const COLOR_TOLERANCE_SQ: u32 = COLOR_TOLERANCE * COLOR_TOLERANCE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    /// Center of the matched region, in screen buffer coordinates.
    Found(Point),
    NotFound,
}

impl MatchResult {
    pub fn point(self) -> Option<Point> {
        match self {
            MatchResult::Found(p) => Some(p),
            MatchResult::NotFound => None,
        }
    }
}

/// Work done by one matching pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub offsets_scanned: u64,
    pub pixels_compared: u64,
    /// The cancel flag ended the scan before every offset was tried.
    pub cancelled: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MatchOptions<'a> {
    pub threshold: Threshold,
    /// Polled between offsets; a set flag ends the scan with `NotFound`.
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> MatchOptions<'a> {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Finds the first offset (row-major) where `template` matches `screen`.
pub fn find_match(screen: &RgbaImage, template: &RgbaImage, threshold: Threshold) -> MatchResult {
    find_match_with_stats(screen, template, &MatchOptions::new(threshold)).0
}

pub fn find_match_with_stats(
    screen: &RgbaImage,
    template: &RgbaImage,
    options: &MatchOptions<'_>,
) -> (MatchResult, MatchStats) {
    let mut stats = MatchStats::default();
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();

    if sw < tw || sh < th || tw == 0 || th == 0 {
        return (MatchResult::NotFound, stats);
    }

    let threshold = options.threshold.value();
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            if options.cancelled() {
                tracing::debug!("Template scan cancelled at ({}, {})", x, y);
                stats.cancelled = true;
                return (MatchResult::NotFound, stats);
            }
            stats.offsets_scanned += 1;
            if reaches_threshold(screen, template, x, y, threshold, &mut stats) {
                let center = Point::new((x + tw / 2) as i32, (y + th / 2) as i32);
                return (MatchResult::Found(center), stats);
            }
        }
    }

    (MatchResult::NotFound, stats)
}

/// Similarity of `template` placed at `(x, y)` on `screen`, in [0, 1].
///
/// Returns `None` if the template does not fit at that offset.
pub fn score_at(screen: &RgbaImage, template: &RgbaImage, x: u32, y: u32) -> Option<f64> {
    let (tw, th) = template.dimensions();
    let fits = |start: u32, len: u32, limit: u32| {
        start.checked_add(len).is_some_and(|end| end <= limit)
    };
    if tw == 0 || th == 0 || !fits(x, tw, screen.width()) || !fits(y, th, screen.height()) {
        return None;
    }

    let mut matched = 0u64;
    for ty in 0..th {
        let screen_row = row(screen, x, y + ty, tw);
        let template_row = row(template, 0, ty, tw);
        matched += screen_row
            .chunks_exact(4)
            .zip(template_row.chunks_exact(4))
            .filter(|(s, t)| pixel_matches(s, t))
            .count() as u64;
    }
    Some(matched as f64 / (tw as u64 * th as u64) as f64)
}

/// Same decision as `score_at(..) >= threshold`, but stops as soon as the
/// remaining pixels can no longer lift the score to the threshold.
fn reaches_threshold(
    screen: &RgbaImage,
    template: &RgbaImage,
    x: u32,
    y: u32,
    threshold: f64,
    stats: &mut MatchStats,
) -> bool {
    let (tw, th) = template.dimensions();
    let total = tw as u64 * th as u64;
    let mut matched = 0u64;
    let mut remaining = total;

    for ty in 0..th {
        let screen_row = row(screen, x, y + ty, tw);
        let template_row = row(template, 0, ty, tw);
        for (s, t) in screen_row.chunks_exact(4).zip(template_row.chunks_exact(4)) {
            stats.pixels_compared += 1;
            remaining -= 1;
            if pixel_matches(s, t) {
                matched += 1;
            } else if ((matched + remaining) as f64 / total as f64) < threshold {
                return false;
            }
        }
    }

    matched as f64 / total as f64 >= threshold
}

/// Raw RGBA bytes of `len` pixels starting at `(x, y)`.
fn row(img: &RgbaImage, x: u32, y: u32, len: u32) -> &[u8] {
    let stride = img.width() as usize * 4;
    let start = y as usize * stride + x as usize * 4;
    &img.as_raw()[start..start + len as usize * 4]
}

fn pixel_matches(screen: &[u8], template: &[u8]) -> bool {
    if template[3] == 0 {
        return true;
    }
    let dr = screen[0].abs_diff(template[0]) as u32;
    let dg = screen[1].abs_diff(template[1]) as u32;
    let db = screen[2].abs_diff(template[2]) as u32;
    dr * dr + dg * dg + db * db < COLOR_TOLERANCE_SQ
}
