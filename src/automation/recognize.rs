//! Recognize a template on screen and click it.
//!
//! Capture, template load and matching feed a single click decision. Template
//! problems count as a miss and a miss can fall back to a fixed,
//! corner-relative click so the automation keeps going.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::capture::{Capture, CaptureTarget, ScreenSource};
use crate::input::{ClickDispatcher, ClickTarget, MouseButton, MouseDriver};
use crate::recognition::{
    find_match_with_stats, MatchOptions, MatchResult, MatchStats, TemplateId, TemplateStore,
    Threshold,
};
use crate::Point;

/// Screen corner a fallback offset is measured from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    #[default]
    BottomLeft,
    BottomRight,
}

/// Click position used when recognition fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    #[serde(default)]
    pub corner: Corner,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Fallback {
    pub fn bottom_left(offset_x: i32, offset_y: i32) -> Self {
        Self {
            corner: Corner::BottomLeft,
            offset_x,
            offset_y,
        }
    }

    /// Position inside a `width` x `height` area, relative to its top-left.
    pub fn point_in(&self, width: u32, height: u32) -> Point {
        let (w, h) = (width as i32, height as i32);
        match self.corner {
            Corner::TopLeft => Point::new(self.offset_x, self.offset_y),
            Corner::TopRight => Point::new(w - self.offset_x, self.offset_y),
            Corner::BottomLeft => Point::new(self.offset_x, h - self.offset_y),
            Corner::BottomRight => Point::new(w - self.offset_x, h - self.offset_y),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecognizeRequest {
    pub template: TemplateId,
    pub threshold: Threshold,
    pub target: CaptureTarget,
    pub button: MouseButton,
    pub fallback: Option<Fallback>,
    /// Click again after this delay to confirm the UI action.
    pub confirm_click: Option<Duration>,
}

impl RecognizeRequest {
    /// Full-screen search with the default threshold and a left click.
    pub fn new(template: TemplateId) -> Self {
        Self {
            template,
            threshold: Threshold::default(),
            target: CaptureTarget::FullScreen,
            button: MouseButton::Left,
            fallback: None,
            confirm_click: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_confirm_click(mut self, delay: Duration) -> Self {
        self.confirm_click = Some(delay);
        self
    }
}

/// Result of one recognize-and-click attempt. Screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecognizeOutcome {
    /// Template found and clicked at its center.
    Clicked(Point),
    /// Template not found; clicked the fallback position instead.
    FallbackClicked(Point),
    /// Template not found and no fallback configured.
    NotFound,
    /// The screen could not be captured.
    CaptureFailed,
    /// A click was decided but input injection failed.
    ClickFailed(Point),
    /// The scan was cancelled before a match was found.
    Cancelled,
}

impl RecognizeOutcome {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            RecognizeOutcome::Clicked(_) | RecognizeOutcome::FallbackClicked(_)
        )
    }
}

/// What one capture-and-match pass saw.
#[derive(Clone, Debug)]
pub struct Located {
    pub capture: Capture,
    pub result: MatchResult,
    pub stats: MatchStats,
}

/// Runs the capture → match → click pipeline.
pub struct Recognizer<S: ScreenSource, M: MouseDriver> {
    screen: S,
    clicker: ClickDispatcher<M>,
    templates: TemplateStore,
    missed_capture_dir: Option<PathBuf>,
}

impl<S: ScreenSource, M: MouseDriver> Recognizer<S, M> {
    pub fn new(screen: S, clicker: ClickDispatcher<M>, templates: TemplateStore) -> Self {
        Self {
            screen,
            clicker,
            templates,
            missed_capture_dir: None,
        }
    }

    /// Save the captured screen into `dir` whenever a template is missed.
    pub fn save_missed_captures_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.missed_capture_dir = Some(dir.into());
        self
    }

    /// Captures the screen and searches it for the template.
    ///
    /// Returns `None` if the capture failed or came back empty. A template
    /// that cannot be loaded yields `NotFound`.
    pub fn locate(
        &mut self,
        request: &RecognizeRequest,
        cancel: Option<&AtomicBool>,
    ) -> Option<Located> {
        let capture = match self.screen.capture(request.target) {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!("Recognition of {} aborted: {}", request.template, e);
                return None;
            }
        };
        if capture.is_empty() {
            tracing::warn!(
                "Nothing captured for {} ({}x{} at {}); is the window minimized?",
                request.template,
                capture.width(),
                capture.height(),
                capture.origin
            );
            return None;
        }

        let template = match self.templates.load(&request.template, request.threshold) {
            Ok(template) => template,
            Err(e) if e.is_template_error() => {
                tracing::warn!("{}; treating {} as not found", e, request.template);
                return Some(Located {
                    capture,
                    result: MatchResult::NotFound,
                    stats: MatchStats::default(),
                });
            }
            Err(e) => {
                tracing::error!("Recognition of {} aborted: {}", request.template, e);
                return None;
            }
        };

        let options = MatchOptions {
            threshold: template.threshold,
            cancel,
        };
        let started = std::time::Instant::now();
        let (result, stats) = find_match_with_stats(&capture.pixels, &template.pixels, &options);
        tracing::debug!(
            "Matched {} against {}x{} capture in {:?}: {:?} ({} offsets, {} pixels)",
            template.id,
            capture.width(),
            capture.height(),
            started.elapsed(),
            result,
            stats.offsets_scanned,
            stats.pixels_compared
        );
        Some(Located {
            capture,
            result,
            stats,
        })
    }

    pub fn recognize_and_click(
        &mut self,
        request: &RecognizeRequest,
        cancel: Option<&AtomicBool>,
    ) -> RecognizeOutcome {
        let Some(Located {
            capture,
            result,
            stats,
        }) = self.locate(request, cancel)
        else {
            return RecognizeOutcome::CaptureFailed;
        };

        if let Some(center) = result.point() {
            let point = capture.to_screen(center);
            tracing::info!("Found {} at {}", request.template, point);
            if !self.click(point, request.button) {
                return RecognizeOutcome::ClickFailed(point);
            }
            if let Some(delay) = request.confirm_click {
                thread::sleep(delay);
                if !self.click(point, request.button) {
                    tracing::warn!("Confirmation click at {} failed", point);
                }
            }
            return RecognizeOutcome::Clicked(point);
        }

        if stats.cancelled {
            tracing::info!("Recognition of {} cancelled", request.template);
            return RecognizeOutcome::Cancelled;
        }

        tracing::info!("{} not found on screen", request.template);
        self.save_missed_capture(&request.template, &capture);

        let Some(fallback) = request.fallback else {
            return RecognizeOutcome::NotFound;
        };
        let point = capture.to_screen(fallback.point_in(capture.width(), capture.height()));
        tracing::info!(
            "Using fallback click for {} at {} ({:?} + ({}, {}))",
            request.template,
            point,
            fallback.corner,
            fallback.offset_x,
            fallback.offset_y
        );
        if self.click(point, request.button) {
            RecognizeOutcome::FallbackClicked(point)
        } else {
            RecognizeOutcome::ClickFailed(point)
        }
    }

    /// Recognizes `<sub_folder>/<name>` on the full screen and left-clicks it,
    /// falling back to a bottom-left-relative click when offsets are given.
    pub fn recognize_and_click_named(
        &mut self,
        name: &str,
        sub_folder: &str,
        fallback_offset: Option<(i32, i32)>,
    ) -> bool {
        let mut request = RecognizeRequest::new(TemplateId::new(name, sub_folder));
        request.fallback = fallback_offset.map(|(x, y)| Fallback::bottom_left(x, y));
        self.recognize_and_click(&request, None).is_success()
    }

    fn click(&mut self, point: Point, button: MouseButton) -> bool {
        let target = ClickTarget {
            point,
            button,
            repeat: 1,
        };
        let delay = self.clicker.timing().repeat_delay;
        self.clicker.click_at(target, delay)
    }

    fn save_missed_capture(&self, template: &TemplateId, capture: &Capture) {
        let Some(dir) = &self.missed_capture_dir else {
            return;
        };
        if capture.is_empty() {
            return;
        }
        let name: String = template
            .to_string()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
        let path = dir.join(format!("miss_{}_{}.png", name, timestamp));
        let save = || -> anyhow::Result<()> {
            std::fs::create_dir_all(dir)?;
            capture.pixels.save(&path)?;
            Ok(())
        };
        match save() {
            Ok(()) => tracing::debug!("Saved missed capture to {}", path.display()),
            Err(e) => tracing::warn!("Failed to save missed capture {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecognitionError, RecognitionResult};
    use crate::input::testing::{instant, RecordingMouse};
    use image::{Rgba, RgbaImage};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    struct FakeScreen {
        capture: Option<Capture>,
        calls: usize,
    }

    impl ScreenSource for FakeScreen {
        fn capture(&mut self, _target: CaptureTarget) -> RecognitionResult<Capture> {
            self.calls += 1;
            self.capture
                .clone()
                .ok_or_else(|| RecognitionError::capture("BitBlt", "induced"))
        }
    }

    /// A 100x80 white screen at `origin` with a 4x4 red block at (30, 20).
    fn screen_with_red_block(origin: Point) -> FakeScreen {
        let mut pixels = RgbaImage::from_pixel(100, 80, WHITE);
        for y in 20..24 {
            for x in 30..34 {
                pixels.put_pixel(x, y, RED);
            }
        }
        FakeScreen {
            capture: Some(Capture::new(pixels, origin)),
            calls: 0,
        }
    }

    fn template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("1")).unwrap();
        RgbaImage::from_pixel(4, 4, RED)
            .save(dir.path().join("1").join("red.png"))
            .unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))
            .save(dir.path().join("1").join("blue.png"))
            .unwrap();
        dir
    }

    fn recognizer<'m>(
        screen: FakeScreen,
        mouse: &'m mut RecordingMouse,
        dir: &tempfile::TempDir,
    ) -> Recognizer<FakeScreen, &'m mut RecordingMouse> {
        Recognizer::new(
            screen,
            ClickDispatcher::new(mouse, instant()),
            TemplateStore::new(dir.path()),
        )
    }

    #[test]
    fn test_found_template_is_clicked_in_screen_coordinates() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::new(200, 100)), &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"));
        let outcome = r.recognize_and_click(&request, None);
        assert_eq!(outcome, RecognizeOutcome::Clicked(Point::new(232, 122)));
        assert_eq!(mouse.clicks(), vec![(Point::new(232, 122), MouseButton::Left)]);
    }

    #[test]
    fn test_confirm_click_clicks_twice() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"))
            .with_confirm_click(Duration::from_millis(1));
        assert!(r.recognize_and_click(&request, None).is_success());
        assert_eq!(mouse.clicks().len(), 2);
    }

    #[test]
    fn test_missing_template_uses_fallback() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::new(10, 10)), &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("blue", "1"))
            .with_fallback(Fallback::bottom_left(15, 25));
        let outcome = r.recognize_and_click(&request, None);

        // 80 px tall capture at (10, 10): (10 + 15, 10 + 80 - 25)
        assert_eq!(outcome, RecognizeOutcome::FallbackClicked(Point::new(25, 65)));
        assert!(outcome.is_success());
        assert_eq!(mouse.clicks(), vec![(Point::new(25, 65), MouseButton::Left)]);
    }

    #[test]
    fn test_not_found_without_fallback_does_not_click() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);

        assert!(!r.recognize_and_click_named("blue", "1", None));
        assert!(mouse.events.is_empty());
    }

    #[test]
    fn test_unloadable_template_degrades_to_fallback() {
        let dir = template_dir();
        std::fs::write(dir.path().join("1").join("broken.png"), b"garbage").unwrap();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);

        assert!(r.recognize_and_click_named("absent", "1", Some((5, 5))));
        assert!(r.recognize_and_click_named("broken", "1", Some((5, 5))));
        assert_eq!(mouse.clicks().len(), 2);
        assert!(mouse.clicks().iter().all(|(p, _)| *p == Point::new(5, 75)));
    }

    #[test]
    fn test_capture_failure_is_reported() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let screen = FakeScreen {
            capture: None,
            calls: 0,
        };
        let mut r = recognizer(screen, &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"))
            .with_fallback(Fallback::bottom_left(1, 1));
        assert_eq!(r.recognize_and_click(&request, None), RecognizeOutcome::CaptureFailed);
        assert_eq!(r.screen.calls, 1);
        assert!(mouse.events.is_empty());
    }

    #[test]
    fn test_click_failure_keeps_recognized_point() {
        let dir = template_dir();
        let mut mouse = RecordingMouse {
            fail_after: Some(0),
            ..Default::default()
        };
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"));
        let outcome = r.recognize_and_click(&request, None);
        assert_eq!(outcome, RecognizeOutcome::ClickFailed(Point::new(32, 22)));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_missed_capture_is_saved() {
        let dir = template_dir();
        let out = tempfile::tempdir().unwrap();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir)
            .save_missed_captures_to(out.path().join("captures"));

        assert!(!r.recognize_and_click_named("blue", "1", None));
        let saved: Vec<_> = std::fs::read_dir(out.path().join("captures"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with("miss_1_blue_"));
    }

    #[test]
    fn test_cancelled_scan_skips_fallback() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);
        let cancel = AtomicBool::new(true);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"))
            .with_fallback(Fallback::bottom_left(1, 1));
        assert_eq!(
            r.recognize_and_click(&request, Some(&cancel)),
            RecognizeOutcome::Cancelled
        );
        assert!(mouse.events.is_empty());
    }

    #[test]
    fn test_empty_capture_skips_fallback() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        // A minimized window reports a 0x0 client area parked at (-32000, -32000).
        let screen = FakeScreen {
            capture: Some(Capture::new(RgbaImage::new(0, 0), Point::new(-32000, -32000))),
            calls: 0,
        };
        let mut r = recognizer(screen, &mut mouse, &dir);

        let request = RecognizeRequest::new(TemplateId::new("red", "1"))
            .with_fallback(Fallback::bottom_left(80, 120));
        assert_eq!(r.recognize_and_click(&request, None), RecognizeOutcome::CaptureFailed);
        assert!(r.locate(&request, None).is_none());
        drop(r);
        assert!(mouse.events.is_empty());
    }

    #[test]
    fn test_fallback_follows_scan_result_not_flag() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        let mut r = recognizer(screen_with_red_block(Point::default()), &mut mouse, &dir);
        // No scan runs for a missing template, so a raised flag cannot have cut it short.
        let cancel = AtomicBool::new(true);

        let request = RecognizeRequest::new(TemplateId::new("absent", "1"))
            .with_fallback(Fallback::bottom_left(5, 5));
        assert_eq!(
            r.recognize_and_click(&request, Some(&cancel)),
            RecognizeOutcome::FallbackClicked(Point::new(5, 75))
        );
    }

    #[test]
    fn test_request_threshold_drives_matching() {
        let dir = template_dir();
        let mut mouse = RecordingMouse::default();
        // Half of a 4x4 red block: scores 0.5 at best.
        let mut pixels = RgbaImage::from_pixel(40, 40, WHITE);
        for y in 10..12 {
            for x in 10..14 {
                pixels.put_pixel(x, y, RED);
            }
        }
        let screen = FakeScreen {
            capture: Some(Capture::new(pixels, Point::default())),
            calls: 0,
        };
        let mut r = recognizer(screen, &mut mouse, &dir);
        let strict = RecognizeRequest::new(TemplateId::new("red", "1"));
        let loose = strict.clone().with_threshold(Threshold::new(0.5).unwrap());

        let located = r.locate(&strict, None).unwrap();
        assert_eq!(located.result, MatchResult::NotFound);
        assert!(!located.stats.cancelled);
        assert!(r.locate(&loose, None).unwrap().result.point().is_some());
    }

    #[test]
    fn test_fallback_corners() {
        let f = |corner| Fallback {
            corner,
            offset_x: 10,
            offset_y: 20,
        };
        assert_eq!(f(Corner::TopLeft).point_in(300, 200), Point::new(10, 20));
        assert_eq!(f(Corner::TopRight).point_in(300, 200), Point::new(290, 20));
        assert_eq!(f(Corner::BottomLeft).point_in(300, 200), Point::new(10, 180));
        assert_eq!(f(Corner::BottomRight).point_in(300, 200), Point::new(290, 180));
    }
}
