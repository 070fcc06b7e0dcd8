//! Screen capture for template recognition.
//!
//! This module provides:
//! - The `ScreenSource` seam used by the recognizer
//! - GDI capture of the virtual screen or a window's client area (Windows)
//! - Game window discovery (Windows)

pub mod guard;
#[cfg(windows)]
pub mod screenshot;
#[cfg(windows)]
pub mod window;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionResult;
use crate::Point;

pub use guard::outstanding_handles;
#[cfg(windows)]
pub use screenshot::GdiScreen;
#[cfg(windows)]
pub use window::{activate_window, find_game_window, is_process_running, is_window_valid};

/// Raw native window handle value. Plain integer so it can cross threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// What to capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The whole virtual screen.
    FullScreen,
    /// The client area of a window.
    WindowClient(WindowHandle),
}

/// Which area a recognition target should be searched in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureArea {
    #[default]
    FullScreen,
    GameWindow,
}

/// A snapshot of screen pixels and where they sit on the screen.
#[derive(Clone, Debug)]
pub struct Capture {
    pub pixels: RgbaImage,
    /// Screen coordinate of the buffer's top-left pixel.
    pub origin: Point,
}

impl Capture {
    pub fn new(pixels: RgbaImage, origin: Point) -> Self {
        Self { pixels, origin }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Converts a buffer coordinate into a screen coordinate.
    pub fn to_screen(&self, point: Point) -> Point {
        point.offset(self.origin.x, self.origin.y)
    }
}

/// Produces screen snapshots.
pub trait ScreenSource {
    fn capture(&mut self, target: CaptureTarget) -> RecognitionResult<Capture>;
}
