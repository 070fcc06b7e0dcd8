//! Clash of Clans launcher helper.
//!
//! Finds the game window hosted by the Google Play Games emulator, locates
//! UI elements on screen by template matching and clicks them.
//!
//! The recognition core is platform-neutral. Screen capture, window discovery
//! and input injection have Windows back ends behind `#[cfg(windows)]`.

pub mod automation;
pub mod capture;
pub mod error;
pub mod input;
pub mod logging;
pub mod paths;
pub mod recognition;

pub use error::{RecognitionError, RecognitionResult};

/// A pixel position, either in screen coordinates or inside a captured buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
