//! Mouse input for UI automation.
//!
//! This module provides:
//! - The `MouseDriver` seam over the platform's input injection
//! - `ClickDispatcher`, which turns click targets into timed press/release
//!   sequences
//! - `TextTyper`, which types text through a `KeyboardDriver`
//! - `SendInput` back ends (Windows)

pub mod keyboard;
#[cfg(windows)]
pub mod sendinput;

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RecognitionResult;
use crate::Point;

pub use keyboard::{KeyboardDriver, TextTyper, TypingTiming};
#[cfg(windows)]
pub use sendinput::{primary_screen_center, SendInputKeyboard, SendInputMouse};

/// Time a button is held between press and release.
pub const DEFAULT_HOLD: Duration = Duration::from_millis(20);

/// Pause between consecutive clicks of a multi-click.
pub const DEFAULT_REPEAT_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Where and how to click. Consumed immediately by [`ClickDispatcher::click_at`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickTarget {
    pub point: Point,
    pub button: MouseButton,
    pub repeat: u32,
}

impl ClickTarget {
    pub fn left(point: Point) -> Self {
        Self {
            point,
            button: MouseButton::Left,
            repeat: 1,
        }
    }

    pub fn repeated(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Raw pointer and button events.
pub trait MouseDriver {
    /// Moves the pointer to a screen coordinate.
    fn move_to(&mut self, point: Point) -> RecognitionResult<()>;
    fn button_down(&mut self, button: MouseButton) -> RecognitionResult<()>;
    fn button_up(&mut self, button: MouseButton) -> RecognitionResult<()>;
}

impl<M: MouseDriver + ?Sized> MouseDriver for &mut M {
    fn move_to(&mut self, point: Point) -> RecognitionResult<()> {
        (**self).move_to(point)
    }

    fn button_down(&mut self, button: MouseButton) -> RecognitionResult<()> {
        (**self).button_down(button)
    }

    fn button_up(&mut self, button: MouseButton) -> RecognitionResult<()> {
        (**self).button_up(button)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickTiming {
    pub hold: Duration,
    pub repeat_delay: Duration,
}

impl Default for ClickTiming {
    fn default() -> Self {
        Self {
            hold: DEFAULT_HOLD,
            repeat_delay: DEFAULT_REPEAT_DELAY,
        }
    }
}

/// Composes pointer moves and button presses into clicks.
///
/// Injection failures are logged and reported as `false`; they never abort
/// the caller.
pub struct ClickDispatcher<M: MouseDriver> {
    mouse: M,
    timing: ClickTiming,
}

impl<M: MouseDriver> ClickDispatcher<M> {
    pub fn new(mouse: M, timing: ClickTiming) -> Self {
        Self { mouse, timing }
    }

    pub fn timing(&self) -> ClickTiming {
        self.timing
    }

    pub fn move_to(&mut self, point: Point) -> bool {
        match self.mouse.move_to(point) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to move pointer to {}: {}", point, e);
                false
            }
        }
    }

    /// Presses and releases `button` at the current pointer position.
    pub fn click(&mut self, button: MouseButton) -> bool {
        if let Err(e) = self.mouse.button_down(button) {
            tracing::warn!("Failed to press {:?} button: {}", button, e);
            return false;
        }
        thread::sleep(self.timing.hold);
        if let Err(e) = self.mouse.button_up(button) {
            tracing::warn!("Failed to release {:?} button: {}", button, e);
            return false;
        }
        true
    }

    /// Moves to `target.point` and clicks `target.repeat` times, waiting
    /// `inter_click_delay` between clicks.
    pub fn click_at(&mut self, target: ClickTarget, inter_click_delay: Duration) -> bool {
        tracing::debug!(
            "Clicking {:?} x{} at {}",
            target.button,
            target.repeat,
            target.point
        );
        if !self.move_to(target.point) {
            return false;
        }
        for i in 0..target.repeat {
            if i > 0 {
                thread::sleep(inter_click_delay);
            }
            if !self.click(target.button) {
                tracing::warn!("Click {}/{} at {} failed", i + 1, target.repeat, target.point);
                return false;
            }
        }
        true
    }

    /// Left click at `point` with the configured timing.
    pub fn left_click_at(&mut self, point: Point) -> bool {
        self.click_at(ClickTarget::left(point), self.timing.repeat_delay)
    }

    pub fn double_click_at(&mut self, point: Point) -> bool {
        self.click_at(ClickTarget::left(point).repeated(2), self.timing.repeat_delay)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::RecognitionError;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum MouseEvent {
        Move(Point),
        Down(MouseButton),
        Up(MouseButton),
    }

    /// Records events; optionally fails from the n-th event on.
    #[derive(Debug, Default)]
    pub struct RecordingMouse {
        pub events: Vec<MouseEvent>,
        pub fail_after: Option<usize>,
    }

    impl RecordingMouse {
        fn record(&mut self, event: MouseEvent) -> RecognitionResult<()> {
            if self.fail_after.is_some_and(|n| self.events.len() >= n) {
                return Err(RecognitionError::InputFailed("injected".to_string()));
            }
            self.events.push(event);
            Ok(())
        }

        pub fn clicks(&self) -> Vec<(Point, MouseButton)> {
            let mut position = None;
            let mut clicks = Vec::new();
            for event in &self.events {
                match event {
                    MouseEvent::Move(p) => position = Some(*p),
                    MouseEvent::Up(b) => clicks.push((position.unwrap_or_default(), *b)),
                    MouseEvent::Down(_) => {}
                }
            }
            clicks
        }
    }

    impl MouseDriver for RecordingMouse {
        fn move_to(&mut self, point: Point) -> RecognitionResult<()> {
            self.record(MouseEvent::Move(point))
        }

        fn button_down(&mut self, button: MouseButton) -> RecognitionResult<()> {
            self.record(MouseEvent::Down(button))
        }

        fn button_up(&mut self, button: MouseButton) -> RecognitionResult<()> {
            self.record(MouseEvent::Up(button))
        }
    }

    pub fn instant() -> ClickTiming {
        ClickTiming {
            hold: Duration::ZERO,
            repeat_delay: Duration::ZERO,
        }
    }
}
