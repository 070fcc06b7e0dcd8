//! Text entry through synthesized key presses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::RecognitionResult;

/// Time a key is held between press and release.
pub const DEFAULT_KEY_HOLD: Duration = Duration::from_millis(50);

/// Pause between consecutive characters.
pub const DEFAULT_CHAR_DELAY: Duration = Duration::from_millis(30);

/// Presses and releases keys producing single characters.
pub trait KeyboardDriver {
    fn key_down(&mut self, ch: char) -> RecognitionResult<()>;
    fn key_up(&mut self, ch: char) -> RecognitionResult<()>;
}

impl<K: KeyboardDriver + ?Sized> KeyboardDriver for &mut K {
    fn key_down(&mut self, ch: char) -> RecognitionResult<()> {
        (**self).key_down(ch)
    }

    fn key_up(&mut self, ch: char) -> RecognitionResult<()> {
        (**self).key_up(ch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypingTiming {
    pub hold: Duration,
    pub char_delay: Duration,
}

impl Default for TypingTiming {
    fn default() -> Self {
        Self {
            hold: DEFAULT_KEY_HOLD,
            char_delay: DEFAULT_CHAR_DELAY,
        }
    }
}

/// Types strings one character at a time into the foreground window.
pub struct TextTyper<K: KeyboardDriver> {
    keyboard: K,
    timing: TypingTiming,
}

impl<K: KeyboardDriver> TextTyper<K> {
    pub fn new(keyboard: K, timing: TypingTiming) -> Self {
        Self { keyboard, timing }
    }

    /// Types `text` and returns how many characters were sent.
    ///
    /// Stops early when `cancel` is set or a key event cannot be injected;
    /// the failure is logged, not raised.
    pub fn type_text(&mut self, text: &str, cancel: &AtomicBool) -> usize {
        tracing::debug!("Typing {} characters", text.chars().count());
        let mut typed = 0;
        for ch in text.chars() {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!("Typing cancelled after {} characters", typed);
                break;
            }
            if typed > 0 {
                thread::sleep(self.timing.char_delay);
            }
            if let Err(e) = self.press(ch) {
                tracing::warn!("Failed to type {:?}: {}", ch, e);
                break;
            }
            typed += 1;
        }
        typed
    }

    fn press(&mut self, ch: char) -> RecognitionResult<()> {
        self.keyboard.key_down(ch)?;
        thread::sleep(self.timing.hold);
        self.keyboard.key_up(ch)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{instant, KeyEvent, RecordingKeyboard};
    use super::*;

    #[test]
    fn test_each_char_pressed_then_released() {
        let mut keyboard = RecordingKeyboard::default();
        let mut typer = TextTyper::new(&mut keyboard, instant());
        let typed = typer.type_text("12a", &AtomicBool::new(false));

        assert_eq!(typed, 3);
        assert_eq!(
            keyboard.events,
            vec![
                KeyEvent::Down('1'),
                KeyEvent::Up('1'),
                KeyEvent::Down('2'),
                KeyEvent::Up('2'),
                KeyEvent::Down('a'),
                KeyEvent::Up('a'),
            ]
        );
    }

    #[test]
    fn test_non_ascii_text_is_kept() {
        let mut keyboard = RecordingKeyboard::default();
        let text = "部落 Ok";
        let mut typer = TextTyper::new(&mut keyboard, instant());
        let typed = typer.type_text(text, &AtomicBool::new(false));

        assert_eq!(typed, 5);
        assert_eq!(keyboard.typed(), text);
    }

    #[test]
    fn test_cancel_stops_typing() {
        let mut keyboard = RecordingKeyboard::default();
        let mut typer = TextTyper::new(&mut keyboard, instant());
        let typed = typer.type_text("123", &AtomicBool::new(true));

        assert_eq!(typed, 0);
        assert!(keyboard.events.is_empty());
    }

    #[test]
    fn test_injection_failure_stops_typing() {
        let mut keyboard = RecordingKeyboard {
            fail_after: Some(3),
            ..Default::default()
        };
        let mut typer = TextTyper::new(&mut keyboard, instant());
        let typed = typer.type_text("123", &AtomicBool::new(false));

        // '1' completed, '2' pressed but its release was rejected.
        assert_eq!(typed, 1);
        assert_eq!(keyboard.typed(), "1");
    }
}
