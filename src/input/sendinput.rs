//! `SendInput`-based mouse and keyboard drivers.
//!
//! SendInput simulates hardware-level input, which the emulator's input layer
//! accepts; window messages (PostMessage/SendMessage) are ignored by it. It
//! moves the real cursor, and the target window must be in the foreground.

use windows::Win32::Foundation::GetLastError;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE,
    MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_VIRTUALDESK, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXSCREEN, SM_CXVIRTUALSCREEN, SM_CYSCREEN, SM_CYVIRTUALSCREEN,
    SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};

use super::{KeyboardDriver, MouseButton, MouseDriver};
use crate::error::{RecognitionError, RecognitionResult};
use crate::Point;

/// Mouse driver injecting events with `SendInput`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SendInputMouse {
    /// Last position moved to, repeated on button events so they land there
    /// even if the user nudged the cursor.
    position: Option<(i32, i32)>,
}

impl SendInputMouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, flags: MOUSE_EVENT_FLAGS, dx: i32, dy: i32) -> RecognitionResult<()> {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        };
        send_inputs(&[input])
    }

    fn button_event(&self, flags: MOUSE_EVENT_FLAGS) -> RecognitionResult<()> {
        match self.position {
            Some((nx, ny)) => self.send(
                flags | MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_VIRTUALDESK,
                nx,
                ny,
            ),
            None => self.send(flags, 0, 0),
        }
    }
}

fn send_inputs(inputs: &[INPUT]) -> RecognitionResult<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        let err = unsafe { GetLastError() };
        Err(RecognitionError::InputFailed(format!(
            "SendInput sent {} of {} events ({:?})",
            sent,
            inputs.len(),
            err
        )))
    }
}

/// Maps a screen coordinate to the 0..=65535 range used by absolute input
/// over the virtual desktop.
fn normalize(point: Point) -> (i32, i32) {
    let (vx, vy, vw, vh) = unsafe {
        (
            GetSystemMetrics(SM_XVIRTUALSCREEN),
            GetSystemMetrics(SM_YVIRTUALSCREEN),
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    };
    let scale = |v: i32, origin: i32, size: i32| -> i32 {
        let span = (size - 1).max(1) as i64;
        (((v - origin) as i64 * 65535) / span) as i32
    };
    (scale(point.x, vx, vw), scale(point.y, vy, vh))
}

impl MouseDriver for SendInputMouse {
    fn move_to(&mut self, point: Point) -> RecognitionResult<()> {
        let (nx, ny) = normalize(point);
        self.send(
            MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_VIRTUALDESK,
            nx,
            ny,
        )?;
        self.position = Some((nx, ny));
        Ok(())
    }

    fn button_down(&mut self, button: MouseButton) -> RecognitionResult<()> {
        self.button_event(match button {
            MouseButton::Left => MOUSEEVENTF_LEFTDOWN,
            MouseButton::Right => MOUSEEVENTF_RIGHTDOWN,
            MouseButton::Middle => MOUSEEVENTF_MIDDLEDOWN,
        })
    }

    fn button_up(&mut self, button: MouseButton) -> RecognitionResult<()> {
        self.button_event(match button {
            MouseButton::Left => MOUSEEVENTF_LEFTUP,
            MouseButton::Right => MOUSEEVENTF_RIGHTUP,
            MouseButton::Middle => MOUSEEVENTF_MIDDLEUP,
        })
    }
}

/// Keyboard driver sending characters as Unicode key events.
///
/// `KEYEVENTF_UNICODE` types the character itself, independent of the active
/// keyboard layout. Characters outside the BMP are sent as surrogate pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SendInputKeyboard;

impl SendInputKeyboard {
    pub fn new() -> Self {
        Self
    }

    fn send_char(&self, ch: char, flags: KEYBD_EVENT_FLAGS) -> RecognitionResult<()> {
        let mut units = [0u16; 2];
        let inputs: Vec<INPUT> = ch
            .encode_utf16(&mut units)
            .iter()
            .map(|&unit| INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(0),
                        wScan: unit,
                        dwFlags: KEYEVENTF_UNICODE | flags,
                        ..Default::default()
                    },
                },
            })
            .collect();
        send_inputs(&inputs)
    }
}

impl KeyboardDriver for SendInputKeyboard {
    fn key_down(&mut self, ch: char) -> RecognitionResult<()> {
        self.send_char(ch, KEYBD_EVENT_FLAGS(0))
    }

    fn key_up(&mut self, ch: char) -> RecognitionResult<()> {
        self.send_char(ch, KEYEVENTF_KEYUP)
    }
}

/// Center of the primary monitor in screen coordinates.
pub fn primary_screen_center() -> Point {
    let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
    Point::new(w / 2, h / 2)
}
