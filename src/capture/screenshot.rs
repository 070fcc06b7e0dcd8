//! Screenshot capture using GDI.
//!
//! The client area of a window is copied from the screen DC at the client's
//! screen rectangle rather than from the window DC: the emulator renders
//! with the GPU and its window DC reads back black. The window therefore has
//! to be visible, which the automation ensures by activating it first.

use image::{ImageBuffer, Rgba, RgbaImage};

use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    GetDC, GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, RGBQUAD, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetClientRect, GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
    SM_YVIRTUALSCREEN,
};

use super::guard::HandleGuard;
use super::{Capture, CaptureTarget, ScreenSource, WindowHandle};
use crate::error::{RecognitionError, RecognitionResult};
use crate::Point;

/// `ScreenSource` backed by GDI `BitBlt`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GdiScreen;

impl ScreenSource for GdiScreen {
    fn capture(&mut self, target: CaptureTarget) -> RecognitionResult<Capture> {
        match target {
            CaptureTarget::FullScreen => capture_full_screen(),
            CaptureTarget::WindowClient(handle) => capture_window_client_area(handle),
        }
    }
}

/// Captures the whole virtual screen (all monitors).
pub fn capture_full_screen() -> RecognitionResult<Capture> {
    let (x, y, width, height) = unsafe {
        (
            GetSystemMetrics(SM_XVIRTUALSCREEN),
            GetSystemMetrics(SM_YVIRTUALSCREEN),
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    };
    capture_screen_rect(Point::new(x, y), width, height)
}

/// Captures the client area of `handle` as currently shown on screen.
pub fn capture_window_client_area(handle: WindowHandle) -> RecognitionResult<Capture> {
    let hwnd = HWND(handle.0 as *mut std::ffi::c_void);

    let mut client_rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client_rect) }
        .map_err(|e| RecognitionError::capture("GetClientRect", e))?;

    let mut origin = POINT { x: 0, y: 0 };
    if !unsafe { ClientToScreen(hwnd, &mut origin) }.as_bool() {
        return Err(RecognitionError::capture("ClientToScreen", "call failed"));
    }

    capture_screen_rect(
        Point::new(origin.x, origin.y),
        client_rect.right - client_rect.left,
        client_rect.bottom - client_rect.top,
    )
}

/// Copies a screen rectangle into a new RGBA buffer.
///
/// Every GDI object acquired here is owned by a guard, so each exit path
/// releases what was acquired so far.
fn capture_screen_rect(origin: Point, width: i32, height: i32) -> RecognitionResult<Capture> {
    if width <= 0 || height <= 0 {
        tracing::debug!("Empty capture rectangle {}x{}", width, height);
        return Ok(Capture::new(RgbaImage::new(0, 0), origin));
    }

    let screen_dc = unsafe { GetDC(HWND::default()) };
    if screen_dc.is_invalid() {
        return Err(RecognitionError::capture("GetDC", "null device context"));
    }
    let screen_dc = HandleGuard::new("screen dc", screen_dc, |dc: HDC| unsafe {
        ReleaseDC(HWND::default(), dc);
    });

    let mem_dc = unsafe { CreateCompatibleDC(screen_dc.get()) };
    if mem_dc.is_invalid() {
        return Err(RecognitionError::capture(
            "CreateCompatibleDC",
            "null device context",
        ));
    }
    let mem_dc = HandleGuard::new("memory dc", mem_dc, |dc: HDC| unsafe {
        let _ = DeleteDC(dc);
    });

    let bitmap = unsafe { CreateCompatibleBitmap(screen_dc.get(), width, height) };
    if bitmap.is_invalid() {
        return Err(RecognitionError::capture(
            "CreateCompatibleBitmap",
            format!("{}x{}", width, height),
        ));
    }
    let bitmap = HandleGuard::new("bitmap", bitmap, |bmp: HBITMAP| unsafe {
        let _ = DeleteObject(bmp);
    });

    let previous = unsafe { SelectObject(mem_dc.get(), bitmap.get()) };
    if previous.is_invalid() {
        return Err(RecognitionError::capture("SelectObject", "selection failed"));
    }
    let memory = mem_dc.get();
    let selection = HandleGuard::new("selection", previous, move |old: HGDIOBJ| unsafe {
        SelectObject(memory, old);
    });

    unsafe {
        BitBlt(
            mem_dc.get(),
            0,
            0,
            width,
            height,
            screen_dc.get(),
            origin.x,
            origin.y,
            SRCCOPY,
        )
    }
    .map_err(|e| RecognitionError::capture("BitBlt", e))?;

    // GetDIBits requires the bitmap to be deselected.
    drop(selection);

    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Negative height gives a top-down bitmap.
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        bmiColors: [RGBQUAD::default(); 1],
    };
    let mut bgra = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            screen_dc.get(),
            bitmap.get(),
            0,
            height as u32,
            Some(bgra.as_mut_ptr() as *mut std::ffi::c_void),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines != height {
        return Err(RecognitionError::capture(
            "GetDIBits",
            format!("copied {} of {} lines", lines, height),
        ));
    }

    tracing::debug!("Captured {}x{} at {}", width, height, origin);
    Ok(Capture::new(bgra_to_rgba(bgra, width as u32, height as u32)?, origin))
}

/// BGRA -> RGBA. GDI leaves alpha undefined, so it is forced opaque.
fn bgra_to_rgba(mut data: Vec<u8>, width: u32, height: u32) -> RecognitionResult<RgbaImage> {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
        px[3] = 255;
    }
    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, data)
        .ok_or_else(|| RecognitionError::capture("GetDIBits", "buffer size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::guard::{outstanding_handles, COUNTER_TEST_LOCK};

    #[test]
    fn test_bgra_conversion() {
        let img = bgra_to_rgba(vec![1, 2, 3, 0, 10, 20, 30, 7], 2, 1).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgba([3, 2, 1, 255]));
        assert_eq!(*img.get_pixel(1, 0), Rgba([30, 20, 10, 255]));
    }

    #[test]
    fn test_repeated_captures_release_all_handles() {
        let _lock = COUNTER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = outstanding_handles();
        for _ in 0..20 {
            let _ = capture_full_screen();
            // A destroyed window makes GetClientRect fail.
            let _ = capture_window_client_area(WindowHandle(0x7fff_fff0));
        }
        assert_eq!(outstanding_handles(), before);
    }
}
