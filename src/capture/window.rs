//! Window discovery for the emulator window hosting the game.

use anyhow::{anyhow, Result};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, TRUE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, SetForegroundWindow, ShowWindow, SW_RESTORE,
};

use super::WindowHandle;

struct Candidate {
    hwnd: HWND,
    title: String,
    process_name: Option<String>,
}

/// Finds the game window.
///
/// A window whose process executable is `process_name` and whose title
/// contains `title_keyword` is preferred; failing that, the first window
/// whose title contains the keyword is used.
pub fn find_game_window(process_name: &str, title_keyword: &str) -> Result<WindowHandle> {
    tracing::info!(
        "Searching for game window (process \"{}\", title \"{}\")...",
        process_name,
        title_keyword
    );

    let candidates = visible_titled_windows();
    let keyword = title_keyword.to_lowercase();
    let titled: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.title.to_lowercase().contains(&keyword))
        .collect();

    let found = titled
        .iter()
        .find(|c| {
            c.process_name
                .as_deref()
                .is_some_and(|name| process_name_matches(name, process_name))
        })
        .or_else(|| titled.first())
        .ok_or_else(|| {
            anyhow!(
                "Could not find a window titled \"{}\". Is the game running?",
                title_keyword
            )
        })?;

    tracing::info!(
        "Found window \"{}\" ({})",
        found.title,
        found.process_name.as_deref().unwrap_or("unknown process")
    );
    Ok(WindowHandle(found.hwnd.0 as isize))
}

/// Case-insensitive executable name comparison; the `.exe` suffix is optional.
fn process_name_matches(actual: &str, expected: &str) -> bool {
    let strip = |s: &str| {
        let lower = s.to_lowercase();
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    };
    strip(actual) == strip(expected)
}

fn visible_titled_windows() -> Vec<Candidate> {
    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let out = &mut *(lparam.0 as *mut Vec<Candidate>);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }

            let title_len = GetWindowTextLengthW(hwnd);
            if title_len <= 0 {
                return TRUE;
            }
            let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
            let copied = GetWindowTextW(hwnd, &mut title_buf);
            let title = OsString::from_wide(&title_buf[..copied.max(0) as usize])
                .to_string_lossy()
                .to_string();
            if title.is_empty() {
                return TRUE;
            }

            out.push(Candidate {
                hwnd,
                process_name: process_name_of(hwnd),
                title,
            });
            TRUE
        }
    }

    let mut windows: Vec<Candidate> = Vec::new();
    unsafe {
        // EnumWindows reports FALSE if the callback stops early; ours never does.
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut windows as *mut _ as isize));
    }
    tracing::debug!("Enumerated {} visible titled windows", windows.len());
    windows
}

/// Executable file name of the process owning `hwnd`.
unsafe fn process_name_of(hwnd: HWND) -> Option<String> {
    unsafe {
        let mut process_id: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
        if process_id == 0 {
            return None;
        }

        let process_handle =
            OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
        let mut name_buf: Vec<u16> = vec![0; 1024];
        let mut len = name_buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(process_handle);
        if result.is_err() || len == 0 {
            return None;
        }

        let full_path = OsString::from_wide(&name_buf[..len as usize])
            .to_string_lossy()
            .to_string();
        Some(
            full_path
                .rsplit('\\')
                .next()
                .unwrap_or(&full_path)
                .to_string(),
        )
    }
}

/// Checks whether any process with executable `process_name` is running.
pub fn is_process_running(process_name: &str) -> bool {
    let snapshot = match unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) } {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Failed to snapshot processes: {}", e);
            return false;
        }
    };

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut found = false;
    unsafe {
        let mut next = Process32FirstW(snapshot, &mut entry);
        while next.is_ok() {
            let len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let exe = OsString::from_wide(&entry.szExeFile[..len]);
            if process_name_matches(&exe.to_string_lossy(), process_name) {
                found = true;
                break;
            }
            next = Process32NextW(snapshot, &mut entry);
        }
        let _ = CloseHandle(snapshot);
    }
    found
}

/// Restores the window if minimized and brings it to the foreground.
pub fn activate_window(handle: WindowHandle) -> Result<()> {
    let hwnd = HWND(handle.0 as *mut std::ffi::c_void);
    unsafe {
        if IsIconic(hwnd).as_bool() {
            let _ = ShowWindow(hwnd, SW_RESTORE);
        }
        if !SetForegroundWindow(hwnd).as_bool() {
            return Err(anyhow!("SetForegroundWindow failed for {:?}", handle));
        }
    }
    Ok(())
}

/// Checks whether the handle still refers to an existing window.
pub fn is_window_valid(handle: WindowHandle) -> bool {
    unsafe { IsWindow(HWND(handle.0 as *mut std::ffi::c_void)).as_bool() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_matching() {
        assert!(process_name_matches("crosvm.exe", "crosvm"));
        assert!(process_name_matches("CrosVM.EXE", "crosvm.exe"));
        assert!(!process_name_matches("crosvm-helper.exe", "crosvm"));
    }
}
