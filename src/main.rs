//! Clash of Clans launcher helper.
//!
//! A Windows hotkey application that recognizes UI elements of the game
//! running in the Google Play Games emulator and clicks them.

// Hide console window in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

#[cfg(windows)]
mod host {
    use anyhow::{anyhow, Result};
    use std::sync::atomic::AtomicBool;
    use std::sync::OnceLock;
    use std::thread;
    use std::time::Duration;

    use windows::core::w;
    use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
        PostQuitMessage, RegisterClassW, TranslateMessage, HWND_MESSAGE, MSG, WINDOW_EX_STYLE,
        WINDOW_STYLE, WM_DESTROY, WM_HOTKEY, WNDCLASSW,
    };

    use coc_launcher::automation::{
        ensure_game_window, run_targets, AppConfig, ClickTest, DesktopGameHost, LaunchOptions,
        Recognizer, Runner,
    };
    use coc_launcher::capture::{activate_window, is_window_valid, GdiScreen, WindowHandle};
    use coc_launcher::input::{
        primary_screen_center, ClickDispatcher, SendInputKeyboard, SendInputMouse, TextTyper,
    };
    use coc_launcher::recognition::TemplateStore;
    use coc_launcher::{logging, paths};

    const HOTKEY_RUN: i32 = 1;
    const HOTKEY_CLICK_TEST: i32 = 2;
    const HOTKEY_ABORT: i32 = 3;
    const HOTKEY_EXIT: i32 = 4;
    const HOTKEY_TYPE_TEXT: i32 = 5;

    /// (id, virtual key, description)
    const HOTKEYS: [(i32, u32, &str); 5] = [
        (HOTKEY_RUN, 0x52, "Ctrl+Shift+R (recognize and click targets)"),
        (HOTKEY_CLICK_TEST, 0x54, "Ctrl+Shift+T (click test at screen center - MOVES CURSOR)"),
        (HOTKEY_TYPE_TEXT, 0x4B, "Ctrl+Shift+K (type configured text into the game)"),
        (HOTKEY_ABORT, 0x51, "Ctrl+Shift+Q (abort)"),
        (HOTKEY_EXIT, 0x58, "Ctrl+Shift+X (exit)"),
    ];

    struct App {
        config: AppConfig,
        runner: Runner,
    }

    static APP: OnceLock<App> = OnceLock::new();

    pub fn run() -> Result<()> {
        logging::install_panic_hook();
        paths::ensure_directories()?;
        logging::init(&paths::get_logs_dir());

        let config = AppConfig::load_or_default(&paths::get_config_path());
        tracing::info!(
            "Templates: {}",
            paths::get_resource_root(&config.recognition.resource_dir).display()
        );
        tracing::info!("{} target(s) configured", config.recognition.targets.len());

        let app = App {
            config,
            runner: Runner::new(),
        };
        if APP.set(app).is_err() {
            return Err(anyhow!("Application state already initialized"));
        }

        let hwnd = create_message_window()?;
        for (id, vk, _) in HOTKEYS {
            unsafe { RegisterHotKey(hwnd, id, MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT, vk)? };
        }

        tracing::info!("CoC launcher started");
        for (_, _, description) in HOTKEYS {
            tracing::info!("Hotkey: {}", description);
        }

        // Message loop
        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            for (id, _, _) in HOTKEYS {
                let _ = UnregisterHotKey(hwnd, id);
            }
            let _ = DestroyWindow(hwnd);
        }

        tracing::info!("Exiting");
        Ok(())
    }

    fn create_message_window() -> Result<HWND> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;
            let class_name = w!("CocLauncherHotkeyClass");

            let wc = WNDCLASSW {
                lpfnWndProc: Some(window_proc),
                hInstance: hinstance.into(),
                lpszClassName: class_name,
                ..Default::default()
            };

            if RegisterClassW(&wc) == 0 {
                return Err(anyhow!("Failed to register window class"));
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                class_name,
                w!("CoC Launcher"),
                WINDOW_STYLE::default(),
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                None,
                hinstance,
                None,
            )?;

            Ok(hwnd)
        }
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        unsafe {
            match msg {
                WM_HOTKEY => {
                    if let Some(app) = APP.get() {
                        handle_hotkey(app, wparam.0 as i32);
                    }
                    LRESULT(0)
                }
                WM_DESTROY => {
                    PostQuitMessage(0);
                    LRESULT(0)
                }
                _ => DefWindowProcW(hwnd, msg, wparam, lparam),
            }
        }
    }

    fn handle_hotkey(app: &'static App, id: i32) {
        match id {
            HOTKEY_RUN => {
                tracing::info!("Run hotkey pressed");
                if let Err(e) = app.runner.start("target-run", move |abort| {
                    if let Err(e) = run_configured_targets(&app.config, abort) {
                        tracing::error!("Target run failed: {:#}", e);
                    }
                }) {
                    tracing::warn!("{}", e);
                }
            }
            HOTKEY_CLICK_TEST => {
                tracing::info!("Click test hotkey pressed");
                if let Err(e) = app.runner.start("click-test", move |abort| {
                    if let Err(e) = prepare_game_window(&app.config, abort) {
                        tracing::error!("Click test aborted: {:#}", e);
                        return;
                    }
                    let mut clicker =
                        ClickDispatcher::new(SendInputMouse::new(), app.config.click.timing());
                    ClickTest::from_config(&app.config.click).run(
                        &mut clicker,
                        primary_screen_center(),
                        abort,
                    );
                }) {
                    tracing::warn!("{}", e);
                }
            }
            HOTKEY_TYPE_TEXT => {
                tracing::info!("Type text hotkey pressed");
                if let Err(e) = app.runner.start("type-text", move |abort| {
                    if let Err(e) = prepare_game_window(&app.config, abort) {
                        tracing::error!("Text entry aborted: {:#}", e);
                        return;
                    }
                    let keyboard = &app.config.keyboard;
                    let mut typer = TextTyper::new(SendInputKeyboard::new(), keyboard.timing());
                    let typed = typer.type_text(&keyboard.text, abort);
                    tracing::info!("Typed {} character(s)", typed);
                }) {
                    tracing::warn!("{}", e);
                }
            }
            HOTKEY_ABORT => {
                if app.runner.is_running() {
                    app.runner.request_abort();
                } else {
                    tracing::info!("Abort hotkey pressed but nothing is running");
                }
            }
            HOTKEY_EXIT => {
                tracing::info!("Exit hotkey pressed");
                app.runner.request_abort();
                unsafe { PostQuitMessage(0) };
            }
            _ => {}
        }
    }

    /// Finds the game window (starting the game if needed), brings it to the
    /// foreground and waits for it to settle.
    fn prepare_game_window(config: &AppConfig, abort: &AtomicBool) -> Result<WindowHandle> {
        let mut host = DesktopGameHost::new(&config.game);
        let options = LaunchOptions::from_config(&config.game);
        let window = ensure_game_window(&mut host, &options, abort)?;
        activate_window(window)?;
        thread::sleep(Duration::from_millis(config.game.activation_delay_ms));
        if !is_window_valid(window) {
            return Err(anyhow!("Game window closed while activating"));
        }
        Ok(window)
    }

    fn run_configured_targets(config: &AppConfig, abort: &AtomicBool) -> Result<()> {
        let window = prepare_game_window(config, abort)?;

        let templates =
            TemplateStore::new(paths::get_resource_root(&config.recognition.resource_dir));
        tracing::debug!("Loading templates from {}", templates.root().display());
        let clicker = ClickDispatcher::new(SendInputMouse::new(), config.click.timing());
        let mut recognizer = Recognizer::new(GdiScreen, clicker, templates);
        if config.recognition.save_missed_captures {
            recognizer = recognizer.save_missed_captures_to(paths::get_captures_dir());
        }

        let summary = run_targets(&mut recognizer, config, Some(window), abort);
        if summary.failed > 0 {
            return Err(anyhow!("{} target(s) failed", summary.failed));
        }
        Ok(())
    }
}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(not(windows))]
fn main() {
    coc_launcher::logging::init(&coc_launcher::paths::get_logs_dir());
    tracing::error!("coc-launcher drives a Windows emulator window and only runs on Windows");
    std::process::exit(1);
}
