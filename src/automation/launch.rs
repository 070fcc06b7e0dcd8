//! Bringing the game up: find its window, starting the emulator first if
//! it is not running.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::automation::config::GameConfig;
use crate::capture::WindowHandle;

/// How often to look for the game window while it starts.
pub const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The processes and windows of the machine the game runs on.
pub trait GameHost {
    fn find_window(&mut self) -> Result<WindowHandle>;
    fn is_running(&mut self) -> bool;
    /// Starts `executable` without waiting for it.
    fn start(&mut self, executable: &Path) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchState {
    AlreadyRunning,
    Started,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    pub timeout: Duration,
    pub poll: Duration,
}

impl LaunchOptions {
    pub fn from_config(game: &GameConfig) -> Self {
        Self {
            executable: game.executable_path.clone(),
            timeout: Duration::from_secs(game.launch_timeout_secs),
            poll: WINDOW_POLL_INTERVAL,
        }
    }
}

/// Starts the game unless its process is already running.
///
/// # Errors
/// Returns an error if the game is not running and `executable` is unset,
/// missing, or fails to start.
pub fn launch_game<H: GameHost>(host: &mut H, executable: Option<&Path>) -> Result<LaunchState> {
    if host.is_running() {
        tracing::info!("Game process is already running");
        return Ok(LaunchState::AlreadyRunning);
    }

    let Some(executable) = executable else {
        bail!("The game is not running and game.executable_path is not set");
    };
    if !executable.is_file() {
        bail!("Game executable does not exist: {}", executable.display());
    }

    tracing::info!("Starting {}", executable.display());
    host.start(executable)
        .with_context(|| format!("Failed to start {}", executable.display()))?;
    Ok(LaunchState::Started)
}

/// Returns the game window, launching the game and waiting for its window
/// when none is found.
pub fn ensure_game_window<H: GameHost>(
    host: &mut H,
    options: &LaunchOptions,
    cancel: &AtomicBool,
) -> Result<WindowHandle> {
    let first_error = match host.find_window() {
        Ok(window) => return Ok(window),
        Err(e) => e,
    };
    tracing::info!("{:#}", first_error);

    launch_game(host, options.executable.as_deref())?;

    let started = Instant::now();
    loop {
        if cancel.load(Ordering::SeqCst) {
            bail!("Cancelled while waiting for the game window");
        }
        thread::sleep(options.poll);
        match host.find_window() {
            Ok(window) => {
                tracing::info!("Game window appeared after {:?}", started.elapsed());
                return Ok(window);
            }
            Err(e) if started.elapsed() >= options.timeout => {
                return Err(anyhow!(
                    "Game window did not appear within {:?}: {:#}",
                    options.timeout,
                    e
                ));
            }
            Err(_) => {}
        }
    }
}

/// `GameHost` for the local desktop.
#[cfg(windows)]
pub struct DesktopGameHost<'a> {
    game: &'a GameConfig,
}

#[cfg(windows)]
impl<'a> DesktopGameHost<'a> {
    pub fn new(game: &'a GameConfig) -> Self {
        Self { game }
    }
}

#[cfg(windows)]
impl GameHost for DesktopGameHost<'_> {
    fn find_window(&mut self) -> Result<WindowHandle> {
        crate::capture::find_game_window(&self.game.process_name, &self.game.window_title_keyword)
    }

    fn is_running(&mut self) -> bool {
        crate::capture::is_process_running(&self.game.process_name)
    }

    fn start(&mut self, executable: &Path) -> Result<()> {
        let mut command = std::process::Command::new(executable);
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        let child = command.spawn()?;
        tracing::info!("Game process started (pid {})", child.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost {
        running: bool,
        /// `find_window` succeeds from this call on (1-based).
        window_from_call: Option<usize>,
        find_calls: usize,
        started: Vec<PathBuf>,
        start_fails: bool,
    }

    impl GameHost for FakeHost {
        fn find_window(&mut self) -> Result<WindowHandle> {
            self.find_calls += 1;
            match self.window_from_call {
                Some(n) if self.find_calls >= n => Ok(WindowHandle(7)),
                _ => Err(anyhow!("no window")),
            }
        }

        fn is_running(&mut self) -> bool {
            self.running
        }

        fn start(&mut self, executable: &Path) -> Result<()> {
            if self.start_fails {
                bail!("access denied");
            }
            self.started.push(executable.to_path_buf());
            self.running = true;
            Ok(())
        }
    }

    fn options(executable: Option<PathBuf>) -> LaunchOptions {
        LaunchOptions {
            executable,
            timeout: Duration::from_millis(50),
            poll: Duration::ZERO,
        }
    }

    fn fake_executable() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GooglePlayGames.exe");
        std::fs::write(&path, b"").unwrap();
        (dir, path)
    }

    #[test]
    fn test_running_game_is_not_started_again() {
        let (_dir, exe) = fake_executable();
        let mut host = FakeHost {
            running: true,
            ..Default::default()
        };
        assert_eq!(launch_game(&mut host, Some(&exe)).unwrap(), LaunchState::AlreadyRunning);
        assert!(host.started.is_empty());
    }

    #[test]
    fn test_launch_requires_existing_executable() {
        let mut host = FakeHost::default();
        assert!(launch_game(&mut host, None).is_err());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.exe");
        let err = launch_game(&mut host, Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(host.started.is_empty());
    }

    #[test]
    fn test_start_failure_is_reported() {
        let (_dir, exe) = fake_executable();
        let mut host = FakeHost {
            start_fails: true,
            ..Default::default()
        };
        let err = launch_game(&mut host, Some(&exe)).unwrap_err();
        assert!(format!("{:#}", err).contains("access denied"));
    }

    #[test]
    fn test_existing_window_skips_launch() {
        let mut host = FakeHost {
            window_from_call: Some(1),
            ..Default::default()
        };
        let window = ensure_game_window(&mut host, &options(None), &AtomicBool::new(false));
        assert_eq!(window.unwrap(), WindowHandle(7));
        assert!(host.started.is_empty());
    }

    #[test]
    fn test_launch_then_wait_for_window() {
        let (_dir, exe) = fake_executable();
        let mut host = FakeHost {
            window_from_call: Some(4),
            ..Default::default()
        };
        let options = options(Some(exe.clone()));
        let window = ensure_game_window(&mut host, &options, &AtomicBool::new(false));

        assert_eq!(window.unwrap(), WindowHandle(7));
        assert_eq!(host.started, vec![exe]);
        assert_eq!(host.find_calls, 4);
    }

    #[test]
    fn test_window_wait_times_out() {
        let (_dir, exe) = fake_executable();
        let mut host = FakeHost::default();
        let err = ensure_game_window(&mut host, &options(Some(exe)), &AtomicBool::new(false))
            .unwrap_err();
        assert!(err.to_string().contains("did not appear"));
        assert_eq!(host.started.len(), 1);
    }

    #[test]
    fn test_window_wait_stops_on_cancel() {
        let (_dir, exe) = fake_executable();
        let mut host = FakeHost::default();
        let err = ensure_game_window(&mut host, &options(Some(exe)), &AtomicBool::new(true))
            .unwrap_err();
        assert!(err.to_string().contains("Cancelled"));
        assert_eq!(host.find_calls, 1);
    }
}
