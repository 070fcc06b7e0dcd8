//! Background job runner.
//!
//! Runs one job at a time on a worker thread so the hotkey loop stays
//! responsive, and carries the abort flag the job polls.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::automation::config::AppConfig;
use crate::automation::recognize::{RecognizeOutcome, Recognizer};
use crate::capture::{ScreenSource, WindowHandle};
use crate::input::MouseDriver;

/// Single-slot worker with an abort flag.
#[derive(Clone, Debug, Default)]
pub struct Runner {
    running: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

/// Clears the running flag when the job ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the running job to stop at its next check.
    pub fn request_abort(&self) {
        if self.is_running() {
            tracing::info!("Abort requested");
        }
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Spawns `job` on a worker thread.
    ///
    /// # Errors
    /// Returns an error if a job is already running or the thread cannot be
    /// spawned.
    pub fn start<F>(&self, name: &str, job: F) -> Result<thread::JoinHandle<()>>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("A job is already running"));
        }
        self.abort.store(false, Ordering::SeqCst);

        let guard = RunningGuard(Arc::clone(&self.running));
        let abort = Arc::clone(&self.abort);
        let job_name = name.to_string();
        tracing::info!("Starting {} (Ctrl+Shift+Q to abort)", job_name);

        let spawned = thread::Builder::new()
            .name(job_name.clone())
            .spawn(move || {
                let _guard = guard;
                let started = Instant::now();
                job(&abort);
                tracing::info!("{} finished in {:?}", job_name, started.elapsed());
            });

        spawned.map_err(|e| anyhow!("Failed to spawn {} thread: {}", name, e))
    }
}

/// Counts of what a target run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub clicked: usize,
    pub fallback_clicked: usize,
    pub not_found: usize,
    pub failed: usize,
    pub aborted: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: RecognizeOutcome) {
        match outcome {
            RecognizeOutcome::Clicked(_) => self.clicked += 1,
            RecognizeOutcome::FallbackClicked(_) => self.fallback_clicked += 1,
            RecognizeOutcome::NotFound => self.not_found += 1,
            RecognizeOutcome::CaptureFailed | RecognizeOutcome::ClickFailed(_) => self.failed += 1,
            RecognizeOutcome::Cancelled => self.aborted = true,
        }
    }
}

/// Recognizes and clicks every configured target in order, pausing
/// `interaction_delay_ms` between them. Stops early when `cancel` is set.
pub fn run_targets<S: ScreenSource, M: MouseDriver>(
    recognizer: &mut Recognizer<S, M>,
    config: &AppConfig,
    game_window: Option<WindowHandle>,
    cancel: &AtomicBool,
) -> RunSummary {
    let default_threshold = config.recognition.default_threshold();
    let delay = Duration::from_millis(config.game.interaction_delay_ms);
    let targets = &config.recognition.targets;
    let mut summary = RunSummary::default();

    for (i, target) in targets.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            summary.aborted = true;
            break;
        }
        if i > 0 {
            thread::sleep(delay);
        }

        let request = target.to_request(default_threshold, game_window);
        let outcome = recognizer.recognize_and_click(&request, Some(cancel));
        tracing::info!("[{}/{}] {}: {:?}", i + 1, targets.len(), request.template, outcome);
        summary.record(outcome);
        if summary.aborted {
            break;
        }
    }

    tracing::info!(
        "Run complete: {} clicked, {} fallback, {} not found, {} failed{}",
        summary.clicked,
        summary.fallback_clicked,
        summary.not_found,
        summary.failed,
        if summary.aborted { " (aborted)" } else { "" }
    );
    summary
}
