//! Automation built on top of recognition and input.
//!
//! This module provides:
//! - Configuration loading (`config.json`)
//! - Finding the game window, starting the emulator when needed
//! - The recognize-and-click pipeline with fallback clicks
//! - A background runner for configured target sequences
//! - A click test for checking that input reaches the game

pub mod config;
pub mod launch;
pub mod recognize;
pub mod runner;

pub use click_test::{ClickTest, ClickTestReport};
pub use config::{
    AppConfig, ClickConfig, GameConfig, KeyboardConfig, RecognitionConfig, TargetConfig,
};
#[cfg(windows)]
pub use launch::DesktopGameHost;
pub use launch::{ensure_game_window, launch_game, GameHost, LaunchOptions, LaunchState};
pub use recognize::{Corner, Fallback, Located, RecognizeOutcome, RecognizeRequest, Recognizer};
pub use runner::{run_targets, RunSummary, Runner};
