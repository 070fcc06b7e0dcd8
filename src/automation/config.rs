//! Configuration types for automation.
//!
//! Loaded from `config.json` next to the executable at startup and passed
//! explicitly to whatever needs it. Missing fields take their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::recognize::{Fallback, RecognizeRequest};
use crate::capture::{CaptureArea, CaptureTarget, WindowHandle};
use crate::input::{ClickTiming, MouseButton, TypingTiming};
use crate::recognition::{TemplateId, Threshold, DEFAULT_THRESHOLD};

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameConfig,
    pub recognition: RecognitionConfig,
    pub click: ClickConfig,
    pub keyboard: KeyboardConfig,
}

/// How to find and pace interaction with the game window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Executable hosting the game (the Google Play Games emulator)
    pub process_name: String,
    /// Substring of the game window title
    pub window_title_keyword: String,
    /// Pause between consecutive recognition targets (milliseconds)
    pub interaction_delay_ms: u64,
    /// Pause after activating the window before the first capture (milliseconds)
    pub activation_delay_ms: u64,
    /// Emulator executable started when the game is not running
    pub executable_path: Option<PathBuf>,
    /// How long to wait for the game window after starting it (seconds)
    pub launch_timeout_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            process_name: "crosvm".to_string(),
            window_title_keyword: "部落冲突".to_string(),
            interaction_delay_ms: 250,
            activation_delay_ms: 200,
            executable_path: None,
            launch_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Template folder name, searched upwards from the executable directory
    pub resource_dir: String,
    /// Threshold used by targets that do not set their own
    pub default_threshold: f64,
    /// Save the captured screen when a template is not found
    pub save_missed_captures: bool,
    /// Templates to recognize and click, in order
    pub targets: Vec<TargetConfig>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            resource_dir: "Res".to_string(),
            default_threshold: DEFAULT_THRESHOLD,
            save_missed_captures: false,
            targets: vec![TargetConfig::new("002", "2")],
        }
    }
}

impl RecognitionConfig {
    /// The configured default threshold, or 0.8 if it is out of range.
    pub fn default_threshold(&self) -> Threshold {
        Threshold::new(self.default_threshold).unwrap_or_else(|e| {
            tracing::warn!("{}. Using {}", e, DEFAULT_THRESHOLD);
            Threshold::default()
        })
    }
}

/// One template to recognize and click.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub sub_folder: String,
    /// Overrides `RecognitionConfig::default_threshold`
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Corner-relative click used when the template is not found
    #[serde(default)]
    pub fallback: Option<Fallback>,
    /// Click a second time after `confirm_delay_ms`
    #[serde(default)]
    pub confirm_click: bool,
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
    #[serde(default)]
    pub capture: CaptureArea,
    #[serde(default)]
    pub button: MouseButton,
}

fn default_confirm_delay_ms() -> u64 {
    500
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, sub_folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub_folder: sub_folder.into(),
            threshold: None,
            fallback: None,
            confirm_click: false,
            confirm_delay_ms: default_confirm_delay_ms(),
            capture: CaptureArea::default(),
            button: MouseButton::default(),
        }
    }

    /// Builds the request for this target.
    ///
    /// `game_window` is required for `CaptureArea::GameWindow`; without it the
    /// full screen is searched instead.
    pub fn to_request(
        &self,
        default_threshold: Threshold,
        game_window: Option<WindowHandle>,
    ) -> RecognizeRequest {
        let threshold = match self.threshold {
            Some(value) => Threshold::new(value).unwrap_or_else(|e| {
                tracing::warn!(
                    "Target {}: {}. Using {}",
                    self.name,
                    e,
                    default_threshold.value()
                );
                default_threshold
            }),
            None => default_threshold,
        };
        let target = match (self.capture, game_window) {
            (CaptureArea::GameWindow, Some(handle)) => CaptureTarget::WindowClient(handle),
            (CaptureArea::GameWindow, None) => {
                tracing::warn!("Target {}: no game window, searching full screen", self.name);
                CaptureTarget::FullScreen
            }
            (CaptureArea::FullScreen, _) => CaptureTarget::FullScreen,
        };

        RecognizeRequest {
            template: TemplateId::new(&self.name, &self.sub_folder),
            threshold,
            target,
            button: self.button,
            fallback: self.fallback,
            confirm_click: self
                .confirm_click
                .then(|| Duration::from_millis(self.confirm_delay_ms)),
        }
    }
}

/// Click timing and the click test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    /// Time between button down and up (milliseconds)
    pub hold_ms: u64,
    /// Time between repeated clicks (milliseconds)
    pub repeat_delay_ms: u64,
    pub test_clicks_per_second: u32,
    pub test_duration_secs: u32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            hold_ms: 20,
            repeat_delay_ms: 50,
            test_clicks_per_second: 3,
            test_duration_secs: 10,
        }
    }
}

impl ClickConfig {
    pub fn timing(&self) -> ClickTiming {
        ClickTiming {
            hold: Duration::from_millis(self.hold_ms),
            repeat_delay: Duration::from_millis(self.repeat_delay_ms),
        }
    }
}

/// Text typed into the game by the typing hotkey.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub text: String,
    /// Time between key down and up (milliseconds)
    pub hold_ms: u64,
    /// Pause between characters (milliseconds)
    pub char_delay_ms: u64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            text: "123".to_string(),
            hold_ms: 50,
            char_delay_ms: 30,
        }
    }
}

impl KeyboardConfig {
    pub fn timing(&self) -> TypingTiming {
        TypingTiming {
            hold: Duration::from_millis(self.hold_ms),
            char_delay: Duration::from_millis(self.char_delay_ms),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, or returns defaults if the file is
    /// missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        tracing::info!("Looking for config at: {}", path.display());

        if !path.exists() {
            tracing::info!("{} not found. Using default config.", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
