//! Template identities and loading from the resource folder.
//!
//! Templates are re-read from disk on every load; nothing is cached between
//! recognition attempts.

use std::fmt;
use std::path::{Path, PathBuf};

use image::{ImageError, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{RecognitionError, RecognitionResult};

/// Default fraction of matched pixels required to accept an offset.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// A match threshold in (0.0, 1.0].
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> RecognitionResult<Self> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(RecognitionError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Name and sub-folder of a template image under the resource root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId {
    pub name: String,
    #[serde(default)]
    pub sub_folder: String,
}

impl TemplateId {
    pub fn new(name: impl Into<String>, sub_folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub_folder: sub_folder.into(),
        }
    }

    /// `<root>/<sub_folder>/<name>.png`
    pub fn path_in(&self, root: &Path) -> PathBuf {
        let dir = if self.sub_folder.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.sub_folder)
        };
        dir.join(format!("{}.png", self.name))
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub_folder.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.sub_folder, self.name)
        }
    }
}

/// A decoded template ready for matching.
#[derive(Clone, Debug)]
pub struct Template {
    pub id: TemplateId,
    pub pixels: RgbaImage,
    pub threshold: Threshold,
}

/// Resolves template identities to files under a resource root.
#[derive(Clone, Debug)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decodes `<root>/<sub_folder>/<name>.png` into a private RGBA buffer.
    ///
    /// The file is read fully into memory before decoding, so no handle to it
    /// outlives this call.
    pub fn load_pixels(&self, id: &TemplateId) -> RecognitionResult<RgbaImage> {
        let path = id.path_in(&self.root);
        if !path.is_file() {
            return Err(RecognitionError::TemplateNotFound(path));
        }

        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RecognitionError::TemplateNotFound(path.clone()),
            _ => RecognitionError::TemplateDecode {
                path: path.clone(),
                source: ImageError::IoError(e),
            },
        })?;

        let decoded = ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| RecognitionError::TemplateDecode {
                path: path.clone(),
                source: ImageError::IoError(e),
            })?
            .decode()
            .map_err(|source| RecognitionError::TemplateDecode {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            "Loaded template {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(decoded.to_rgba8())
    }

    pub fn load(&self, id: &TemplateId, threshold: Threshold) -> RecognitionResult<Template> {
        Ok(Template {
            id: id.clone(),
            pixels: self.load_pixels(id)?,
            threshold,
        })
    }
}
