//! Template image recognition.
//!
//! This module provides:
//! - Template identities and loading (`TemplateStore`)
//! - Pixel-exact sliding-window matching (`find_match`)

pub mod matcher;
pub mod template;

pub use matcher::{
    find_match, find_match_with_stats, score_at, MatchOptions, MatchResult, MatchStats,
    COLOR_TOLERANCE,
};
pub use template::{Template, TemplateId, TemplateStore, Threshold, DEFAULT_THRESHOLD};
