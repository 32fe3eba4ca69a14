//! Rendering settings and theme validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Themes
// ---------------------------------------------------------------------------

pub const THEME_DEFAULT: &str = "default";
pub const THEME_BEAM: &str = "beam";
pub const THEME_ROSE_PINE: &str = "rose-pine";
pub const THEME_GAIA: &str = "gaia";
pub const THEME_UNCOVER: &str = "uncover";
pub const THEME_GRAPH_PAPER: &str = "graph_paper";

/// Themes the renderer knows how to produce.
pub const KNOWN_THEMES: &[&str] = &[
    THEME_DEFAULT,
    THEME_BEAM,
    THEME_ROSE_PINE,
    THEME_GAIA,
    THEME_UNCOVER,
    THEME_GRAPH_PAPER,
];

/// Validate that `theme` is one of [`KNOWN_THEMES`].
pub fn validate_theme(theme: &str) -> Result<(), CoreError> {
    if KNOWN_THEMES.contains(&theme) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid theme '{theme}'. Must be one of: {KNOWN_THEMES:?}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideDetail {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    General,
    Academic,
    Technical,
    Professional,
    Executive,
}

/// User-selected rendering settings, passed through untouched to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideSettings {
    #[serde(default, alias = "detail")]
    pub slide_detail: SlideDetail,
    #[serde(default)]
    pub audience: Audience,
}
