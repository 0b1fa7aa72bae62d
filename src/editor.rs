//! `editor_json`: the editor state stored alongside a chosen background.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{CropRect, Point, PresetAspect};

pub const EDITOR_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("malformed editor_json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported editor_json version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub size_px: f32,
    /// `#rrggbb`
    pub color: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    /// Top-left of the text box as a fraction of the canvas, 0..=1.
    pub position: Point,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Noto Sans JP".into(),
            size_px: 32.0,
            color: "#ffffff".into(),
            bold: false,
            italic: false,
            position: Point::new(0.5, 0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub version: u32,
    pub background: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
    pub scale: f64,
    pub pan: Point,
    pub preset: PresetAspect,
    #[serde(default)]
    pub text_mode: TextMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub style: TextStyle,
}

impl EditorState {
    pub fn new(background: impl Into<String>) -> Self {
        Self {
            version: EDITOR_SCHEMA_VERSION,
            background: background.into(),
            crop: None,
            scale: 1.0,
            pan: Point::default(),
            preset: PresetAspect::default(),
            text_mode: TextMode::default(),
            text: None,
            style: TextStyle::default(),
        }
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, EditorError> {
        #[derive(Deserialize)]
        struct Versioned {
            version: u32,
        }
        let v: Versioned = serde_json::from_str(s)?;
        if v.version != EDITOR_SCHEMA_VERSION {
            return Err(EditorError::UnsupportedVersion { found: v.version, expected: EDITOR_SCHEMA_VERSION });
        }
        Ok(serde_json::from_str(s)?)
    }
}

/// Parse `#rrggbb` (or `rrggbb`) into RGB.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
