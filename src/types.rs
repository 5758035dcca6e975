use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

// ============================================================================
// Agent Category
// ============================================================================

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
pub enum AgentCategory {
    Core,
    Creative,
    Education,
    Wellness,
    Specialized,
    Operations,
}

// ============================================================================
// Voices
// ============================================================================

/// Prebuilt speech voices understood by the speech model.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Default,
)]
pub enum Voice {
    Kore,
    Puck,
    Charon,
    #[default]
    Zephyr,
    Fenrir,
}

// ============================================================================
// Image / Video Geometry
// ============================================================================

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, AsRefStr, EnumString, Default,
)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    #[strum(serialize = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    #[strum(serialize = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    #[strum(serialize = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    #[strum(serialize = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    #[strum(serialize = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    #[strum(serialize = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    #[strum(serialize = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    #[strum(serialize = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    /// Video jobs only accept the two widescreen orientations.
    pub fn for_video(self) -> Self {
        match self {
            Self::Portrait9x16 | Self::Portrait2x3 | Self::Portrait3x4 => Self::Portrait9x16,
            _ => Self::Landscape16x9,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, AsRefStr, EnumString, Default,
)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    #[strum(serialize = "1K")]
    OneK,
    #[serde(rename = "2K")]
    #[strum(serialize = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    #[strum(serialize = "4K")]
    FourK,
}

// ============================================================================
// Media Kind
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

// ============================================================================
// MIME Type Helper
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MimeType(String);

impl MimeType {
    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into())
    }

    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.0.starts_with("video/")
    }

    pub fn is_audio(&self) -> bool {
        self.0.starts_with("audio/")
    }

    pub fn kind(&self) -> Option<MediaKind> {
        if self.is_image() {
            Some(MediaKind::Image)
        } else if self.is_video() {
            Some(MediaKind::Video)
        } else if self.is_audio() {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Geolocation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

// ============================================================================
// Tests
// ============================================================================
