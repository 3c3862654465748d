//! Core types for Gramcast

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ConfigError;

/// Marker that identified the `img (N).jpg` content library before the
/// naming scheme became an explicit account field
pub const LEGACY_IMG_MARKER: &str = "instimage";

/// What an account publishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Carousel,
    Reel,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Carousel => write!(f, "carousel"),
            Self::Reel => write!(f, "reel"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "carousel" => Ok(Self::Carousel),
            "reel" => Ok(Self::Reel),
            _ => Err(format!(
                "Invalid content type: '{}'. Valid options: carousel, reel",
                s
            )),
        }
    }
}

/// Filename convention of a carousel image library
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageNaming {
    /// `img (N).jpg`
    Img,
    /// `ram (N).jpg`
    Ram,
}

impl ImageNaming {
    /// Naming scheme implied by a base URL for accounts saved without one
    pub fn legacy_for(base_url: &str) -> Self {
        if base_url.contains(LEGACY_IMG_MARKER) {
            Self::Img
        } else {
            Self::Ram
        }
    }

    /// Filename of the `index`-th image (1-based)
    pub fn file_name(&self, index: u64) -> String {
        match self {
            Self::Img => format!("img ({}).jpg", index),
            Self::Ram => format!("ram ({}).jpg", index),
        }
    }

    /// Slides per post when the account does not set one
    pub fn default_slides(&self) -> u32 {
        match self {
            Self::Img => 1,
            Self::Ram => 3,
        }
    }
}

impl std::str::FromStr for ImageNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "img" => Ok(Self::Img),
            "ram" => Ok(Self::Ram),
            _ => Err(format!("Invalid image naming: '{}'. Valid options: img, ram", s)),
        }
    }
}

/// A configured publishing account
///
/// Field names match the `accounts.json` records written by earlier
/// versions, so existing registries load unchanged. Required fields default
/// to empty and are reported as [`ConfigError::MissingField`] when an
/// operation needs them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub content_type: ContentType,

    /// Name of the environment variable holding the access token
    #[serde(default)]
    pub access_token_env: String,

    /// Name of the environment variable holding the Instagram user id
    #[serde(default)]
    pub ig_user_id_env: String,

    #[serde(default)]
    pub caption_url: String,

    /// Key under which rotation state and run status are stored
    #[serde(default)]
    pub state_prefix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slides_per_post: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_naming: Option<ImageNaming>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_base_url: Option<String>,
}

impl Account {
    /// Create a carousel account
    pub fn carousel(name: &str, state_prefix: &str, base_url: &str, slides_per_post: u32) -> Self {
        Self {
            name: name.to_string(),
            content_type: ContentType::Carousel,
            access_token_env: String::new(),
            ig_user_id_env: String::new(),
            caption_url: String::new(),
            state_prefix: state_prefix.to_string(),
            base_url: Some(base_url.to_string()),
            slides_per_post: Some(slides_per_post),
            image_naming: None,
            video_base_url: None,
        }
    }

    /// Create a reel account
    pub fn reel(name: &str, state_prefix: &str, video_base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: ContentType::Reel,
            access_token_env: String::new(),
            ig_user_id_env: String::new(),
            caption_url: String::new(),
            state_prefix: state_prefix.to_string(),
            base_url: None,
            slides_per_post: None,
            image_naming: None,
            video_base_url: Some(video_base_url.to_string()),
        }
    }

    pub fn with_caption_url(mut self, url: &str) -> Self {
        self.caption_url = url.to_string();
        self
    }

    pub fn with_credentials(mut self, access_token_env: &str, ig_user_id_env: &str) -> Self {
        self.access_token_env = access_token_env.to_string();
        self.ig_user_id_env = ig_user_id_env.to_string();
        self
    }

    pub fn with_naming(mut self, naming: ImageNaming) -> Self {
        self.image_naming = Some(naming);
        self
    }

    pub fn state_key(&self) -> &str {
        &self.state_prefix
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "(account)"
        } else {
            &self.name
        }
    }

    pub fn caption_url(&self) -> Result<&str, ConfigError> {
        require(&self.caption_url, "caption_url")
    }

    /// Image base URL with trailing slashes stripped
    pub fn image_base_url(&self) -> Result<&str, ConfigError> {
        require(self.base_url.as_deref().unwrap_or_default(), "base_url").map(normalize_base)
    }

    /// Video base URL with trailing slashes stripped
    pub fn video_base_url(&self) -> Result<&str, ConfigError> {
        require(self.video_base_url.as_deref().unwrap_or_default(), "video_base_url")
            .map(normalize_base)
    }

    /// Effective naming scheme: the explicit field, else the legacy mapping
    pub fn naming(&self) -> ImageNaming {
        self.image_naming
            .unwrap_or_else(|| ImageNaming::legacy_for(self.base_url.as_deref().unwrap_or_default()))
    }

    pub fn slides_per_post(&self) -> u32 {
        self.slides_per_post
            .unwrap_or_else(|| self.naming().default_slides())
    }
}

fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField(field.to_string()))
    } else {
        Ok(value)
    }
}

/// Strip trailing slashes for consistent URL building
pub fn normalize_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Snapshot of an account's rotation progress
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationState {
    pub caption_cursor: u64,
    pub image_cursor: u64,
    pub used_videos: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Never,
    Running,
    Success,
    Error,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Most recent run of an account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub status: RunState,
    #[serde(default)]
    pub message: String,
}

impl RunStatus {
    /// Status stamped with the current time (whole seconds)
    pub fn now(status: RunState, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            last_run: Some(now.with_nanosecond(0).unwrap_or(now)),
            status,
            message: message.into(),
        }
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishOutcome {
    pub media_id: String,
    /// Empty when the permalink could not be fetched
    pub permalink: String,
}
