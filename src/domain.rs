use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

static UUID_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/song/([0-9a-fA-F-]{36})").expect("valid uuid pattern"));
static TOKEN_IN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/song/([^?/#]+)").expect("valid token pattern"));
static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-5]?\d:[0-5]\d$").expect("valid duration pattern"));
static VERSION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^v\d+(?:\.\d+)?(?:\+|-all)?$").expect("valid version pattern")
});

/// Stable song identifier: a lowercase UUID, or the provider token when the
/// link carries something else after `/song/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongId(String);

impl SongId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pulls the identifier out of a song link such as `/song/<uuid>?sh=...`.
    pub fn from_link(href: &str) -> Option<Self> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        if let Some(caps) = UUID_IN_LINK.captures(href) {
            return Some(Self(caps[1].to_lowercase()));
        }
        TOKEN_IN_LINK
            .captures(href)
            .map(|caps| Self(caps[1].to_lowercase()))
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SongId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '#'));
        if !is_valid {
            return Err(SyncError::InvalidField {
                field: "id",
                value: value.to_string(),
            });
        }
        Ok(Self(normalized))
    }
}

/// Play length as displayed on the card, `m:ss` or `mm:ss` under one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongDuration(String);

impl SongDuration {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SongDuration {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !DURATION.is_match(trimmed) {
            return Err(SyncError::InvalidField {
                field: "duration",
                value: value.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

pub const VERSION_UNKNOWN: &str = "N/A";

pub fn is_version_tag(text: &str) -> bool {
    VERSION_TAG.is_match(text.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenditionFormat {
    AudioCompressed,
    AudioLossless,
    Video,
}

/// How selecting a format in the download menu starts the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerShape {
    Immediate,
    ConfirmGated,
}

impl RenditionFormat {
    pub const MANDATORY: [RenditionFormat; 2] =
        [RenditionFormat::AudioCompressed, RenditionFormat::AudioLossless];

    pub fn extension(self) -> &'static str {
        match self {
            RenditionFormat::AudioCompressed => ".mp3",
            RenditionFormat::AudioLossless => ".wav",
            RenditionFormat::Video => ".mp4",
        }
    }

    /// Label of the download submenu entry for this format.
    pub fn menu_label(self) -> &'static str {
        match self {
            RenditionFormat::AudioCompressed => "MP3 Audio",
            RenditionFormat::AudioLossless => "WAV Audio",
            RenditionFormat::Video => "Video",
        }
    }

    pub fn trigger_shape(self) -> TriggerShape {
        match self {
            RenditionFormat::AudioLossless => TriggerShape::ConfirmGated,
            RenditionFormat::AudioCompressed | RenditionFormat::Video => TriggerShape::Immediate,
        }
    }

    pub fn is_optional(self) -> bool {
        matches!(self, RenditionFormat::Video)
    }

    /// True when a stored filename is a rendition of this format.
    pub fn matches_file(self, filename: &str) -> bool {
        filename.to_lowercase().ends_with(self.extension())
    }
}

impl fmt::Display for RenditionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenditionFormat::AudioCompressed => write!(f, "mp3"),
            RenditionFormat::AudioLossless => write!(f, "wav"),
            RenditionFormat::Video => write!(f, "mp4"),
        }
    }
}

impl FromStr for RenditionFormat {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mp3" | "audio_compressed" => Ok(RenditionFormat::AudioCompressed),
            "wav" | "audio_lossless" => Ok(RenditionFormat::AudioLossless),
            "mp4" | "video" => Ok(RenditionFormat::Video),
            _ => Err(SyncError::InvalidField {
                field: "format",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Firefox,
    Chromium,
    Webkit,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Browser::Firefox => write!(f, "firefox"),
            Browser::Chromium => write!(f, "chromium"),
            Browser::Webkit => write!(f, "webkit"),
        }
    }
}

impl FromStr for Browser {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "firefox" => Ok(Browser::Firefox),
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "webkit" | "safari" => Ok(Browser::Webkit),
            _ => Err(SyncError::InvalidBrowser(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn song_id_from_uuid_link() {
        let id = SongId::from_link("/song/0F8FAD5B-D9CB-469F-A165-70867728950E?sh=abc").unwrap();
        assert_eq!(id.as_str(), "0f8fad5b-d9cb-469f-a165-70867728950e");
    }

    #[test]
    fn song_id_falls_back_to_token() {
        let id = SongId::from_link("/song/AbC123/extra").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert!(SongId::from_link("/persona/someone").is_none());
        assert!(SongId::from_link("  ").is_none());
    }

    #[test]
    fn duration_accepts_mm_ss() {
        assert!("1:30".parse::<SongDuration>().is_ok());
        assert!("59:59".parse::<SongDuration>().is_ok());
        assert!("03:07".parse::<SongDuration>().is_ok());
    }

    #[test]
    fn duration_rejects_out_of_range() {
        let err = "60:00".parse::<SongDuration>().unwrap_err();
        assert_matches!(err, SyncError::InvalidField { field: "duration", .. });
        assert!("1:600".parse::<SongDuration>().is_err());
        assert!("1:6".parse::<SongDuration>().is_err());
        assert!("".parse::<SongDuration>().is_err());
    }

    #[test]
    fn version_tags() {
        for tag in ["v2", "v3.5", "v4.5+", "v4.5-all", "V5"] {
            assert!(is_version_tag(tag), "{tag}");
        }
        for text in ["version 4", "v", "4.5", "v4.5.1"] {
            assert!(!is_version_tag(text), "{text}");
        }
    }

    #[test]
    fn rendition_contracts() {
        assert_eq!(RenditionFormat::AudioCompressed.extension(), ".mp3");
        assert_eq!(RenditionFormat::AudioLossless.extension(), ".wav");
        assert_eq!(RenditionFormat::Video.extension(), ".mp4");
        assert_eq!(
            RenditionFormat::AudioLossless.trigger_shape(),
            TriggerShape::ConfirmGated
        );
        assert_eq!(RenditionFormat::Video.trigger_shape(), TriggerShape::Immediate);
        assert!(RenditionFormat::Video.matches_file("Song - id.MP4"));
        assert!(!RenditionFormat::Video.matches_file("Song - id.mp3"));
    }

    #[test]
    fn browser_parse() {
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert_matches!("edge".parse::<Browser>(), Err(SyncError::InvalidBrowser(_)));
    }
}
