use assert_matches::assert_matches;

use suno_sync::domain::{RenditionFormat, SongDuration, SongId, TriggerShape};
use suno_sync::error::SyncError;

#[test]
fn song_id_from_uuid_link() {
    let id = SongId::from_link("/song/3F2A9C1E-0B4D-4E6A-9F1C-2D3E4F5A6B7C?sh=share").unwrap();
    assert_eq!(id.as_str(), "3f2a9c1e-0b4d-4e6a-9f1c-2d3e4f5a6b7c");
}

#[test]
fn song_id_from_short_token_link() {
    let id = SongId::from_link("https://suno.com/song/AbC123/extra").unwrap();
    assert_eq!(id.as_str(), "abc123");
    assert!(SongId::from_link("/persona/someone").is_none());
    assert!(SongId::from_link("").is_none());
}

#[test]
fn song_id_parse_rejects_path_characters() {
    let err = "abc/def".parse::<SongId>().unwrap_err();
    assert_matches!(err, SyncError::InvalidField { field: "id", .. });
}

#[test]
fn duration_accepts_minutes_and_seconds() {
    let duration: SongDuration = " 03:07 ".parse().unwrap();
    assert_eq!(duration.as_str(), "03:07");
    assert!("0:59".parse::<SongDuration>().is_ok());
}

#[test]
fn duration_rejects_malformed_values() {
    for value in ["3:7", "60:00", "1:60", "1:02:03", "", "live"] {
        let err = value.parse::<SongDuration>().unwrap_err();
        assert_matches!(err, SyncError::InvalidField { field: "duration", .. });
    }
}

#[test]
fn rendition_formats() {
    assert_eq!(
        RenditionFormat::MANDATORY,
        [RenditionFormat::AudioCompressed, RenditionFormat::AudioLossless]
    );
    assert_eq!(RenditionFormat::AudioLossless.trigger_shape(), TriggerShape::ConfirmGated);
    assert_eq!(RenditionFormat::Video.trigger_shape(), TriggerShape::Immediate);
    assert!(RenditionFormat::Video.is_optional());
    assert!(RenditionFormat::Video.matches_file("Nova - Glow - p1.MP4"));
    assert!(!RenditionFormat::AudioCompressed.matches_file("Nova - Glow - p1.wav"));
}

