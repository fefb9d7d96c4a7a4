//! Field contracts for song cards.
//!
//! Title and duration are strict: a missing or malformed value aborts the
//! card. Style, lyrics and persona degrade to empty strings, the version tag
//! degrades to [`VERSION_UNKNOWN`].

use crate::domain::{SongDuration, SongId, VERSION_UNKNOWN, is_version_tag};
use crate::error::SyncError;
use crate::fs_util::collapse_whitespace;
use crate::provider::{CardField, CatalogProvider};

const STYLE_FALLBACK_MIN_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMetadata {
    pub title: String,
    pub duration: SongDuration,
    pub version: String,
    pub lyrics: String,
    pub style: String,
    pub persona: Persona,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub url: String,
}

pub fn read_song_id<P: CatalogProvider>(provider: &P, item: &P::Item) -> Result<SongId, SyncError> {
    provider
        .extract_field(item, CardField::SongLink)?
        .iter()
        .find_map(|href| SongId::from_link(href))
        .ok_or(SyncError::MissingId)
}

pub fn read_metadata<P: CatalogProvider>(
    provider: &P,
    item: &P::Item,
    site_url: &str,
) -> Result<SongMetadata, SyncError> {
    let title = parse_title(&provider.extract_field(item, CardField::Title)?)?;
    let duration = parse_duration(&provider.extract_field(item, CardField::Duration)?)?;
    tracing::info!("title: {title} [{duration}]");

    let lyrics = match provider.extract_field(item, CardField::Lyrics) {
        Ok(values) => values.first().map(|text| text.trim().to_string()).unwrap_or_default(),
        Err(err) => {
            tracing::warn!("could not read lyrics for '{title}': {err}");
            String::new()
        }
    };

    let style = pick_style(
        &provider.extract_field(item, CardField::Style)?,
        &provider.extract_field(item, CardField::TitledText)?,
    );

    let persona = resolve_persona(
        first_non_empty(&provider.extract_field(item, CardField::PersonaName)?),
        first_non_empty(&provider.extract_field(item, CardField::PersonaTitle)?),
        first_non_empty(&provider.extract_field(item, CardField::PersonaLink)?),
        site_url,
    );
    tracing::info!("persona: {}", persona.name);

    let version = pick_version(&provider.extract_field(item, CardField::Badge)?);
    tracing::info!("version: {version}");

    Ok(SongMetadata {
        title,
        duration,
        version,
        lyrics,
        style,
        persona,
    })
}

pub fn parse_title(candidates: &[String]) -> Result<String, SyncError> {
    let raw = candidates
        .first()
        .ok_or(SyncError::MissingField { field: "title" })?;
    let title = collapse_whitespace(raw);
    if title.is_empty() {
        return Err(SyncError::InvalidField {
            field: "title",
            value: raw.clone(),
        });
    }
    Ok(title)
}

pub fn parse_duration(candidates: &[String]) -> Result<SongDuration, SyncError> {
    candidates
        .first()
        .ok_or(SyncError::MissingField { field: "duration" })?
        .parse()
}

/// The primary style block wins; otherwise the first titled text that reads
/// like a comma-separated descriptor list.
pub fn pick_style(primary: &[String], titled: &[String]) -> String {
    if let Some(style) = primary.iter().map(|text| text.trim()).find(|text| !text.is_empty()) {
        return collapse_whitespace(style);
    }
    titled
        .iter()
        .map(|text| text.trim())
        .find(|text| text.contains(',') && text.chars().count() >= STYLE_FALLBACK_MIN_LEN)
        .map(collapse_whitespace)
        .unwrap_or_default()
}

pub fn pick_version(badges: &[String]) -> String {
    match badges.iter().map(|text| text.trim()).find(|text| is_version_tag(text)) {
        Some(tag) => tag.to_string(),
        None => {
            tracing::warn!("no version tag found on song card");
            VERSION_UNKNOWN.to_string()
        }
    }
}

/// Name and absolute link are kept together or not at all.
pub fn resolve_persona(
    name: Option<&str>,
    title: Option<&str>,
    href: Option<&str>,
    site_url: &str,
) -> Persona {
    let name = name.or(title).unwrap_or_default();
    let href = href.unwrap_or_default();
    if name.is_empty() || href.is_empty() {
        return Persona::default();
    }
    let url = if href.starts_with('/') {
        format!("{}{href}", site_url.trim_end_matches('/'))
    } else {
        href.to_string()
    };
    Persona {
        name: name.to_string(),
        url,
    }
}

fn first_non_empty(values: &[String]) -> Option<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn title_is_normalized() {
        let title = parse_title(&strings(&["  Night   Drive\n"])).unwrap();
        assert_eq!(title, "Night Drive");
    }

    #[test]
    fn title_missing_or_blank_is_rejected() {
        assert_matches!(parse_title(&[]), Err(SyncError::MissingField { field: "title" }));
        assert_matches!(
            parse_title(&strings(&["   "])),
            Err(SyncError::InvalidField { field: "title", .. })
        );
    }

    #[test]
    fn duration_uses_first_candidate() {
        assert_eq!(parse_duration(&strings(&["3:07", "9:99"])).unwrap().as_str(), "3:07");
        assert_matches!(
            parse_duration(&[]),
            Err(SyncError::MissingField { field: "duration" })
        );
    }

    #[test]
    fn style_falls_back_to_descriptor_list() {
        let titled = strings(&["Night Drive", "dark synthwave, female vocals, 80s"]);
        assert_eq!(pick_style(&[], &titled), "dark synthwave, female vocals, 80s");
        assert_eq!(pick_style(&strings(&["lofi,  chill"]), &titled), "lofi, chill");
        assert_eq!(pick_style(&[], &strings(&["a, b"])), "");
    }

    #[test]
    fn version_falls_back_to_sentinel() {
        assert_eq!(pick_version(&strings(&["3:07", "v4.5+", "v3"])), "v4.5+");
        assert_eq!(pick_version(&strings(&["3:07", "Public"])), VERSION_UNKNOWN);
    }

    #[test]
    fn persona_link_is_absolute() {
        let persona = resolve_persona(Some("Ada"), None, Some("/persona/ada"), "https://suno.com/");
        assert_eq!(persona.url, "https://suno.com/persona/ada");

        let from_title = resolve_persona(None, Some("Ada"), Some("https://x.test/p"), "https://suno.com");
        assert_eq!(from_title.name, "Ada");
        assert_eq!(from_title.url, "https://x.test/p");
    }

    #[test]
    fn persona_is_both_or_neither() {
        assert_eq!(
            resolve_persona(Some("Ada"), None, None, "https://suno.com"),
            Persona::default()
        );
        assert_eq!(
            resolve_persona(None, None, Some("/persona/ada"), "https://suno.com"),
            Persona::default()
        );
    }
}
