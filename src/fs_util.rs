use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tempfile::Builder;

use crate::domain::SongId;
use crate::error::SyncError;

static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).expect("valid filename pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Collapses runs of whitespace to a single space and trims the ends.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value, " ").trim().to_string()
}

/// Replaces characters that are illegal on common filesystems with a space,
/// then collapses whitespace.
pub fn sanitize_filename(name: &str) -> String {
    collapse_whitespace(&ILLEGAL_CHARS.replace_all(name, " "))
}

/// `"<persona> - <title> - <id>"`, or `"<title> - <id>"` without a persona.
pub fn song_base_name(persona: &str, title: &str, id: &SongId) -> String {
    if persona.is_empty() {
        format!("{title} - {id}")
    } else {
        format!("{persona} - {title} - {id}")
    }
}

/// Suggested filename without its final extension.
pub fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(0) | None => filename,
        Some(dot) => &filename[..dot],
    }
}

/// Moves `source` to `dest`, deleting whatever already sits at `dest` first.
/// Falls back to copy + remove when the rename crosses filesystems.
pub fn replace_file(source: &Path, dest: &Path) -> Result<(), SyncError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| SyncError::Filesystem(err.to_string()))?;
    }
    if dest.exists() {
        fs::remove_file(dest).map_err(|err| {
            SyncError::Filesystem(format!("remove existing {}: {err}", dest.display()))
        })?;
    }
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    fs::copy(source, dest).map_err(|err| {
        SyncError::Filesystem(format!(
            "copy {} -> {}: {err}",
            source.display(),
            dest.display()
        ))
    })?;
    fs::remove_file(source).map_err(|err| SyncError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Writes `content` to a temp file next to `path` and renames it over `path`,
/// so readers never observe a half-written document.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| SyncError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".suno-sync")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| SyncError::Filesystem(format!("persist {}: {err}", path.display())))?;
    Ok(())
}
