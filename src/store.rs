use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{RenditionFormat, SongDuration, SongId};
use crate::error::SyncError;
use crate::fs_util;

pub const DEFAULT_STORE_FILE: &str = "suno-songs.json";

/// One persisted catalog entry. Field names follow the on-disk document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub id: SongId,
    #[serde(default)]
    pub title: String,
    pub duration: SongDuration,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub lyrics: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub persona_url: String,
    #[serde(default)]
    pub song_url: String,
    #[serde(default)]
    pub local_files: Vec<String>,
}

impl SongRecord {
    pub fn has_rendition(&self, format: RenditionFormat) -> bool {
        self.local_files.iter().any(|file| format.matches_file(file))
    }
}

/// The in-memory collection, ordered as persisted, unique by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongCatalog {
    records: Vec<SongRecord>,
}

impl SongCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SongRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_id(&self, id: &SongId) -> Option<&SongRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    /// Replaces the record with the same id in place, or appends.
    pub fn upsert(&mut self, song: SongRecord) {
        match self.records.iter_mut().find(|record| record.id == song.id) {
            Some(slot) => *slot = song,
            None => self.records.push(song),
        }
    }
}

impl From<Vec<SongRecord>> for SongCatalog {
    fn from(records: Vec<SongRecord>) -> Self {
        let mut catalog = SongCatalog::new();
        for record in records {
            catalog.upsert(record);
        }
        catalog
    }
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: Utf8PathBuf,
}

impl CatalogStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the persisted document. A missing or unreadable document yields
    /// an empty catalog. Records that don't parse are skipped; whenever
    /// anything is skipped the original document is backed up first, since
    /// the next save rewrites it.
    pub fn load(&self) -> SongCatalog {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) => {
                if self.path.as_std_path().exists() {
                    tracing::warn!("song store {} unreadable ({err}); starting fresh", self.path);
                }
                return SongCatalog::new();
            }
        };
        let entries = match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("song store {} is malformed ({err}); starting fresh", self.path);
                self.backup();
                return SongCatalog::new();
            }
        };

        let count = entries.len();
        let mut records = Vec::with_capacity(count);
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<SongRecord>(entry) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!("skipping song store entry {index}: {err}"),
            }
        }
        if records.len() != count {
            self.backup();
        }

        let parsed = records.len();
        let catalog = SongCatalog::from(records);
        if catalog.len() != parsed {
            tracing::warn!(
                "song store {} held {} duplicate ids; kept the last of each",
                self.path,
                parsed - catalog.len()
            );
        }
        catalog
    }

    /// Copies the current document to `<path>.<timestamp>.bak`.
    fn backup(&self) {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let backup = Utf8PathBuf::from(format!("{}.{stamp}.bak", self.path));
        match fs::copy(self.path.as_std_path(), backup.as_std_path()) {
            Ok(_) => tracing::warn!("kept a copy of the previous song store at {backup}"),
            Err(err) => tracing::warn!("could not back up song store to {backup}: {err}"),
        }
    }

    /// Overwrites the persisted document with the full catalog.
    pub fn save(&self, catalog: &SongCatalog) -> Result<(), SyncError> {
        let mut content = serde_json::to_vec_pretty(catalog.records())
            .map_err(|err| SyncError::StoreEncode(err.to_string()))?;
        content.push(b'\n');
        fs_util::write_atomic(self.path.as_std_path(), &content)
    }

    /// Creates an empty document when none exists yet.
    pub fn ensure_exists(&self) -> Result<(), SyncError> {
        if self.path.as_std_path().exists() {
            return Ok(());
        }
        self.save(&SongCatalog::new())
    }
}
