#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use camino::Utf8PathBuf;

use suno_sync::app::{App, ProgressEvent, ProgressSink, SyncOptions};
use suno_sync::domain::RenditionFormat;
use suno_sync::download::{DownloadOrchestrator, TransferBudget};
use suno_sync::error::SyncError;
use suno_sync::fs_util;
use suno_sync::provider::{CardField, CatalogProvider, Transfer, TransferWindow};
use suno_sync::store::CatalogStore;

#[derive(Debug, Clone)]
pub struct Card {
    pub link: String,
    pub title: String,
    pub duration: String,
    pub lyrics: String,
    pub style: String,
    pub persona_name: String,
    pub persona_link: String,
    pub badges: Vec<String>,
}

impl Card {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            link: format!("/song/{id}"),
            title: title.to_string(),
            duration: "2:45".to_string(),
            lyrics: "la la la".to_string(),
            style: "dream pop, shoegaze".to_string(),
            persona_name: String::new(),
            persona_link: String::new(),
            badges: vec!["v4.5".to_string()],
        }
    }

    pub fn with_persona(mut self, name: &str, link: &str) -> Self {
        self.persona_name = name.to_string();
        self.persona_link = link.to_string();
        self
    }

    pub fn with_duration(mut self, duration: &str) -> Self {
        self.duration = duration.to_string();
        self
    }

    pub fn without_link(mut self) -> Self {
        self.link = "/playlist/none".to_string();
        self
    }

    fn id(&self) -> String {
        self.link.trim_start_matches("/song/").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenMenu(String),
    Select(RenditionFormat),
    Confirm,
    Transfer(String, RenditionFormat),
}

/// In-memory catalog: pages of cards, transfers written to a staging folder.
pub struct ScriptedProvider {
    pages: Vec<Vec<Card>>,
    page: Mutex<usize>,
    staging: PathBuf,
    calls: Mutex<Vec<Call>>,
    /// Remaining timeouts per (song id, format).
    failures: Mutex<HashMap<(String, RenditionFormat), u32>>,
    fail_pagination: bool,
    current: Mutex<Option<Card>>,
}

impl ScriptedProvider {
    pub fn new(pages: Vec<Vec<Card>>, staging: &Path) -> Self {
        fs::create_dir_all(staging).unwrap();
        Self {
            pages,
            page: Mutex::new(0),
            staging: staging.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            fail_pagination: false,
            current: Mutex::new(None),
        }
    }

    pub fn fail_transfer(self, id: &str, format: RenditionFormat, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((id.to_string(), format), times);
        self
    }

    pub fn fail_pagination(mut self) -> Self {
        self.fail_pagination = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<(String, RenditionFormat)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Transfer(id, format) => Some((id, format)),
                _ => None,
            })
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
        *self.page.lock().unwrap() = 0;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct StagedFile {
    path: PathBuf,
    name: String,
}

impl Transfer for StagedFile {
    fn suggested_filename(&self) -> &str {
        &self.name
    }

    fn save_as(&self, destination: &Path) -> Result<(), SyncError> {
        fs_util::replace_file(&self.path, destination)
    }
}

impl CatalogProvider for ScriptedProvider {
    type Item = Card;
    type Transfer = StagedFile;

    fn list_items(&self) -> Result<Vec<Card>, SyncError> {
        let page = *self.page.lock().unwrap();
        Ok(self.pages.get(page).cloned().unwrap_or_default())
    }

    fn extract_field(&self, item: &Card, field: CardField) -> Result<Vec<String>, SyncError> {
        let one = |value: &str| {
            if value.is_empty() {
                Vec::new()
            } else {
                vec![value.to_string()]
            }
        };
        Ok(match field {
            CardField::SongLink => one(&item.link),
            CardField::Title => one(&item.title),
            CardField::Duration => one(&item.duration),
            CardField::Lyrics => one(&item.lyrics),
            CardField::Style => one(&item.style),
            CardField::TitledText => vec![item.title.clone(), item.style.clone()],
            CardField::PersonaName => one(&item.persona_name),
            CardField::PersonaTitle => Vec::new(),
            CardField::PersonaLink => one(&item.persona_link),
            CardField::Badge => {
                let mut badges = vec![item.duration.clone()];
                badges.extend(item.badges.iter().cloned());
                badges
            }
        })
    }

    fn open_download_menu(&self, item: &Card, _wait: Duration) -> Result<(), SyncError> {
        self.record(Call::OpenMenu(item.id()));
        *self.current.lock().unwrap() = Some(item.clone());
        Ok(())
    }

    fn select_format(&self, format: RenditionFormat, _wait: Duration) -> Result<(), SyncError> {
        self.record(Call::Select(format));
        Ok(())
    }

    fn confirm_download(&self, _wait: Duration) -> Result<(), SyncError> {
        self.record(Call::Confirm);
        Ok(())
    }

    fn expect_transfer(
        &self,
        format: RenditionFormat,
        window: TransferWindow,
        trigger: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<StagedFile, SyncError> {
        trigger()?;
        let card = self
            .current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Provider("no open menu".to_string()))?;
        let id = card.id();
        self.record(Call::Transfer(id.clone(), format));

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&(id.clone(), format))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(SyncError::TransferTimeout {
                format,
                timeout_ms: window.start.as_millis(),
            });
        }

        let name = format!("{}{}", card.title, format.extension());
        let path = self.staging.join(format!("{id}-{format}.bin"));
        fs::write(&path, format!("{id}:{format}")).unwrap();
        Ok(StagedFile { path, name })
    }

    fn has_next_page(&self) -> Result<bool, SyncError> {
        let page = *self.page.lock().unwrap();
        Ok(page + 1 < self.pages.len())
    }

    fn advance_page(&self) -> Result<(), SyncError> {
        if self.fail_pagination {
            return Err(SyncError::AffordanceTimeout("next page".to_string()));
        }
        *self.page.lock().unwrap() += 1;
        Ok(())
    }
}

/// Collects progress messages.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }
}

pub struct Workspace {
    _temp: tempfile::TempDir,
    pub store_path: Utf8PathBuf,
    pub download_dir: Utf8PathBuf,
    pub staging_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self {
            store_path: root.join("suno-songs.json"),
            download_dir: root.join("downloads"),
            staging_dir: temp.path().join("staging"),
            _temp: temp,
        }
    }

    pub fn store(&self) -> CatalogStore {
        CatalogStore::new(self.store_path.clone())
    }

    pub fn provider(&self, pages: Vec<Vec<Card>>) -> ScriptedProvider {
        ScriptedProvider::new(pages, &self.staging_dir)
    }

    pub fn app(&self, provider: ScriptedProvider, include_videos: bool) -> App<ScriptedProvider> {
        let downloader = DownloadOrchestrator::new(self.download_dir.clone(), TransferBudget::default());
        let options = SyncOptions {
            include_videos,
            item_pause: Duration::ZERO,
            ..SyncOptions::default()
        };
        App::new(self.store(), provider, downloader, options)
    }

    pub fn downloaded(&self, filename: &str) -> bool {
        self.download_dir.join(filename).as_std_path().is_file()
    }
}
