use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{RenditionFormat, SongId};
use crate::download::DownloadOrchestrator;
use crate::error::SyncError;
use crate::extract::{self, SongMetadata};
use crate::fs_util::song_base_name;
use crate::provider::CatalogProvider;
use crate::store::{CatalogStore, SongCatalog, SongRecord};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub include_videos: bool,
    /// Pause after each newly stored song.
    pub item_pause: Duration,
    /// Origin used for `songUrl` and relative persona links.
    pub site_url: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_videos: false,
            item_pause: Duration::from_millis(700),
            site_url: "https://suno.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageReport {
    pub page: usize,
    pub found: usize,
    pub created: usize,
    pub backfilled: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: String,
    pub pages: Vec<PageReport>,
    pub total_processed: usize,
    pub store_size: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EmptyPage,
    LastPage,
    PaginationFailed,
}

/// Where a card stands relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    New,
    ExistingComplete,
    ExistingMissingVideo,
}

impl ItemState {
    pub fn classify(existing: Option<&SongRecord>, include_videos: bool) -> Self {
        match existing {
            None => ItemState::New,
            Some(record) if include_videos && !record.has_rendition(RenditionFormat::Video) => {
                ItemState::ExistingMissingVideo
            }
            Some(_) => ItemState::ExistingComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created(SongId),
    Backfilled(SongId),
    Existing(SongId),
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<P: CatalogProvider> {
    store: CatalogStore,
    provider: P,
    downloader: DownloadOrchestrator,
    options: SyncOptions,
}

impl<P: CatalogProvider> App<P> {
    pub fn new(
        store: CatalogStore,
        provider: P,
        downloader: DownloadOrchestrator,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            provider,
            downloader,
            options,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Walks every page until the provider runs out, committing each song to
    /// the store as soon as it is complete.
    pub fn sync(&self, sink: &dyn ProgressSink) -> Result<SyncReport, SyncError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut catalog = self.store.load();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} songs in store", catalog.len()),
            elapsed: None,
        });

        let mut pages = Vec::new();
        let mut total_processed = 0;
        let mut page = 1;
        let stop_reason = loop {
            let report = self.sync_page(&mut catalog, page, sink)?;
            total_processed += report.created;
            tracing::info!(
                "processed {} songs on page {page} (total so far: {total_processed})",
                report.created
            );
            let found = report.found;
            pages.push(report);

            if found == 0 {
                break StopReason::EmptyPage;
            }
            match self.provider.has_next_page() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("no further pages; stopping pagination");
                    break StopReason::LastPage;
                }
                Err(err) => {
                    tracing::warn!("could not inspect next page control: {err}; stopping");
                    break StopReason::PaginationFailed;
                }
            }
            if let Err(err) = self.provider.advance_page() {
                tracing::warn!("failed to paginate to next page: {err}; stopping");
                break StopReason::PaginationFailed;
            }
            page += 1;
        };

        tracing::info!("done; total songs processed this session: {total_processed}");
        Ok(SyncReport {
            started_at,
            pages,
            total_processed,
            store_size: catalog.len(),
            stop_reason,
        })
    }

    /// Drains one page. Item-scoped failures are counted and skipped; only
    /// store or driver failures escape.
    pub fn sync_page(
        &self,
        catalog: &mut SongCatalog,
        page: usize,
        sink: &dyn ProgressSink,
    ) -> Result<PageReport, SyncError> {
        let mut report = PageReport {
            page,
            ..PageReport::default()
        };
        let items = match self.provider.list_items() {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!("couldn't find any songs on page {page}: {err}");
                return Ok(report);
            }
        };
        report.found = items.len();
        tracing::info!("found {} songs on page {page}", items.len());

        for (index, item) in items.iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; song {} of {} (page {page})",
                    index + 1,
                    items.len()
                ),
                elapsed: None,
            });
            tracing::info!(
                "--- processing song {} of {} (page {page}) ---",
                index + 1,
                items.len()
            );
            let start = std::time::Instant::now();
            match self.sync_item(catalog, item) {
                Ok(ItemOutcome::Created(id)) => {
                    report.created += 1;
                    sink.event(ProgressEvent {
                        message: format!("phase=Store; stored {id}"),
                        elapsed: Some(start.elapsed()),
                    });
                    if !self.options.item_pause.is_zero() {
                        thread::sleep(self.options.item_pause);
                    }
                }
                Ok(ItemOutcome::Backfilled(id)) => {
                    report.backfilled += 1;
                    sink.event(ProgressEvent {
                        message: format!("phase=Store; added video to {id}"),
                        elapsed: Some(start.elapsed()),
                    });
                }
                Ok(ItemOutcome::Existing(id)) => {
                    report.skipped_existing += 1;
                    tracing::info!("song {id} already exists in store; skipping");
                }
                Err(err) if err.is_item_scoped() => {
                    report.failed += 1;
                    tracing::warn!("skipping song {} on page {page}: {err}", index + 1);
                    sink.event(ProgressEvent {
                        message: format!("skip song {}: {err}", index + 1),
                        elapsed: Some(start.elapsed()),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    pub fn sync_item(
        &self,
        catalog: &mut SongCatalog,
        item: &P::Item,
    ) -> Result<ItemOutcome, SyncError> {
        let id = extract::read_song_id(&self.provider, item)?;
        let existing = catalog.find_by_id(&id);
        match ItemState::classify(existing, self.options.include_videos) {
            ItemState::ExistingComplete => Ok(ItemOutcome::Existing(id)),
            ItemState::ExistingMissingVideo => {
                let Some(mut record) = existing.cloned() else {
                    return Ok(ItemOutcome::Existing(id));
                };
                self.backfill_video(catalog, item, &mut record)
            }
            ItemState::New => self.create(catalog, item, id),
        }
    }

    fn backfill_video(
        &self,
        catalog: &mut SongCatalog,
        item: &P::Item,
        record: &mut SongRecord,
    ) -> Result<ItemOutcome, SyncError> {
        let base_name = song_base_name(&record.persona, &record.title, &record.id);
        match self.downloader.download_rendition(
            &self.provider,
            item,
            RenditionFormat::Video,
            Some(&base_name),
        ) {
            Ok(filename) => {
                record.local_files.push(filename);
                let id = record.id.clone();
                catalog.upsert(record.clone());
                self.store.save(catalog)?;
                Ok(ItemOutcome::Backfilled(id))
            }
            Err(err) if err.is_item_scoped() => {
                tracing::warn!("failed to download video for existing song {}: {err}", record.id);
                Ok(ItemOutcome::Existing(record.id.clone()))
            }
            Err(err) => Err(err),
        }
    }

    fn create(
        &self,
        catalog: &mut SongCatalog,
        item: &P::Item,
        id: SongId,
    ) -> Result<ItemOutcome, SyncError> {
        let metadata = extract::read_metadata(&self.provider, item, &self.options.site_url)?;
        let base_name = song_base_name(&metadata.persona.name, &metadata.title, &id);

        let mut local_files = Vec::new();
        for format in self.rendition_plan() {
            match self
                .downloader
                .download_rendition(&self.provider, item, format, Some(&base_name))
            {
                Ok(filename) => local_files.push(filename),
                Err(err) if format.is_optional() && err.is_item_scoped() => {
                    tracing::warn!("failed to download {format} for new song {id}: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        let record = self.build_record(id.clone(), metadata, local_files);
        catalog.upsert(record);
        self.store.save(catalog)?;
        tracing::info!("updated {} with song {id}", self.store.path());
        Ok(ItemOutcome::Created(id))
    }

    fn rendition_plan(&self) -> Vec<RenditionFormat> {
        let mut formats = RenditionFormat::MANDATORY.to_vec();
        if self.options.include_videos {
            formats.push(RenditionFormat::Video);
        }
        formats
    }

    fn build_record(
        &self,
        id: SongId,
        metadata: SongMetadata,
        local_files: Vec<String>,
    ) -> SongRecord {
        let song_url = format!("{}/song/{id}", self.options.site_url.trim_end_matches('/'));
        SongRecord {
            id,
            title: metadata.title,
            duration: metadata.duration,
            version: metadata.version,
            lyrics: metadata.lyrics,
            style: metadata.style,
            persona: metadata.persona.name,
            persona_url: metadata.persona.url,
            song_url,
            local_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(files: &[&str]) -> SongRecord {
        SongRecord {
            id: "abc".parse().unwrap(),
            title: "Tune".to_string(),
            duration: "1:00".parse().unwrap(),
            version: "v4".to_string(),
            lyrics: String::new(),
            style: String::new(),
            persona: String::new(),
            persona_url: String::new(),
            song_url: "https://suno.com/song/abc".to_string(),
            local_files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn classify_item_states() {
        let audio_only = record(&["Tune - abc.mp3", "Tune - abc.wav"]);
        let with_video = record(&["Tune - abc.mp3", "Tune - abc.mp4"]);

        assert_eq!(ItemState::classify(None, true), ItemState::New);
        assert_eq!(
            ItemState::classify(Some(&audio_only), false),
            ItemState::ExistingComplete
        );
        assert_eq!(
            ItemState::classify(Some(&audio_only), true),
            ItemState::ExistingMissingVideo
        );
        assert_eq!(
            ItemState::classify(Some(&with_video), true),
            ItemState::ExistingComplete
        );
    }
}
