use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::config::{PageTimeouts, ResolvedConfig};
use crate::domain::{Browser, RenditionFormat};
use crate::error::SyncError;
use crate::fs_util;
use crate::provider::{CardField, CatalogProvider, Transfer, TransferWindow};
use crate::webdriver::session::SessionSnapshot;
use crate::webdriver::{Locator, SessionSettings, WebDriverClient, WebElement};

const CARD: &str = "//*[(self::button or @role='button') and starts-with(normalize-space(@aria-label), 'Play Song')]";
const SONG_LINK: &str = "a[href^='/song/']";
const TITLE: &str = "span.line-clamp-1[title]";
const DURATION: &str = "[data-testid=\"song-row-play-button\"] div.relative > span.font-mono";
const STYLE: &str = "div.text-xs.line-clamp-1[title]";
const TITLED: &str = "[title]";
const PERSONA_LINK: &str = "a[href^='/persona/']";
const BADGE: &str = "span";
const LYRICS_BOX: &str = "//textarea[@aria-label='Add lyrics' or @placeholder='Add lyrics']";
const NEXT_PAGE: &str = r"div:nth-child(2) > .flex.flex-col.overflow-y-hidden > .px-6 > .flex.flex-1.flex-col > div > .ml-4.flex > .flex.flex-row.items-center.gap-\[5px\] > button:nth-child(3)";

const DIALOG_WAIT: Duration = Duration::from_secs(5);
const PAGE_SETTLE: Duration = Duration::from_millis(1000);
const PRE_PAGINATION_SETTLE: Duration = Duration::from_millis(300);
const TRANSFER_POLL: Duration = Duration::from_millis(250);
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".crdownload", ".download", ".tmp"];

/// Catalog pages read and driven through a WebDriver browser session.
pub struct WebDriverProvider {
    driver: WebDriverClient,
    staging_dir: PathBuf,
    timeouts: PageTimeouts,
    /// Final names of transfers abandoned by a timed-out attempt.
    abandoned: Mutex<HashSet<String>>,
}

impl WebDriverProvider {
    /// Starts the browser, restores the saved session and opens the catalog.
    pub fn open(config: &ResolvedConfig) -> Result<Self, SyncError> {
        let snapshot = SessionSnapshot::load(&config.session_path)?;
        fs::create_dir_all(config.staging_dir.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        let staging_dir = fs::canonicalize(config.staging_dir.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        if config.browser == Browser::Webkit && config.headless {
            tracing::warn!("webkit (safari) has no headless mode; running visible");
        }

        let driver = WebDriverClient::connect(
            &config.webdriver_url,
            &SessionSettings {
                browser: config.browser,
                headless: config.headless,
                download_dir: Some(&staging_dir),
            },
        )?;

        driver.navigate(&config.site_url)?;
        let restored = snapshot.restore(&driver);
        tracing::debug!("restored {restored} of {} cookies", snapshot.cookies.len());

        tracing::info!("navigating to {}", config.catalog_url);
        driver.navigate(&config.catalog_url)?;
        tracing::info!("saving files to: {}", config.download_dir);

        let provider = Self {
            driver,
            staging_dir,
            timeouts: config.page_timeouts.clone(),
            abandoned: Mutex::new(HashSet::new()),
        };
        match provider
            .driver
            .wait_for(Locator::XPath(CARD), provider.timeouts.first_item, false)
        {
            Ok(_) => provider.dismiss_popup(),
            Err(err) => tracing::warn!("couldn't find any songs; is the page loaded? ({err})"),
        }
        Ok(provider)
    }

    fn dismiss_popup(&self) {
        match self
            .driver
            .wait_for(Locator::XPath(&button_named("Close")), self.timeouts.popup, true)
        {
            Ok(close) => match self.driver.click(&close) {
                Ok(()) => tracing::info!("popup closed"),
                Err(err) => tracing::debug!("popup close failed: {err}"),
            },
            Err(_) => tracing::debug!("no popup to close"),
        }
    }

    fn click_button(&self, name: &str, wait: Duration) -> Result<WebElement, SyncError> {
        let button = self
            .driver
            .wait_for(Locator::XPath(&button_named(name)), wait, true)?;
        self.driver.click(&button)?;
        Ok(button)
    }

    fn attributes_in(
        &self,
        card: &WebElement,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SyncError> {
        let mut values = Vec::new();
        for element in self.driver.find_elements_in(card, Locator::Css(selector))? {
            if let Some(value) = self.driver.attribute(&element, attribute)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn texts_in(&self, card: &WebElement, selector: &str) -> Result<Vec<String>, SyncError> {
        self.driver
            .find_elements_in(card, Locator::Css(selector))?
            .iter()
            .map(|element| self.driver.text(element))
            .collect()
    }

    fn first_in(
        &self,
        card: &WebElement,
        selector: &str,
    ) -> Result<Option<WebElement>, SyncError> {
        Ok(self
            .driver
            .find_elements_in(card, Locator::Css(selector))?
            .into_iter()
            .next())
    }

    /// Song Details -> Edit Displayed Lyrics -> read the text box. Escape
    /// is sent whether or not the dialog chain got that far.
    fn read_lyrics(&self, card: &WebElement) -> Result<Vec<String>, SyncError> {
        self.driver.context_click(card)?;
        dismissed_after(
            || {
                self.click_button("Song Details", DIALOG_WAIT)?;
                self.click_button("Edit Displayed Lyrics", DIALOG_WAIT)?;
                let text_box = self
                    .driver
                    .wait_for(Locator::XPath(LYRICS_BOX), DIALOG_WAIT, true)?;
                let lyrics = self.driver.property(&text_box, "value")?.unwrap_or_default();
                Ok(vec![lyrics])
            },
            || self.driver.press_escape(),
        )
    }

    fn first_song_link(&self) -> Option<String> {
        let cards = self.driver.find_elements(Locator::XPath(CARD)).ok()?;
        let card = cards.first()?;
        self.attributes_in(card, SONG_LINK, "href")
            .ok()?
            .into_iter()
            .next()
    }

    fn abandoned(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.abandoned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes abandoned transfers that have since finished.
    fn discard_late(&self, names: Vec<String>) {
        let mut abandoned = self.abandoned();
        for name in names {
            match fs::remove_file(self.staging_dir.join(&name)) {
                Ok(()) => tracing::debug!("discarded late transfer {name}"),
                Err(err) => tracing::debug!("could not discard late transfer {name}: {err}"),
            }
            abandoned.remove(&name);
        }
    }
}

impl CatalogProvider for WebDriverProvider {
    type Item = WebElement;
    type Transfer = StagedTransfer;

    fn list_items(&self) -> Result<Vec<WebElement>, SyncError> {
        if self
            .driver
            .wait_for(Locator::XPath(CARD), self.timeouts.first_item, false)
            .is_err()
        {
            return Ok(Vec::new());
        }
        self.driver.find_elements(Locator::XPath(CARD))
    }

    fn extract_field(&self, item: &WebElement, field: CardField) -> Result<Vec<String>, SyncError> {
        match field {
            CardField::SongLink => self.attributes_in(item, SONG_LINK, "href"),
            CardField::Title => self.attributes_in(item, TITLE, "title"),
            CardField::Duration => self.texts_in(item, DURATION),
            CardField::Lyrics => self.read_lyrics(item),
            CardField::Style => self.attributes_in(item, STYLE, "title"),
            CardField::TitledText => self.attributes_in(item, TITLED, "title"),
            CardField::PersonaName => match self.first_in(item, PERSONA_LINK)? {
                Some(link) => Ok(vec![self.driver.text(&link)?]),
                None => Ok(Vec::new()),
            },
            CardField::PersonaTitle => match self.first_in(item, PERSONA_LINK)? {
                Some(link) => Ok(self.driver.attribute(&link, "title")?.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            CardField::PersonaLink => match self.first_in(item, PERSONA_LINK)? {
                Some(link) => Ok(self.driver.attribute(&link, "href")?.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            CardField::Badge => self.texts_in(item, BADGE),
        }
    }

    fn open_download_menu(&self, item: &WebElement, wait: Duration) -> Result<(), SyncError> {
        self.driver.context_click(item)?;
        let download = self
            .driver
            .wait_for(Locator::XPath(&button_named("Download")), wait, true)?;
        self.driver.hover(&download)?;
        self.driver.click(&download)?;
        Ok(())
    }

    fn select_format(&self, format: RenditionFormat, wait: Duration) -> Result<(), SyncError> {
        self.click_button(format.menu_label(), wait)?;
        Ok(())
    }

    fn confirm_download(&self, wait: Duration) -> Result<(), SyncError> {
        self.click_button("Download File", wait)?;
        if !self
            .driver
            .wait_until_hidden(Locator::XPath(&button_named("Download File")), DIALOG_WAIT)
        {
            tracing::debug!("download dialog still open after confirmation");
        }
        Ok(())
    }

    fn expect_transfer(
        &self,
        format: RenditionFormat,
        window: TransferWindow,
        trigger: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<StagedTransfer, SyncError> {
        let mut watch = TransferWatch::new(
            format,
            &staged_files(&self.staging_dir)?,
            self.abandoned().clone(),
        );
        trigger()?;

        let mut deadline = Instant::now() + window.start;
        let mut started = false;
        loop {
            let current = staged_files(&self.staging_dir)?;
            let state = watch.poll(&current);
            self.discard_late(watch.take_late());
            match state {
                WatchState::Landed(name) => {
                    tracing::debug!("{format} transfer landed as {name}");
                    return Ok(StagedTransfer {
                        path: self.staging_dir.join(&name),
                        suggested_filename: name,
                    });
                }
                WatchState::Started if !started => {
                    started = true;
                    deadline = Instant::now() + window.complete;
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                let left = watch.in_flight(&current);
                if !left.is_empty() {
                    tracing::debug!("abandoning in-flight transfers: {left:?}");
                    self.abandoned().extend(left);
                }
                let timeout = if started { window.complete } else { window.start };
                return Err(SyncError::TransferTimeout {
                    format,
                    timeout_ms: timeout.as_millis(),
                });
            }
            thread::sleep(TRANSFER_POLL);
        }
    }

    fn has_next_page(&self) -> Result<bool, SyncError> {
        thread::sleep(PRE_PAGINATION_SETTLE);
        let Some(next) = self
            .driver
            .find_elements(Locator::Css(NEXT_PAGE))?
            .into_iter()
            .next()
        else {
            tracing::info!("next button not found; stopping pagination");
            return Ok(false);
        };
        let aria_disabled = self.driver.attribute(&next, "aria-disabled")?;
        let disabled = self.driver.attribute(&next, "disabled")?;
        let clickable = aria_disabled.as_deref() != Some("true")
            && disabled.is_none()
            && self.driver.is_enabled(&next)?
            && self.driver.is_displayed(&next)?;
        if !clickable {
            tracing::info!("next button is not clickable; stopping pagination");
        }
        Ok(clickable)
    }

    fn advance_page(&self) -> Result<(), SyncError> {
        let previous = self.first_song_link();
        let next = self
            .driver
            .wait_for(Locator::Css(NEXT_PAGE), self.timeouts.page_advance, true)?;
        self.driver.click(&next)?;

        let deadline = Instant::now() + self.timeouts.page_advance;
        while self.first_song_link() == previous {
            if Instant::now() >= deadline {
                return Err(SyncError::Provider(format!(
                    "song list unchanged {} ms after clicking next",
                    self.timeouts.page_advance.as_millis()
                )));
            }
            thread::sleep(TRANSFER_POLL);
        }
        thread::sleep(PAGE_SETTLE);
        Ok(())
    }
}

/// A finished download sitting in the browser's staging directory.
#[derive(Debug, Clone)]
pub struct StagedTransfer {
    path: PathBuf,
    suggested_filename: String,
}

impl Transfer for StagedTransfer {
    fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    fn save_as(&self, destination: &Path) -> Result<(), SyncError> {
        fs_util::replace_file(&self.path, destination)
    }
}

struct StagedMeta {
    len: u64,
    modified: Option<SystemTime>,
}

fn staged_files(dir: &Path) -> Result<Vec<(String, StagedMeta)>, SyncError> {
    let entries = fs::read_dir(dir).map_err(|err| SyncError::Filesystem(err.to_string()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SyncError::Filesystem(err.to_string()))?;
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        files.push((
            name,
            StagedMeta {
                len: meta.len(),
                modified: meta.modified().ok(),
            },
        ));
    }
    Ok(files)
}

fn is_partial(name: &str) -> bool {
    partial_suffix_len(name).is_some()
}

fn partial_suffix_len(name: &str) -> Option<usize> {
    let lower = name.to_lowercase();
    PARTIAL_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| suffix.len())
}

/// `Song.wav.part` -> `Song.wav`; complete names are returned unchanged.
fn final_name(name: &str) -> &str {
    match partial_suffix_len(name) {
        Some(len) => &name[..name.len() - len],
        None => name,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum WatchState {
    Waiting,
    Started,
    Landed(String),
}

/// Tracks the staging folder across polls for one triggered transfer.
struct TransferWatch {
    format: RenditionFormat,
    before: HashMap<String, Option<SystemTime>>,
    /// Final names that belong to earlier triggers.
    ignored: HashSet<String>,
    last_sizes: HashMap<String, u64>,
    late: Vec<String>,
}

impl TransferWatch {
    fn new(format: RenditionFormat, existing: &[(String, StagedMeta)], abandoned: HashSet<String>) -> Self {
        let mut ignored = abandoned;
        for (name, _) in existing {
            if is_partial(name) {
                ignored.insert(final_name(name).to_string());
            }
        }
        Self {
            format,
            before: existing
                .iter()
                .map(|(name, meta)| (name.clone(), meta.modified))
                .collect(),
            ignored,
            last_sizes: HashMap::new(),
            late: Vec::new(),
        }
    }

    fn is_fresh(&self, name: &str, meta: &StagedMeta) -> bool {
        self.before.get(name) != Some(&meta.modified)
    }

    fn is_ours(&self, name: &str) -> bool {
        !self.ignored.contains(final_name(name))
    }

    fn poll(&mut self, current: &[(String, StagedMeta)]) -> WatchState {
        let partial_finals: HashSet<&str> = current
            .iter()
            .filter(|(name, _)| is_partial(name))
            .map(|(name, _)| final_name(name))
            .collect();
        for (name, _) in current {
            if !is_partial(name)
                && self.ignored.contains(name.as_str())
                && !partial_finals.contains(name.as_str())
                && !self.late.contains(name)
            {
                self.late.push(name.clone());
            }
        }

        let mut started = false;
        let mut in_flight = false;
        let mut landed = None;
        for (name, meta) in current {
            if !self.is_fresh(name, meta) || !self.is_ours(name) {
                continue;
            }
            if is_partial(name) {
                started = true;
                in_flight = true;
            } else if self.format.matches_file(name) {
                started = true;
                if meta.len > 0 && self.last_sizes.get(name) == Some(&meta.len) && landed.is_none() {
                    landed = Some(name.clone());
                }
            }
        }
        self.last_sizes = current
            .iter()
            .map(|(name, meta)| (name.clone(), meta.len))
            .collect();

        match landed {
            Some(name) if !in_flight => WatchState::Landed(name),
            _ if started => WatchState::Started,
            _ => WatchState::Waiting,
        }
    }

    /// Final names of files this trigger produced that are still unfinished
    /// or unclaimed.
    fn in_flight(&self, current: &[(String, StagedMeta)]) -> Vec<String> {
        current
            .iter()
            .filter(|(name, meta)| self.is_fresh(name, meta) && self.is_ours(name))
            .map(|(name, _)| final_name(name).to_string())
            .collect()
    }

    fn take_late(&mut self) -> Vec<String> {
        let late = std::mem::take(&mut self.late);
        for name in &late {
            self.ignored.remove(name);
        }
        late
    }
}

/// Runs `read`, then `dismiss` regardless of the outcome.
fn dismissed_after<T>(
    read: impl FnOnce() -> Result<T, SyncError>,
    dismiss: impl FnOnce() -> Result<(), SyncError>,
) -> Result<T, SyncError> {
    let result = read();
    if let Err(err) = dismiss() {
        tracing::debug!("could not dismiss dialog: {err}");
    }
    result
}

fn button_named(name: &str) -> String {
    format!("//*[(self::button or @role='button') and (normalize-space(.)='{name}' or @aria-label='{name}')]")
}
