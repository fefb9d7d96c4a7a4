use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::app::SyncOptions;
use crate::domain::Browser;
use crate::download::TransferBudget;
use crate::error::SyncError;
use crate::store::DEFAULT_STORE_FILE;

pub const CONFIG_FILE: &str = "suno-sync.json";
const DEFAULT_SITE_URL: &str = "https://suno.com";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub download_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub staging_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub session_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default)]
    pub browser: Option<Browser>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub include_videos: Option<bool>,
    #[serde(default)]
    pub timeouts_ms: TimeoutsEntry,
    #[serde(default)]
    pub item_pause_ms: Option<u64>,
    #[serde(default)]
    pub transfer_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimeoutsEntry {
    #[serde(default)]
    pub menu: Option<u64>,
    #[serde(default)]
    pub confirm: Option<u64>,
    #[serde(default)]
    pub lossless_start: Option<u64>,
    #[serde(default)]
    pub transfer: Option<u64>,
    #[serde(default)]
    pub first_item: Option<u64>,
    #[serde(default)]
    pub popup: Option<u64>,
    #[serde(default)]
    pub page_advance: Option<u64>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub include_videos: bool,
    pub headed: bool,
    pub browser: Option<Browser>,
    pub store_path: Option<Utf8PathBuf>,
    pub download_dir: Option<Utf8PathBuf>,
    pub webdriver_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTimeouts {
    pub first_item: Duration,
    pub popup: Duration,
    pub page_advance: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_path: Utf8PathBuf,
    pub download_dir: Utf8PathBuf,
    pub staging_dir: Utf8PathBuf,
    pub session_path: Utf8PathBuf,
    pub site_url: String,
    pub catalog_url: String,
    pub webdriver_url: String,
    pub browser: Browser,
    pub headless: bool,
    pub include_videos: bool,
    pub budget: TransferBudget,
    pub page_timeouts: PageTimeouts,
    pub item_pause: Duration,
    pub transfer_retries: u32,
}

impl ResolvedConfig {
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            include_videos: self.include_videos,
            item_pause: self.item_pause,
            site_url: self.site_url.clone(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given (it must exist), else the first of
    /// `./suno-sync.json` and `<config dir>/suno-sync/config.json`, else
    /// defaults.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };
        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
                tracing::debug!("loaded config from {}", config_path.display());
                serde_json::from_str(&content)
                    .map_err(|err| SyncError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };
        Ok(Self::resolve_config(config, overrides))
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("suno-sync").join("config.json"))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> ResolvedConfig {
        let defaults = TransferBudget::default();
        let timeouts = &config.timeouts_ms;
        let budget = TransferBudget {
            menu: millis_or(timeouts.menu, defaults.menu),
            confirm: millis_or(timeouts.confirm, defaults.confirm),
            lossless_start: millis_or(timeouts.lossless_start, defaults.lossless_start),
            transfer: millis_or(timeouts.transfer, defaults.transfer),
        };
        let page_timeouts = PageTimeouts {
            first_item: millis_or(timeouts.first_item, Duration::from_secs(30)),
            popup: millis_or(timeouts.popup, Duration::from_secs(10)),
            page_advance: millis_or(timeouts.page_advance, Duration::from_secs(10)),
        };

        let download_dir = overrides
            .download_dir
            .or(config.download_dir)
            .unwrap_or_else(|| Utf8PathBuf::from("downloads"));
        let staging_dir = config
            .staging_dir
            .unwrap_or_else(|| download_dir.join(".incoming"));
        let site_url = config
            .site_url
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let catalog_url = config
            .catalog_url
            .unwrap_or_else(|| format!("{site_url}/me"));

        ResolvedConfig {
            store_path: overrides
                .store_path
                .or(config.store_path)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_STORE_FILE)),
            download_dir,
            staging_dir,
            session_path: config
                .session_path
                .unwrap_or_else(|| Utf8PathBuf::from("context.json")),
            site_url,
            catalog_url,
            webdriver_url: overrides
                .webdriver_url
                .or(config.webdriver_url)
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            browser: overrides.browser.or(config.browser).unwrap_or_default(),
            headless: !overrides.headed && config.headless.unwrap_or(true),
            include_videos: overrides.include_videos || config.include_videos.unwrap_or(false),
            budget,
            page_timeouts,
            item_pause: millis_or(config.item_pause_ms, Duration::from_millis(700)),
            transfer_retries: config.transfer_retries.unwrap_or(0),
        }
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}
