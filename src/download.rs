use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{RenditionFormat, TriggerShape};
use crate::error::SyncError;
use crate::fs_util::{file_stem, sanitize_filename};
use crate::provider::{CatalogProvider, Transfer, TransferWindow};

const FALLBACK_STEM: &str = "download";

/// Wait budgets for the steps of one rendition download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferBudget {
    /// Download menu and format submenu affordances.
    pub menu: Duration,
    /// Secondary confirmation control of a confirm-gated download.
    pub confirm: Duration,
    /// Time for a confirm-gated (lossless) transfer to start after the
    /// confirmation.
    pub lossless_start: Duration,
    /// Time for any transfer to finish, and for immediate transfers to start.
    pub transfer: Duration,
}

impl Default for TransferBudget {
    fn default() -> Self {
        Self {
            menu: Duration::from_millis(250),
            confirm: Duration::from_secs(5),
            lossless_start: Duration::from_secs(10),
            transfer: Duration::from_secs(120),
        }
    }
}

impl TransferBudget {
    pub fn transfer_window(&self, format: RenditionFormat) -> TransferWindow {
        let start = match format.trigger_shape() {
            TriggerShape::ConfirmGated => self.lossless_start,
            TriggerShape::Immediate => self.transfer,
        };
        TransferWindow {
            start,
            complete: self.transfer,
        }
    }
}

/// Drives the provider through a rendition download and places the file
/// under its deterministic name.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    download_dir: Utf8PathBuf,
    budget: TransferBudget,
    retries: u32,
    retry_delay: Duration,
}

impl DownloadOrchestrator {
    pub fn new(download_dir: Utf8PathBuf, budget: TransferBudget) -> Self {
        Self {
            download_dir,
            budget,
            retries: 0,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Re-attempts timed-out transfers up to `retries` times. Each attempt
    /// targets the same final name, so repeats overwrite rather than pile up.
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn download_dir(&self) -> &Utf8Path {
        &self.download_dir
    }

    pub fn budget(&self) -> &TransferBudget {
        &self.budget
    }

    /// Downloads one rendition and returns the final filename (not the path).
    pub fn download_rendition<P: CatalogProvider>(
        &self,
        provider: &P,
        item: &P::Item,
        format: RenditionFormat,
        desired_base_name: Option<&str>,
    ) -> Result<String, SyncError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(provider, item, format, desired_base_name) {
                Err(SyncError::TransferTimeout { .. }) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{format} transfer timed out; retry {attempt}/{}",
                        self.retries
                    );
                    thread::sleep(self.retry_delay * attempt);
                }
                other => return other,
            }
        }
    }

    fn attempt<P: CatalogProvider>(
        &self,
        provider: &P,
        item: &P::Item,
        format: RenditionFormat,
        desired_base_name: Option<&str>,
    ) -> Result<String, SyncError> {
        let start = Instant::now();
        let transfer = self.trigger(provider, item, format)?;

        let filename = final_filename(format, desired_base_name, transfer.suggested_filename());
        let destination = self.download_dir.join(&filename);
        if destination.as_std_path().exists() {
            fs::remove_file(destination.as_std_path()).map_err(|err| {
                SyncError::Filesystem(format!("remove existing {destination}: {err}"))
            })?;
        }
        transfer.save_as(destination.as_std_path())?;

        tracing::info!(
            "downloaded ({format}): {filename} in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(filename)
    }

    fn trigger<P: CatalogProvider>(
        &self,
        provider: &P,
        item: &P::Item,
        format: RenditionFormat,
    ) -> Result<P::Transfer, SyncError> {
        let window = self.budget.transfer_window(format);
        provider.open_download_menu(item, self.budget.menu)?;
        match format.trigger_shape() {
            TriggerShape::Immediate => provider.expect_transfer(format, window, &mut || {
                provider.select_format(format, self.budget.menu)
            }),
            TriggerShape::ConfirmGated => {
                provider.select_format(format, self.budget.menu)?;
                provider.expect_transfer(format, window, &mut || {
                    provider.confirm_download(self.budget.confirm)
                })
            }
        }
    }
}

/// `sanitize(desired or stem(suggested)) + extension`.
pub fn final_filename(
    format: RenditionFormat,
    desired_base_name: Option<&str>,
    suggested_filename: &str,
) -> String {
    let base = match desired_base_name {
        Some(name) => sanitize_filename(name),
        None => sanitize_filename(file_stem(suggested_filename)),
    };
    let base = if base.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        base
    };
    format!("{base}{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_desired_base() {
        let name = final_filename(
            RenditionFormat::AudioCompressed,
            Some("Ada - Test/Song - abc-123"),
            "ignored.wav",
        );
        assert_eq!(name, "Ada - Test Song - abc-123.mp3");
    }

    #[test]
    fn filename_from_suggested_name_enforces_extension() {
        let name = final_filename(RenditionFormat::Video, None, "My: Song.webm");
        assert_eq!(name, "My Song.mp4");
        assert_eq!(final_filename(RenditionFormat::AudioLossless, None, "???.wav"), "download.wav");
    }

    #[test]
    fn lossless_start_is_short_but_completion_is_not() {
        let budget = TransferBudget::default();
        assert_eq!(
            budget.transfer_window(RenditionFormat::AudioLossless),
            TransferWindow {
                start: Duration::from_secs(10),
                complete: Duration::from_secs(120),
            }
        );
        assert_eq!(
            budget.transfer_window(RenditionFormat::Video),
            TransferWindow {
                start: Duration::from_secs(120),
                complete: Duration::from_secs(120),
            }
        );
    }
}
