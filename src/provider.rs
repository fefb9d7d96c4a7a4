use std::path::Path;
use std::time::Duration;

use crate::domain::RenditionFormat;
use crate::error::SyncError;

/// Raw card fields the provider can read. Values come back as every
/// candidate text in document order; validation happens in `extract`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    /// `href` of the song link.
    SongLink,
    Title,
    Duration,
    Lyrics,
    /// Primary style/description block.
    Style,
    /// Every titled text on the card; style fallback pool.
    TitledText,
    PersonaName,
    PersonaTitle,
    PersonaLink,
    /// Short badge texts; the version tag is one of them.
    Badge,
}

/// How long a transfer may take to show up after its trigger, and how long
/// it may then take to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferWindow {
    pub start: Duration,
    pub complete: Duration,
}

/// A completed file transfer waiting to be moved into place.
pub trait Transfer {
    fn suggested_filename(&self) -> &str;
    fn save_as(&self, destination: &Path) -> Result<(), SyncError>;
}

/// The page-interaction layer: reads song cards and performs the actions
/// that start file transfers.
pub trait CatalogProvider {
    type Item;
    type Transfer: Transfer;

    /// Song cards on the current page, in display order. Empty when the
    /// page has none.
    fn list_items(&self) -> Result<Vec<Self::Item>, SyncError>;

    fn extract_field(&self, item: &Self::Item, field: CardField) -> Result<Vec<String>, SyncError>;

    /// Opens the card's action menu and reveals the download submenu.
    fn open_download_menu(&self, item: &Self::Item, wait: Duration) -> Result<(), SyncError>;

    /// Activates the submenu entry for `format`.
    fn select_format(&self, format: RenditionFormat, wait: Duration) -> Result<(), SyncError>;

    /// Activates the secondary confirmation control of a confirm-gated
    /// download.
    fn confirm_download(&self, wait: Duration) -> Result<(), SyncError>;

    /// Arms transfer detection, runs `trigger`, then blocks until a `format`
    /// transfer has completed. Fails with `TransferTimeout` when nothing
    /// starts within `window.start` or the started transfer does not finish
    /// within `window.complete`.
    fn expect_transfer(
        &self,
        format: RenditionFormat,
        window: TransferWindow,
        trigger: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<Self::Transfer, SyncError>;

    fn has_next_page(&self) -> Result<bool, SyncError>;

    fn advance_page(&self) -> Result<(), SyncError>;
}
