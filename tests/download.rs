mod common;

use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use suno_sync::domain::RenditionFormat;
use suno_sync::download::{DownloadOrchestrator, TransferBudget};
use suno_sync::error::SyncError;

use common::{Card, Workspace};

fn orchestrator(ws: &Workspace) -> DownloadOrchestrator {
    DownloadOrchestrator::new(ws.download_dir.clone(), TransferBudget::default())
}

#[test]
fn falls_back_to_suggested_name() {
    let ws = Workspace::new();
    let card = Card::new("d1", "Night: Drive");
    let provider = ws.provider(vec![vec![card.clone()]]);

    let name = orchestrator(&ws)
        .download_rendition(&provider, &card, RenditionFormat::AudioCompressed, None)
        .unwrap();

    assert_eq!(name, "Night Drive.mp3");
    assert!(ws.downloaded("Night Drive.mp3"));
}

#[test]
fn existing_destination_is_overwritten() {
    let ws = Workspace::new();
    let card = Card::new("d1", "Tune");
    let provider = ws.provider(vec![vec![card.clone()]]);
    fs::create_dir_all(ws.download_dir.as_std_path()).unwrap();
    let destination = ws.download_dir.join("Tune - d1.wav");
    fs::write(destination.as_std_path(), b"stale").unwrap();

    let name = orchestrator(&ws)
        .download_rendition(&provider, &card, RenditionFormat::AudioLossless, Some("Tune - d1"))
        .unwrap();

    assert_eq!(name, "Tune - d1.wav");
    assert_eq!(fs::read_to_string(destination.as_std_path()).unwrap(), "d1:wav");
}

#[test]
fn timeouts_are_retried_up_to_the_limit() {
    let ws = Workspace::new();
    let card = Card::new("r1", "Retry");
    let provider = ws
        .provider(vec![vec![card.clone()]])
        .fail_transfer("r1", RenditionFormat::AudioCompressed, 2);

    let name = orchestrator(&ws)
        .with_retries(2, Duration::ZERO)
        .download_rendition(&provider, &card, RenditionFormat::AudioCompressed, Some("Retry - r1"))
        .unwrap();

    assert_eq!(name, "Retry - r1.mp3");
    assert_eq!(provider.transfers().len(), 3);
}

#[test]
fn timeout_surfaces_once_retries_run_out() {
    let ws = Workspace::new();
    let card = Card::new("r1", "Retry");
    let provider = ws
        .provider(vec![vec![card.clone()]])
        .fail_transfer("r1", RenditionFormat::Video, 2);

    let result = orchestrator(&ws).with_retries(1, Duration::ZERO).download_rendition(
        &provider,
        &card,
        RenditionFormat::Video,
        Some("Retry - r1"),
    );

    assert_matches!(
        result,
        Err(SyncError::TransferTimeout {
            format: RenditionFormat::Video,
            timeout_ms: 120_000
        })
    );
    assert_eq!(provider.transfers().len(), 2);
    assert!(!ws.downloaded("Retry - r1.mp4"));
}
