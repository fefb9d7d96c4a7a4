use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SyncReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(result: &SyncReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Mirrors progress events into the log at debug level.
pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(
                "{} ({:.2}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => tracing::debug!("{}", event.message),
        }
    }
}

pub fn print_sync_summary(result: &SyncReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}suno-sync summary{reset}");
    println!("{green}new songs stored: {}{reset}", result.total_processed);
    for page in &result.pages {
        let color = if page.failed > 0 { yellow } else { green };
        println!(
            "{color}  page {}: {} found, {} new, {} videos added, {} already stored, {} failed{reset}",
            page.page, page.found, page.created, page.backfilled, page.skipped_existing, page.failed
        );
    }
    println!("{cyan}songs in store: {}{reset}", result.store_size);
}
