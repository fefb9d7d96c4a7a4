use std::io::{self, BufRead};
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use suno_sync::app::App;
use suno_sync::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use suno_sync::domain::Browser;
use suno_sync::download::DownloadOrchestrator;
use suno_sync::error::SyncError;
use suno_sync::output::{JsonOutput, LogOutput, OutputMode, print_sync_summary};
use suno_sync::store::CatalogStore;
use suno_sync::webdriver::{SessionSettings, SessionSnapshot, WebDriverClient, WebDriverProvider};

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "suno-sync")]
#[command(about = "Incrementally mirror a Suno song library: metadata to JSON, audio and video to disk")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(flatten)]
    options: SharedArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sync the library into the store and download folder (default)")]
    Sync,
    #[command(about = "Open a browser to log in and save the session for later syncs")]
    Login,
}

#[derive(Args, Clone, Default)]
struct SharedArgs {
    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Also download MP4 videos, backfilling songs that lack one.
    #[arg(long, global = true)]
    videos: bool,

    /// Show the browser window.
    #[arg(long, global = true)]
    headed: bool,

    #[arg(long, global = true, value_enum)]
    browser: Option<Browser>,

    /// Song store file.
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    /// Folder for downloaded files.
    #[arg(long, global = true)]
    downloads: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    webdriver_url: Option<String>,
}

impl SharedArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            include_videos: self.videos,
            headed: self.headed,
            browser: self.browser,
            store_path: self.store.clone(),
            download_dir: self.downloads.clone(),
            webdriver_url: self.webdriver_url.clone(),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::ConfigRead(_)
        | SyncError::ConfigParse(_)
        | SyncError::InvalidBrowser(_)
        | SyncError::MissingSession(_)
        | SyncError::SessionParse(_) => 2,
        SyncError::WebDriverHttp(_)
        | SyncError::WebDriverStatus { .. }
        | SyncError::WebDriverTimeout(_)
        | SyncError::Provider(_)
        | SyncError::AffordanceTimeout(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("suno_sync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let resolved = ConfigLoader::resolve(cli.options.config.as_deref(), cli.options.overrides())?;

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => run_sync(&resolved, output_mode),
        Commands::Login => run_login(&resolved),
    }
}

fn run_sync(resolved: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let store = CatalogStore::new(resolved.store_path.clone());
    store.ensure_exists()?;
    std::fs::create_dir_all(resolved.download_dir.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("{}: {err}", resolved.download_dir)))?;

    let provider = WebDriverProvider::open(resolved)?;
    let downloader = DownloadOrchestrator::new(resolved.download_dir.clone(), resolved.budget.clone())
        .with_retries(resolved.transfer_retries, RETRY_DELAY);
    let app = App::new(store, provider, downloader, resolved.sync_options());

    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.sync(&JsonOutput)?;
            JsonOutput::print_sync(&report).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let report = app.sync(&LogOutput)?;
            print_sync_summary(&report);
        }
    }
    Ok(())
}

fn run_login(resolved: &ResolvedConfig) -> miette::Result<()> {
    let driver = WebDriverClient::connect(
        &resolved.webdriver_url,
        &SessionSettings {
            browser: resolved.browser,
            headless: false,
            download_dir: None,
        },
    )?;
    driver.navigate(&resolved.site_url)?;

    eprintln!(
        "Log in to {} in the opened browser, then press Enter here to save the session.",
        resolved.site_url
    );
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).into_diagnostic()?;

    let snapshot = SessionSnapshot::capture(&driver)?;
    snapshot.save(&resolved.session_path)?;
    tracing::info!(
        "saved {} cookies to {}",
        snapshot.cookies.len(),
        resolved.session_path
    );
    Ok(())
}
