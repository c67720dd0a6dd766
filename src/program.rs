use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error};
use clap::Parser;
use console::{style, Term};
use dialoguer::Input;
use tracing::{info, trace, warn, Instrument};
use uuid::Uuid;

use crate::config_loader::AppConfig;
use crate::download_engine::{DownloadEngine, DownloadSummary};
use crate::reddit::{Fetcher, ReqwestTransport, Transport};
use crate::viewer::{open_images, SystemViewer, Viewer};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Searches subreddits for images matching a keyword and downloads them.
#[derive(Parser, Debug)]
#[command(name = "subreddit_image_grabber", version)]
#[command(about = "Search subreddits for images and download them into category folders")]
pub(crate) struct Cli {
    /// Keyword to search for; prompted for when omitted
    #[arg(short, long)]
    pub(crate) keyword: Option<String>,

    /// Number of images to download; prompted for when omitted
    #[arg(short, long)]
    pub(crate) count: Option<usize>,

    /// Directory holding config.toml
    #[arg(long, default_value = "config")]
    pub(crate) config_dir: PathBuf,

    /// Do not open the downloaded images
    #[arg(long)]
    pub(crate) no_open: bool,
}

/// One search-and-download request.
#[derive(Debug, Clone)]
pub(crate) struct SearchRequest {
    pub(crate) keyword: String,
    pub(crate) count: usize,
    pub(crate) open_results: bool,
}

/// How a run ended.
#[derive(Debug)]
pub(crate) enum RunReport {
    NothingFound,
    Downloaded { summary: DownloadSummary, opened: usize },
}

/// Parses the count prompt answer. Empty input means `default`.
pub(crate) fn parse_count(input: &str, default: usize) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return Some(default);
    }
    input.parse().ok()
}

/// Fetch, download and open, using the given collaborators.
pub(crate) async fn run_search(
    config: &AppConfig,
    transport: Arc<dyn Transport>,
    viewer: &dyn Viewer,
    request: &SearchRequest,
) -> Result<RunReport, Error> {
    let fetcher = Fetcher::new(config, transport.clone());
    let report = fetcher
        .fetch(&request.keyword, request.count, config.search.min_score)
        .await;

    for broken in &report.broken {
        println!(
            "{} r/{} ({}): {}",
            style("Source unavailable").yellow(),
            broken.source,
            broken.phase,
            broken.error
        );
    }

    if report.is_empty() {
        println!(
            "{}",
            style(format!("No images found for '{}' in any source.", request.keyword)).red()
        );
        return Ok(RunReport::NothingFound);
    }

    let engine = DownloadEngine::from_config(config, transport)
        .context("Failed to prepare the download engine")?;
    let summary = engine
        .download_all(&report.urls(), &request.keyword)
        .await
        .context("Failed to download images")?;

    println!(
        "{} {} saved, {} duplicates skipped, {} failed",
        style("Done:").green().bold(),
        summary.saved_paths().len(),
        summary.duplicate_count(),
        summary.failed_count()
    );

    let opened = if request.open_results {
        open_images(viewer, &summary.saved_paths())
    } else {
        0
    };

    Ok(RunReport::Downloaded { summary, opened })
}

/// A program class that handles the flow of the downloader user experience and steps of execution.
pub(crate) struct Program {
    cli: Cli,
    config: AppConfig,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new(cli: Cli, config: AppConfig) -> Self {
        Self { cli, config }
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("subreddit image grabber");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);

        let request = SearchRequest {
            keyword: self.resolve_keyword()?,
            count: self.resolve_count()?,
            open_results: self.config.viewer.open_after_download && !self.cli.no_open,
        };

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id, keyword = %request.keyword);

        async {
            info!("Looking for {} images matching '{}'", request.count, request.keyword);

            let transport: Arc<dyn Transport> = Arc::new(
                ReqwestTransport::new(&self.config.search.user_agent)
                    .context("Failed to build HTTP client")?,
            );

            match run_search(&self.config, transport, &SystemViewer, &request).await? {
                RunReport::NothingFound => warn!("Nothing to download"),
                RunReport::Downloaded { summary, opened } => info!(
                    saved = summary.saved_paths().len(),
                    opened = opened,
                    "Finished"
                ),
            }
            Ok::<(), Error>(())
        }
        .instrument(span)
        .await
    }

    fn resolve_keyword(&self) -> Result<String, Error> {
        if let Some(keyword) = &self.cli.keyword {
            return Ok(keyword.trim().to_string());
        }

        let keyword: String = Input::new()
            .with_prompt("Search keyword")
            .allow_empty(true)
            .interact_text()?;
        Ok(keyword.trim().to_string())
    }

    fn resolve_count(&self) -> Result<usize, Error> {
        if let Some(count) = self.cli.count {
            return Ok(count);
        }

        let default = self.config.search.default_limit;
        let answer: String = Input::new()
            .with_prompt(format!("How many images to download? (default {})", default))
            .allow_empty(true)
            .validate_with(|input: &String| -> Result<(), String> {
                match parse_count(input, default) {
                    Some(_) => Ok(()),
                    None => Err("Please enter a whole number".to_string()),
                }
            })
            .interact_text()?;

        Ok(parse_count(&answer, default).unwrap_or(default))
    }
}
