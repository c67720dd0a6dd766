//! Download Engine
//!
//! This module provides an async download engine that:
//! 1. Fetches every accepted image URL with bounded concurrency (Semaphore)
//! 2. Fingerprints each payload and checks it against the hash ledger
//! 3. Writes new images to `<download_dir>/<Category>/meme_NNNN.jpg`
//! 4. Reports one outcome per URL in completion order

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

use crate::config_loader::AppConfig;
use crate::hash_ledger::{HashAlgorithm, HashLedger, LedgerError, SharedLedger};
use crate::reddit::transport::{HttpRequest, Transport, TransportError};

/// Progress bar template shown while downloads are running.
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Error types for the download engine
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Download pool closed")]
    PoolClosed,
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// What happened to a single URL
#[derive(Debug)]
pub enum DownloadOutcome {
    Saved { url: String, path: PathBuf },
    Duplicate { url: String },
    Failed { url: String, error: DownloadError },
}

/// Outcomes of one batch, in completion order
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                DownloadOutcome::Saved { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn duplicate_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DownloadOutcome::Duplicate { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DownloadOutcome::Failed { .. }))
            .count()
    }
}

/// Download engine configuration
#[derive(Debug, Clone)]
pub struct DownloadEngineConfig {
    pub max_concurrent_downloads: usize,
    pub download_dir: PathBuf,
    pub hash_algorithm: HashAlgorithm,
}

impl DownloadEngineConfig {
    pub fn from_app_config(app_config: &AppConfig) -> Self {
        Self {
            max_concurrent_downloads: app_config.pools.max_download_concurrency.max(1),
            download_dir: PathBuf::from(&app_config.paths.download_directory),
            hash_algorithm: app_config.dedup.algorithm,
        }
    }
}

/// Turns a keyword into a folder name: first letter upper-cased, the rest
/// lower-cased, characters that are not valid in file names replaced by `_`.
pub fn category_folder_name(label: &str) -> String {
    let mut chars = label.trim().chars().map(|c| match c {
        '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
        c if c.is_control() => '_',
        c => c,
    });

    let name: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "Uncategorized".to_string()
    } else {
        name
    }
}

/// Draws a file name `meme_NNNN.jpg` with `NNNN` in 1000..=9999.
/// Names are not checked against existing files.
pub fn meme_file_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("meme_{}.jpg", rng.gen_range(1000..=9999))
}

/// Checks the payload against the ledger and, when new, writes it and
/// records its hash. Runs entirely under the ledger lock.
fn store_payload<R: Rng + ?Sized>(
    ledger: &SharedLedger,
    category_dir: &Path,
    hash: &str,
    body: &[u8],
    rng: &mut R,
) -> DownloadResult<Option<PathBuf>> {
    ledger.lock().record_if_new(hash, || {
        let path = category_dir.join(meme_file_name(rng));
        fs::write(&path, body)?;
        Ok(path)
    })
}

/// Download engine for fetching accepted images
pub struct DownloadEngine {
    config: DownloadEngineConfig,
    transport: Arc<dyn Transport>,
    ledger: SharedLedger,
    semaphore: Arc<Semaphore>,
}

impl DownloadEngine {
    /// Create a new download engine
    pub fn new(
        config: DownloadEngineConfig,
        transport: Arc<dyn Transport>,
        ledger: SharedLedger,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads));
        Self {
            config,
            transport,
            ledger,
            semaphore,
        }
    }

    /// Create a new download engine from app config, opening the ledger file
    pub fn from_config(
        app_config: &AppConfig,
        transport: Arc<dyn Transport>,
    ) -> DownloadResult<Self> {
        let ledger = HashLedger::open(&app_config.paths.ledger_file)?;
        if ledger.is_empty() {
            info!("Starting a new hash ledger at {}", ledger.path().display());
        } else {
            info!(
                "Loaded {} known hashes from {}",
                ledger.len(),
                ledger.path().display()
            );
        }
        Ok(Self::new(
            DownloadEngineConfig::from_app_config(app_config),
            transport,
            ledger.into_shared(),
        ))
    }

    #[cfg(test)]
    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    /// Folder that images for `category` are written to.
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.config.download_dir.join(category_folder_name(category))
    }

    /// Downloads every URL into the category folder.
    /// Individual failures are reported in the summary, not returned.
    pub async fn download_all(
        &self,
        urls: &[String],
        category: &str,
    ) -> DownloadResult<DownloadSummary> {
        let category_dir = self.category_dir(category);
        tokio::fs::create_dir_all(&category_dir).await?;

        let progress_bar = Self::progress_bar(urls.len() as u64);
        progress_bar.set_message(category_folder_name(category));

        let mut pending: FuturesUnordered<_> = urls
            .iter()
            .map(|url| {
                let category_dir = category_dir.clone();
                async move {
                    let result = self.download_one(url, &category_dir).await;
                    (url.clone(), result)
                }
            })
            .collect();

        let mut summary = DownloadSummary::default();
        while let Some((url, result)) = pending.next().await {
            let outcome = match result {
                Ok(Some(path)) => {
                    progress_bar.println(format!("Saved {}", path.display()));
                    DownloadOutcome::Saved { url, path }
                }
                Ok(None) => {
                    progress_bar.println(format!("Duplicate found, skipping {}", url));
                    DownloadOutcome::Duplicate { url }
                }
                Err(error) => {
                    progress_bar.suspend(|| error!("Failed to download {}: {}", url, error));
                    DownloadOutcome::Failed { url, error }
                }
            };
            summary.outcomes.push(outcome);
            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();
        info!(
            saved = summary.saved_paths().len(),
            duplicates = summary.duplicate_count(),
            failed = summary.failed_count(),
            "Download batch finished"
        );
        Ok(summary)
    }

    /// Downloads one image. `Ok(None)` means the payload was a duplicate.
    #[instrument(skip(self, category_dir))]
    async fn download_one(
        &self,
        url: &str,
        category_dir: &Path,
    ) -> DownloadResult<Option<PathBuf>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::PoolClosed)?;

        // Image requests carry no timeout, only listing requests do
        let response = self.transport.get(HttpRequest::get(url)).await?;
        if !response.is_success() {
            debug!("HTTP error: {}", response.status);
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        let hash = self.config.hash_algorithm.content_hash(&response.body);
        debug!(hash = %hash, bytes = response.body.len(), "Hashed payload");

        let ledger = self.ledger.clone();
        let category_dir = category_dir.to_path_buf();
        let saved = tokio::task::spawn_blocking(move || {
            let mut rng = rand::thread_rng();
            store_payload(&ledger, &category_dir, &hash, &response.body, &mut rng)
        })
        .await??;

        match &saved {
            Some(path) => debug!("Saved image: {}", path.display()),
            None => debug!("Duplicate found, skipping {}", url),
        }
        Ok(saved)
    }

    fn progress_bar(len: u64) -> ProgressBar {
        let progress_style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let progress_bar = ProgressBar::new(len);
        progress_bar.set_style(progress_style);
        progress_bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        progress_bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    use crate::reddit::transport::mock::MockTransport;
    use crate::reddit::transport::{HttpResponse, TransportResult};

    fn engine(dir: &Path, concurrency: usize, transport: Arc<dyn Transport>) -> DownloadEngine {
        let ledger = HashLedger::open(dir.join("hashes.txt")).unwrap().into_shared();
        let config = DownloadEngineConfig {
            max_concurrent_downloads: concurrency,
            download_dir: dir.join("Memes"),
            hash_algorithm: HashAlgorithm::Sha256,
        };
        DownloadEngine::new(config, transport, ledger)
    }

    /// Transport that records how many requests are in flight at once.
    struct ConcurrencyProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ConcurrencyProbe {
        async fn get(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                body: request.url.into_bytes(),
            })
        }
    }

    #[test]
    fn test_category_folder_name() {
        assert_eq!(category_folder_name("cat"), "Cat");
        assert_eq!(category_folder_name("GRUMPY Cat"), "Grumpy cat");
        assert_eq!(category_folder_name("  dog "), "Dog");
        assert_eq!(category_folder_name("cats/dogs"), "Cats_dogs");
        assert_eq!(category_folder_name("..\\up"), ".._up");
        assert_eq!(category_folder_name(""), "Uncategorized");
        assert_eq!(category_folder_name(".."), "Uncategorized");
    }

    #[test]
    fn test_meme_file_name_format() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let name = meme_file_name(&mut rng);
            let digits = name
                .strip_prefix("meme_")
                .and_then(|rest| rest.strip_suffix(".jpg"))
                .unwrap();
            let number: u32 = digits.parse().unwrap();
            assert!((1000..=9999).contains(&number));
        }
    }

    #[test]
    fn test_file_names_can_collide_within_a_run() {
        // 9000 possible names, so 9001 draws must repeat one.
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        let collided = (0..9001).any(|_| !seen.insert(meme_file_name(&mut rng)));
        assert!(collided);
    }

    #[test]
    fn test_colliding_name_overwrites_earlier_file() {
        let temp_dir = tempdir().unwrap();
        let ledger = HashLedger::open(temp_dir.path().join("hashes.txt"))
            .unwrap()
            .into_shared();
        let dir = temp_dir.path();

        let first = store_payload(&ledger, dir, "aaaa", b"first", &mut StdRng::seed_from_u64(7))
            .unwrap()
            .unwrap();
        let second = store_payload(&ledger, dir, "bbbb", b"second", &mut StdRng::seed_from_u64(7))
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"second");
        assert_eq!(ledger.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_download_saves_into_category_folder() {
        let temp_dir = tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.respond("https://i.redd.it/a.jpg", 200, b"image a".to_vec());
        let engine = engine(temp_dir.path(), 5, transport);

        let summary = engine
            .download_all(&["https://i.redd.it/a.jpg".to_string()], "cat")
            .await
            .unwrap();

        let saved = summary.saved_paths();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].parent().unwrap(), temp_dir.path().join("Memes").join("Cat"));
        assert_eq!(fs::read(&saved[0]).unwrap(), b"image a");

        let ledger_content = fs::read_to_string(temp_dir.path().join("hashes.txt")).unwrap();
        assert_eq!(
            ledger_content.trim(),
            HashAlgorithm::Sha256.content_hash(b"image a")
        );
    }

    #[tokio::test]
    async fn test_second_download_of_same_bytes_is_duplicate() {
        let temp_dir = tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.respond("https://i.redd.it/a.jpg", 200, b"image a".to_vec());
        transport.respond("https://i.imgur.com/mirror.png", 200, b"image a".to_vec());
        let engine = engine(temp_dir.path(), 5, transport);

        let first = engine
            .download_all(&["https://i.redd.it/a.jpg".to_string()], "cat")
            .await
            .unwrap();
        let second = engine
            .download_all(&["https://i.imgur.com/mirror.png".to_string()], "cat")
            .await
            .unwrap();

        assert_eq!(first.saved_paths().len(), 1);
        assert!(second.saved_paths().is_empty());
        assert_eq!(second.duplicate_count(), 1);
        assert_eq!(engine.ledger().lock().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_payloads_are_saved_once() {
        let temp_dir = tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let urls: Vec<String> = (0..6).map(|i| format!("https://i.redd.it/{}.jpg", i)).collect();
        for url in &urls {
            transport.respond(url, 200, b"same bytes".to_vec());
        }
        let engine = engine(temp_dir.path(), 5, transport);

        let summary = engine.download_all(&urls, "cat").await.unwrap();

        assert_eq!(summary.saved_paths().len(), 1);
        assert_eq!(summary.duplicate_count(), 5);
        let files = fs::read_dir(temp_dir.path().join("Memes").join("Cat")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_downloads() {
        let temp_dir = tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.respond("https://i.redd.it/ok.jpg", 200, b"ok".to_vec());
        transport.respond("https://i.redd.it/gone.jpg", 404, Vec::new());
        transport.time_out("https://i.redd.it/slow.jpg");
        let engine = engine(temp_dir.path(), 5, transport);

        let urls = vec![
            "https://i.redd.it/gone.jpg".to_string(),
            "https://i.redd.it/ok.jpg".to_string(),
            "https://i.redd.it/slow.jpg".to_string(),
        ];
        let summary = engine.download_all(&urls, "cat").await.unwrap();

        assert_eq!(summary.outcomes.len(), 3);
        assert_eq!(summary.saved_paths().len(), 1);
        assert_eq!(summary.failed_count(), 2);
        assert!(summary.outcomes.iter().any(|outcome| matches!(
            outcome,
            DownloadOutcome::Failed { error: DownloadError::Status { status: 404, .. }, .. }
        )));
        assert_eq!(engine.ledger().lock().len(), 1);
    }

    #[tokio::test]
    async fn test_image_requests_have_no_timeout() {
        let temp_dir = tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let urls: Vec<String> = (0..3).map(|i| format!("https://i.redd.it/{}.jpg", i)).collect();
        for (i, url) in urls.iter().enumerate() {
            transport.respond(url, 200, format!("image {}", i).into_bytes());
        }
        let engine = engine(temp_dir.path(), 5, transport.clone());

        engine.download_all(&urls, "cat").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|request| request.timeout.is_none()));
        assert!(requests.iter().all(|request| request.query.is_empty()));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let temp_dir = tempdir().unwrap();
        let probe = Arc::new(ConcurrencyProbe {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let engine = engine(temp_dir.path(), 2, probe.clone());
        let urls: Vec<String> = (0..8).map(|i| format!("https://i.redd.it/{}.jpg", i)).collect();

        let summary = engine.download_all(&urls, "cat").await.unwrap();

        assert_eq!(summary.outcomes.len(), 8);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {}", peak);
        assert!(peak >= 1);
    }
}
