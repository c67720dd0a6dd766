//! Candidate discovery across the configured subreddits.
//!
//! Every source is queried twice, keyword search first and the hot listing
//! second. Accepted posts accumulate in encounter order until the limit is
//! reached, at which point the scan stops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use thiserror::Error;
use tracing::{debug, info};

use crate::config_loader::{AppConfig, Search, Sources};
use crate::reddit::listing::{ListingResponse, Post};
use crate::reddit::transport::{HttpRequest, Transport, TransportError};

/// Reasons a listing could not be read
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed listing: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which listing a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Search,
    Hot,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Search => write!(f, "search"),
            Phase::Hot => write!(f, "hot"),
        }
    }
}

/// An image post accepted for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub score: i64,
    pub source: String,
    pub phase: Phase,
}

/// What a single listing request produced.
#[derive(Debug)]
pub enum ListingOutcome {
    Posts(Vec<Post>),
    /// Non-200 status; treated as an empty listing.
    Unavailable(u16),
    Broken(FetchError),
}

/// A listing that failed to load or parse.
#[derive(Debug)]
pub struct BrokenListing {
    pub source: String,
    pub phase: Phase,
    pub error: FetchError,
}

/// Accepted candidates plus the listings that were broken along the way.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub candidates: Vec<Candidate>,
    pub broken: Vec<BrokenListing>,
}

impl FetchReport {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.url.clone()).collect()
    }
}

/// Returns true when the URL path ends in one of `extensions`.
/// Query string and fragment are ignored, comparison is case-insensitive.
pub fn has_image_extension(url: &str, extensions: &[String]) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_lowercase();
    extensions
        .iter()
        .any(|ext| path.ends_with(&ext.to_lowercase()))
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    sources: Sources,
    search: Search,
}

impl Fetcher {
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sources: config.sources.clone(),
            search: config.search.clone(),
        }
    }

    /// Collects up to `limit` candidates for `keyword`.
    pub async fn fetch(&self, keyword: &str, limit: usize, min_score: i64) -> FetchReport {
        let mut report = FetchReport::default();
        if limit == 0 {
            return report;
        }

        let keyword_lower = keyword.to_lowercase();

        for source in &self.sources.subreddits {
            println!("{} r/{} for '{}'", style("Searching").cyan(), source, keyword);
            debug!(source = %source, keyword = %keyword, "Searching source");

            for phase in [Phase::Search, Phase::Hot] {
                let posts = match self.fetch_listing(source, phase, keyword).await {
                    ListingOutcome::Posts(posts) => posts,
                    ListingOutcome::Unavailable(status) => {
                        debug!(
                            source = %source,
                            phase = %phase,
                            status = status,
                            "Listing unavailable, skipping"
                        );
                        continue;
                    }
                    ListingOutcome::Broken(error) => {
                        info!("r/{} {} listing is broken: {}", source, phase, error);
                        report.broken.push(BrokenListing {
                            source: source.clone(),
                            phase,
                            error,
                        });
                        continue;
                    }
                };

                for post in posts {
                    let accepted = self.accept(post, source, phase, &keyword_lower, min_score);
                    let Some(candidate) = accepted else {
                        continue;
                    };
                    debug!(
                        url = %candidate.url,
                        title = %candidate.title,
                        score = candidate.score,
                        source = %candidate.source,
                        phase = %phase,
                        "Accepted candidate"
                    );
                    report.candidates.push(candidate);

                    if report.candidates.len() >= limit {
                        info!("Found {} images, stopping search", report.candidates.len());
                        return report;
                    }
                }
            }
        }

        info!("Found {} images across all sources", report.candidates.len());
        report
    }

    /// Issues one listing request and classifies the response.
    pub async fn fetch_listing(&self, source: &str, phase: Phase, keyword: &str) -> ListingOutcome {
        let request = self.listing_request(source, phase, keyword);

        let response = match self.transport.get(request).await {
            Ok(response) => response,
            Err(e) => return ListingOutcome::Broken(e.into()),
        };

        if response.status != 200 {
            return ListingOutcome::Unavailable(response.status);
        }

        match serde_json::from_slice::<ListingResponse>(&response.body) {
            Ok(listing) => ListingOutcome::Posts(listing.into_posts()),
            Err(e) => ListingOutcome::Broken(e.into()),
        }
    }

    fn listing_request(&self, source: &str, phase: Phase, keyword: &str) -> HttpRequest {
        let base = self.sources.base_url.trim_end_matches('/');
        let timeout = Duration::from_secs(self.search.request_timeout_secs);

        let request = match phase {
            Phase::Search => HttpRequest::get(format!("{}/r/{}/search.json", base, source))
                .query("q", keyword)
                .query("restrict_sr", "1")
                .query("sort", "relevance"),
            Phase::Hot => HttpRequest::get(format!("{}/r/{}/hot.json", base, source))
                .query("limit", self.search.hot_limit.to_string()),
        };
        request.timeout(timeout)
    }

    fn accept(
        &self,
        post: Post,
        source: &str,
        phase: Phase,
        keyword_lower: &str,
        min_score: i64,
    ) -> Option<Candidate> {
        let url = post.url?;

        let check_keyword = phase == Phase::Search || self.search.fallback_requires_keyword;
        if check_keyword && !post.title.to_lowercase().contains(keyword_lower) {
            return None;
        }
        if !has_image_extension(&url, &self.search.image_extensions) {
            return None;
        }
        if post.ups < min_score {
            return None;
        }

        Some(Candidate {
            url,
            title: post.title,
            score: post.ups,
            source: source.to_string(),
            phase,
        })
    }
}
