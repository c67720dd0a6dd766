//! Shared fixtures and end-to-end pipeline tests.

use std::path::Path;

use serde_json::json;

use crate::config_loader::AppConfig;


pub(crate) const MOCK_BASE: &str = "http://reddit.mock";

pub(crate) fn search_url(source: &str) -> String {
    format!("{}/r/{}/search.json", MOCK_BASE, source)
}

pub(crate) fn hot_url(source: &str) -> String {
    format!("{}/r/{}/hot.json", MOCK_BASE, source)
}

/// Config pointing at `base_url` with every file under `dir`.
pub(crate) fn test_config(base_url: &str, subreddits: &[&str], dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.sources.base_url = base_url.to_string();
    config.sources.subreddits = subreddits.iter().map(|s| s.to_string()).collect();
    config.paths.download_directory = dir.join("Memes").to_string_lossy().to_string();
    config.paths.ledger_file = dir.join("downloaded_hashes.txt").to_string_lossy().to_string();
    config.paths.log_directory = dir.join("logs").to_string_lossy().to_string();
    config.logging.log_to_file = false;
    config
}

/// Listing JSON shaped like the subreddit API, from (title, ups, url) triples.
pub(crate) fn listing_body(posts: &[(&str, i64, &str)]) -> String {
    let children: Vec<_> = posts
        .iter()
        .map(|(title, ups, url)| {
            json!({
                "kind": "t3",
                "data": { "title": title, "ups": ups, "url": url }
            })
        })
        .collect();

    json!({ "kind": "Listing", "data": { "after": null, "children": children } }).to_string()
}
