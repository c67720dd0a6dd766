//! Wire types for subreddit listing responses (`search.json`, `hot.json`).

use serde::Deserialize;

/// Top level of a listing response
#[derive(Debug, Deserialize, Default)]
pub struct ListingResponse {
    #[serde(default)]
    pub data: ListingData,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: Post,
}

/// Post data, only the fields the filter looks at.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Post {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ups: i64,
    #[serde(default)]
    pub url: Option<String>,
}

impl ListingResponse {
    pub fn into_posts(self) -> Vec<Post> {
        self.data.children.into_iter().map(|child| child.data).collect()
    }
}
