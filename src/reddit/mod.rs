//! Subreddit listing access: transport, wire types and the candidate fetcher.

pub(crate) mod fetcher;
pub(crate) mod listing;
pub(crate) mod transport;

pub(crate) use fetcher::Fetcher;
pub(crate) use transport::{ReqwestTransport, Transport};
