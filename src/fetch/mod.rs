//! Retrieval of raw feed bytes.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use tracing::debug;

use crate::config::{FeedAuth, FeedConfig};
use crate::error::FetchError;
use auth::{ApiKey, UrlParam};

/// Builds the client described by the feed configuration.
pub fn client_from_config(config: &FeedConfig) -> Result<Box<dyn HttpClient>, FetchError> {
    let basic = BasicClient::with_timeout(config.timeout)?;

    let client: Box<dyn HttpClient> = match &config.auth {
        None => Box::new(basic),
        Some(FeedAuth::Header { name, key }) => Box::new(ApiKey::new(basic, name, key)?),
        Some(FeedAuth::Bearer { key }) => Box::new(ApiKey::bearer(basic, key)?),
        Some(FeedAuth::Query { name, key }) => Box::new(UrlParam::new(basic, name, key)),
    };
    Ok(client)
}

/// GETs `url` and returns the body. Non-success statuses and empty bodies are
/// errors.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let body = resp.bytes().await?;
    debug!(bytes = body.len(), "Feed bytes received");
    if body.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    Ok(body)
}

/// Loads feed data from a local file path or fetches it over HTTP.
pub async fn load_source<C: HttpClient + ?Sized>(
    client: &C,
    source: &str,
) -> Result<Bytes, FetchError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch_bytes(client, source).await
    } else {
        Ok(Bytes::from(tokio::fs::read(source).await?))
    }
}
